//! Guest identity resolution.
//!
//! Maps a raw channel sender identifier onto exactly one (tenant, guest)
//! pair plus the guest's relevant stay. Phone-bearing channels resolve by
//! hashed phone variants, with global in-house discovery when no tenant
//! hint narrows the search; opaque-token channels resolve only through a
//! previously committed link.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use stayline_core::{canonical_phone, variant_hashes};
use stayline_store::{Guest, Stay, StayStatus, StayStore, Tenant};

/// Stay phase as seen by messaging features, derived fresh at each use
/// rather than trusted from the persisted status alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StayState {
    PreStay,
    InHouse,
    PostStay,
    Unknown,
}

impl StayState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreStay => "pre_stay",
            Self::InHouse => "in_house",
            Self::PostStay => "post_stay",
            Self::Unknown => "unknown",
        }
    }
}

/// Everything downstream engines need to act on one inbound message.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    pub tenant: Tenant,
    pub guest: Guest,
    pub stay: Option<Stay>,
    pub state: StayState,
    /// Whether this resolution created the guest row.
    pub created_guest: bool,
}

/// Derives the effective stay phase at `now`.
///
/// For a live stay with both dates present the interval is authoritative:
/// a stay still marked IN_HOUSE whose checkout has passed is already
/// POST_STAY for messaging purposes (the persisted row catches up on the
/// next sweep), and a stay applied ahead of arrival reads as PRE_STAY
/// until its check-in. Terminal statuses stay terminal: an early checkout
/// never snaps back to IN_HOUSE because its departure date lies ahead.
pub fn derive_stay_state(stay: Option<&Stay>, now: DateTime<Utc>) -> StayState {
    let Some(stay) = stay else {
        return StayState::Unknown;
    };
    match stay.status {
        StayStatus::Cancelled => StayState::Unknown,
        StayStatus::PostStay => StayState::PostStay,
        stored => match (stay.checkin, stay.checkout) {
            (Some(checkin), _) if now < checkin => StayState::PreStay,
            (_, Some(checkout)) if now > checkout => StayState::PostStay,
            (Some(_), Some(_)) => StayState::InHouse,
            _ => match stored {
                StayStatus::PreStay => StayState::PreStay,
                _ => StayState::InHouse,
            },
        },
    }
}

/// Resolves a raw phone-style identifier to an [`IdentityContext`].
///
/// Resolution order:
/// 1. with a real tenant hint, match the hint tenant by any variant hash;
/// 2. without one (or with only the catch-all default), discover globally
///    among guests holding an IN_HOUSE stay, most recent check-in first;
/// 3. otherwise get-or-create the guest under the hint tenant (falling
///    back to `default_tenant_id`) keyed by the canonical variant's hash.
///
/// Returns `Ok(None)` only when the identifier yields no usable digits.
pub fn resolve_identity(
    store: &StayStore,
    raw_identifier: &str,
    tenant_hint: Option<i64>,
    default_tenant_id: i64,
) -> Result<Option<IdentityContext>> {
    let hint = tenant_hint.filter(|tenant_id| *tenant_id != default_tenant_id);

    // Variant generation needs a dialing country; use the hint tenant's
    // code when present, the default tenant's otherwise.
    let home_tenant_id = hint.unwrap_or(default_tenant_id);
    let Some(home_tenant) = store
        .get_tenant(home_tenant_id)
        .context("loading resolution tenant")?
    else {
        warn!(tenant_id = home_tenant_id, "resolution tenant is not provisioned");
        return Ok(None);
    };

    let hashes = variant_hashes(raw_identifier, &home_tenant.country_code);
    let Some(canonical) = canonical_phone(raw_identifier, &home_tenant.country_code) else {
        debug!(identifier = raw_identifier, "identifier has no usable digits");
        return Ok(None);
    };

    if let Some(hint_tenant_id) = hint {
        if let Some(guest) = store
            .find_guest_by_hashes(hint_tenant_id, &hashes)
            .context("tenant-scoped guest lookup")?
        {
            store
                .ensure_contact_phone(guest.id, &canonical)
                .context("storing contact phone hint")?;
            return Ok(Some(finish(store, home_tenant, guest, false)?));
        }
    } else if let Some((guest, tenant, stay)) = store
        .find_in_house_guest_globally(&hashes)
        .context("global in-house discovery")?
    {
        info!(
            tenant_id = tenant.id,
            guest_id = guest.id,
            stay_id = stay.id,
            "globally discovered in-house guest"
        );
        let state = derive_stay_state(Some(&stay), Utc::now());
        store
            .ensure_contact_phone(guest.id, &canonical)
            .context("storing contact phone hint")?;
        return Ok(Some(IdentityContext {
            tenant,
            guest,
            stay: Some(stay),
            state,
            created_guest: false,
        }));
    }

    // No match anywhere: this sender becomes a guest of the home tenant.
    let canonical_hash = stayline_core::hash_identifier(&canonical);
    let (guest, created) = store
        .get_or_create_guest(home_tenant.id, &canonical_hash)
        .context("guest get-or-create")?;
    if created {
        info!(
            tenant_id = home_tenant.id,
            guest_id = guest.id,
            "created guest on first contact"
        );
    }
    store
        .ensure_contact_phone(guest.id, &canonical)
        .context("storing contact phone hint")?;
    Ok(Some(finish(store, home_tenant, guest, created)?))
}

/// Resolves an opaque channel user token within one tenant.
///
/// Opaque tokens carry no phone material, so there is no variant matching
/// and no global discovery; an unlinked token resolves to a placeholder
/// guest keyed by the token's hash, pending an explicit room-code link.
pub fn resolve_identity_by_channel_user(
    store: &StayStore,
    channel_user_id: &str,
    tenant_id: i64,
) -> Result<IdentityContext> {
    let tenant = store
        .get_tenant(tenant_id)
        .context("loading tenant")?
        .with_context(|| format!("tenant {tenant_id} is not provisioned"))?;
    if let Some(guest) = store
        .find_guest_by_channel_user(tenant_id, channel_user_id)
        .context("channel-user lookup")?
    {
        return finish(store, tenant, guest, false);
    }
    let placeholder_hash = stayline_core::channel_user_hash(channel_user_id);
    let (guest, created) = store
        .get_or_create_guest(tenant_id, &placeholder_hash)
        .context("placeholder guest get-or-create")?;
    if created {
        debug!(
            tenant_id,
            guest_id = guest.id,
            "created placeholder guest for unlinked channel user"
        );
    }
    finish(store, tenant, guest, created)
}

fn finish(
    store: &StayStore,
    tenant: Tenant,
    guest: Guest,
    created_guest: bool,
) -> Result<IdentityContext> {
    let stay = store
        .latest_stay_for_guest(guest.id)
        .context("loading latest stay")?;
    let state = derive_stay_state(stay.as_ref(), Utc::now());
    Ok(IdentityContext {
        tenant,
        guest,
        stay,
        state,
        created_guest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stayline_store::{NewStay, NewTenant};
    use tempfile::TempDir;

    fn test_store() -> (TempDir, StayStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = StayStore::new(dir.path().join("stayline.db")).expect("store");
        (dir, store)
    }

    fn tenant(store: &StayStore, name: &str) -> Tenant {
        store
            .create_tenant(NewTenant {
                name: name.to_string(),
                country_code: "40".to_string(),
                ..NewTenant::default()
            })
            .expect("tenant")
    }

    fn in_house_stay(store: &StayStore, tenant_id: i64, guest_id: i64, checkin_hours_ago: i64) {
        store
            .insert_stay(NewStay {
                tenant_id,
                guest_id,
                room_id: None,
                checkin: Some(Utc::now() - Duration::hours(checkin_hours_ago)),
                checkout: Some(Utc::now() + Duration::days(1)),
                status: StayStatus::InHouse,
                external_reservation_id: None,
            })
            .expect("stay");
    }

    #[test]
    fn unit_derive_stay_state_treats_overdue_checkout_as_post_stay() {
        let now = Utc::now();
        let stay = Stay {
            id: 1,
            tenant_id: 1,
            guest_id: 1,
            room_id: None,
            checkin: Some(now - Duration::days(2)),
            checkout: Some(now - Duration::hours(1)),
            status: StayStatus::InHouse,
            opted_out: false,
            external_reservation_id: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(derive_stay_state(Some(&stay), now), StayState::PostStay);
        assert_eq!(derive_stay_state(None, now), StayState::Unknown);

        let upcoming = Stay {
            checkin: Some(now + Duration::days(1)),
            checkout: Some(now + Duration::days(3)),
            ..stay.clone()
        };
        assert_eq!(derive_stay_state(Some(&upcoming), now), StayState::PreStay);

        // An early checkout stays POST_STAY even though its departure date
        // lies ahead.
        let early_checkout = Stay {
            checkin: Some(now - Duration::days(1)),
            checkout: Some(now + Duration::days(1)),
            status: StayStatus::PostStay,
            ..stay.clone()
        };
        assert_eq!(derive_stay_state(Some(&early_checkout), now), StayState::PostStay);
    }

    #[test]
    fn functional_missing_hinted_tenant_resolves_to_none() {
        let (_dir, store) = test_store();
        let resolved = resolve_identity(&store, "+40721000111", Some(404), 404).expect("resolve");
        assert!(resolved.is_none());
    }

    #[test]
    fn functional_unknown_sender_lands_in_default_tenant() {
        let (_dir, store) = test_store();
        let default = tenant(&store, "Catch-all");
        let context = resolve_identity(&store, "+40 721 000 111", None, default.id)
            .expect("resolve")
            .expect("context");
        assert!(context.created_guest);
        assert_eq!(context.tenant.id, default.id);
        assert_eq!(context.state, StayState::Unknown);
        let contact = store
            .get_contact(context.guest.id)
            .expect("contact")
            .expect("row");
        assert_eq!(contact.phone.as_deref(), Some("40721000111"));
    }

    #[test]
    fn functional_resolution_is_stable_across_identifier_formats() {
        let (_dir, store) = test_store();
        let default = tenant(&store, "Catch-all");
        let first = resolve_identity(&store, "0040721000111", None, default.id)
            .expect("resolve")
            .expect("context");
        let second = resolve_identity(&store, "0721000111", None, default.id)
            .expect("resolve")
            .expect("context");
        assert_eq!(first.guest.id, second.guest.id);
        assert!(!second.created_guest);
    }

    #[test]
    fn functional_global_discovery_overrides_default_tenant() {
        let (_dir, store) = test_store();
        let default = tenant(&store, "Catch-all");
        let hotel = tenant(&store, "Hotel Aurora");
        let seeded = resolve_identity(&store, "40721000111", Some(hotel.id), default.id)
            .expect("resolve")
            .expect("context");
        assert_eq!(seeded.tenant.id, hotel.id);
        in_house_stay(&store, hotel.id, seeded.guest.id, 5);

        let discovered = resolve_identity(&store, "+40721000111", None, default.id)
            .expect("resolve")
            .expect("context");
        assert_eq!(discovered.tenant.id, hotel.id);
        assert_eq!(discovered.guest.id, seeded.guest.id);
        assert_eq!(discovered.state, StayState::InHouse);
    }

    #[test]
    fn functional_hinted_match_records_contact_phone() {
        let (_dir, store) = test_store();
        let default = tenant(&store, "Catch-all");
        let hotel = tenant(&store, "Hotel Aurora");
        let hash = stayline_core::hash_identifier("40721000111");
        let (guest, _) = store.get_or_create_guest(hotel.id, &hash).expect("guest");

        let context = resolve_identity(&store, "+40721000111", Some(hotel.id), default.id)
            .expect("resolve")
            .expect("context");
        assert_eq!(context.guest.id, guest.id);
        assert!(!context.created_guest);
        let contact = store.get_contact(guest.id).expect("contact").expect("row");
        assert_eq!(contact.phone.as_deref(), Some("40721000111"));
    }

    #[test]
    fn functional_gibberish_identifier_resolves_to_none() {
        let (_dir, store) = test_store();
        let default = tenant(&store, "Catch-all");
        let resolved = resolve_identity(&store, "not-a-number", None, default.id).expect("resolve");
        assert!(resolved.is_none());
    }

    #[test]
    fn functional_opaque_token_creates_placeholder_until_linked() {
        let (_dir, store) = test_store();
        let hotel = tenant(&store, "Hotel Aurora");
        let context = resolve_identity_by_channel_user(&store, "U-abc123", hotel.id)
            .expect("resolve");
        assert!(context.created_guest);
        assert!(!context.guest.is_linked());

        store
            .link_channel_user(context.guest.id, "U-abc123")
            .expect("link");
        let linked = resolve_identity_by_channel_user(&store, "U-abc123", hotel.id)
            .expect("resolve");
        assert_eq!(linked.guest.id, context.guest.id);
        assert!(linked.guest.is_linked());
    }
}
