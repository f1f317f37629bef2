//! Reservation reconciliation: PMS truth into local lifecycle state.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use stayline_core::{canonical_phone, hash_identifier, variant_hashes};
use stayline_store::{
    Guest, JourneyTrigger, NewStay, Stay, StayStatus, StayStore, Tenant,
};

use crate::contract::{
    build_connector, NormalizedReservation, PmsConnector, ReservationLifecycle, SyncWindow,
};

/// Counters from one sync pass, aggregated across tenants.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub tenants: usize,
    pub reservations: usize,
    pub checkins: usize,
    pub checkouts: usize,
    pub skipped: usize,
    pub tenant_errors: usize,
}

impl SyncStats {
    fn absorb(&mut self, other: SyncStats) {
        self.tenants += other.tenants;
        self.reservations += other.reservations;
        self.checkins += other.checkins;
        self.checkouts += other.checkouts;
        self.skipped += other.skipped;
        self.tenant_errors += other.tenant_errors;
    }
}

/// Runs one reconciliation pass over every PMS-enabled tenant.
///
/// Tenants are isolated: one vendor outage marks that tenant errored and
/// the pass moves on.
pub fn run_pms_sync(store: &StayStore, now: DateTime<Utc>) -> Result<SyncStats> {
    let mut stats = SyncStats::default();
    for tenant in store.list_pms_tenants().context("listing PMS tenants")? {
        let connector = match build_connector(&tenant) {
            Ok(connector) => connector,
            Err(error) => {
                warn!(tenant_id = tenant.id, error = %error, "skipping tenant: connector build failed");
                stats.tenant_errors += 1;
                continue;
            }
        };
        match sync_tenant(store, &tenant, connector.as_ref(), now) {
            Ok(tenant_stats) => stats.absorb(tenant_stats),
            Err(error) => {
                warn!(
                    tenant_id = tenant.id,
                    connector = connector.name(),
                    error = %error,
                    "tenant sync failed"
                );
                stats.tenant_errors += 1;
            }
        }
    }
    info!(
        tenants = stats.tenants,
        reservations = stats.reservations,
        checkins = stats.checkins,
        checkouts = stats.checkouts,
        errors = stats.tenant_errors,
        "pms sync pass complete"
    );
    Ok(stats)
}

/// Reconciles one tenant against its connector.
pub fn sync_tenant(
    store: &StayStore,
    tenant: &Tenant,
    connector: &dyn PmsConnector,
    now: DateTime<Utc>,
) -> Result<SyncStats> {
    let mut stats = SyncStats {
        tenants: 1,
        ..SyncStats::default()
    };
    let reservations = connector
        .fetch_reservations(SyncWindow::around(now))
        .with_context(|| format!("fetching reservations via {}", connector.name()))?;
    for reservation in reservations {
        stats.reservations += 1;
        let Some(guest) = resolve_reservation_guest(store, tenant, &reservation)? else {
            debug!(
                tenant_id = tenant.id,
                reservation = reservation.external_reservation_id,
                "reservation skipped: no usable guest phone"
            );
            stats.skipped += 1;
            continue;
        };
        match reservation.lifecycle {
            ReservationLifecycle::InHouse => {
                handle_checkin(store, tenant, &guest, &reservation, now)?;
                stats.checkins += 1;
            }
            ReservationLifecycle::CheckedOut => {
                if handle_checkout(store, tenant, &guest, &reservation, now)? {
                    stats.checkouts += 1;
                } else {
                    stats.skipped += 1;
                }
            }
        }
    }
    Ok(stats)
}

/// Maps a reservation's guest onto a local guest row, PMS contact details
/// overwriting whatever channel hints came first.
fn resolve_reservation_guest(
    store: &StayStore,
    tenant: &Tenant,
    reservation: &NormalizedReservation,
) -> Result<Option<Guest>> {
    let Some(canonical) = canonical_phone(&reservation.guest_phone, &tenant.country_code) else {
        return Ok(None);
    };
    let hashes = variant_hashes(&reservation.guest_phone, &tenant.country_code);
    let guest = match store
        .find_guest_by_hashes(tenant.id, &hashes)
        .context("guest lookup by phone variants")?
    {
        Some(guest) => guest,
        None => {
            let (guest, created) = store
                .get_or_create_guest(tenant.id, &hash_identifier(&canonical))
                .context("guest get-or-create from reservation")?;
            if created {
                info!(
                    tenant_id = tenant.id,
                    guest_id = guest.id,
                    "created guest from PMS reservation"
                );
            }
            guest
        }
    };
    store
        .upsert_contact_from_pms(
            guest.id,
            &reservation.guest_name,
            &canonical,
            reservation.guest_email.as_deref(),
        )
        .context("upserting contact from PMS")?;
    if let Some(language) = reservation.guest_language.as_deref() {
        store
            .set_preferred_language_if_unset(guest.id, language)
            .context("setting preferred language")?;
    }
    Ok(Some(guest))
}

/// Applies an in-house reservation: at most one IN_HOUSE stay per guest,
/// room turnover for the assigned room, and a welcome journey scheduled
/// once per stay.
fn handle_checkin(
    store: &StayStore,
    tenant: &Tenant,
    guest: &Guest,
    reservation: &NormalizedReservation,
    now: DateTime<Utc>,
) -> Result<Stay> {
    let room_id = match &reservation.room_label {
        Some(label) => Some(
            store
                .get_or_create_room(tenant.id, label)
                .context("room get-or-create")?
                .id,
        ),
        None => None,
    };

    let stay = match store
        .find_stay_by_reservation(tenant.id, &reservation.external_reservation_id)
        .context("stay lookup by reservation id")?
    {
        Some(existing) => {
            store
                .update_stay_for_checkin(existing.id, room_id, reservation.checkin, reservation.checkout)
                .context("re-applying check-in")?;
            store
                .get_stay(existing.id)?
                .unwrap_or(existing)
        }
        None => {
            // First sighting of this reservation. Prior IN_HOUSE stays of
            // this guest are leftovers from missed checkout events; close
            // them before asserting the new occupancy. Re-syncs of a known
            // reservation never reach this branch, so a stay the guest
            // already holds is not flipped on every pass.
            let closed = store
                .close_in_house_stays_for_guest(guest.id)
                .context("closing prior stays")?;
            if closed > 0 {
                debug!(guest_id = guest.id, closed, "closed lingering in-house stays");
            }
            let stay = store
                .insert_stay(NewStay {
                    tenant_id: tenant.id,
                    guest_id: guest.id,
                    room_id,
                    checkin: reservation.checkin,
                    checkout: reservation.checkout,
                    status: StayStatus::InHouse,
                    external_reservation_id: Some(reservation.external_reservation_id.clone()),
                })
                .context("creating stay from reservation")?;
            if let Some(room_id) = room_id {
                let turned_over = store
                    .close_in_house_stays_for_room(room_id, guest.id)
                    .context("room turnover")?;
                if turned_over > 0 {
                    info!(room_id, turned_over, "room turnover closed previous occupancy");
                }
            }
            stay
        }
    };

    schedule_journey(store, tenant, guest, &stay, JourneyTrigger::AfterCheckinWelcome, now)?;
    Ok(stay)
}

/// Applies a checked-out reservation. Returns false when no IN_HOUSE stay
/// matches, which makes repeated checkout events no-ops.
fn handle_checkout(
    store: &StayStore,
    tenant: &Tenant,
    guest: &Guest,
    reservation: &NormalizedReservation,
    now: DateTime<Utc>,
) -> Result<bool> {
    let Some(stay) = store
        .find_in_house_stay_by_reservation(tenant.id, &reservation.external_reservation_id)
        .context("in-house stay lookup")?
    else {
        return Ok(false);
    };
    store
        .set_stay_status(stay.id, StayStatus::PostStay)
        .context("closing stay on checkout")?;
    info!(
        tenant_id = tenant.id,
        stay_id = stay.id,
        reservation = reservation.external_reservation_id,
        "stay checked out"
    );
    schedule_journey(store, tenant, guest, &stay, JourneyTrigger::AfterCheckoutFeedback, now)?;
    Ok(true)
}

/// Schedules the tenant's journey for `trigger` against this stay, unless
/// the stay opted out or a live event already exists.
fn schedule_journey(
    store: &StayStore,
    tenant: &Tenant,
    guest: &Guest,
    stay: &Stay,
    trigger: JourneyTrigger,
    now: DateTime<Utc>,
) -> Result<()> {
    if stay.opted_out {
        return Ok(());
    }
    let Some(journey) = store
        .find_active_journey(tenant.id, trigger)
        .context("journey lookup")?
    else {
        return Ok(());
    };
    if store
        .has_live_journey_event(journey.id, stay.id)
        .context("live journey event probe")?
    {
        return Ok(());
    }
    // A journey without its own delay falls back to the tenant's welcome
    // delay; feedback asks go out immediately.
    let delay_minutes = journey.delay_minutes.unwrap_or_else(|| match trigger {
        JourneyTrigger::AfterCheckinWelcome => tenant.settings.welcome_delay_minutes,
        JourneyTrigger::AfterCheckoutFeedback => 0,
    });
    let run_at = now + Duration::minutes(delay_minutes.max(0));
    let event = store
        .insert_journey_event(tenant.id, journey.id, guest.id, stay.id, run_at)
        .context("scheduling journey event")?;
    debug!(
        tenant_id = tenant.id,
        event_id = event.id,
        trigger = trigger.as_str(),
        run_at = %run_at,
        "journey event scheduled"
    );
    Ok(())
}
