//! Inbound message routing.
//!
//! One entry point, [`route_inbound`], takes a verified and decoded
//! webhook message through dedup, identity resolution, conversation
//! bookkeeping, session expiry, and the room-linking grammar. Anything
//! that is not a routing concern (answering the guest) happens downstream
//! of the [`RouteOutcome::Routed`] result.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use stayline_core::{canonical_phone, variant_hashes, OutboundSender};
use stayline_identity::{
    derive_stay_state, resolve_identity, resolve_identity_by_channel_user, IdentityContext,
    StayState,
};
use stayline_store::{
    Channel, Conversation, MessageDirection, MessageSender, StayStatus, StayStore,
};

use crate::ingress::InboundMessage;
use crate::pending_link::PendingLinkCache;
use crate::room_code::{is_bare_room_number, parse_room_link_code, RoomLinkCode};

/// Repeated identical inbound text inside this window is dropped without
/// being re-recorded.
const SPAM_SUPPRESSION_WINDOW: Duration = Duration::seconds(30);

/// Shared dependencies for the routing engine.
pub struct RouterContext<'a> {
    pub store: &'a StayStore,
    pub sender: &'a dyn OutboundSender,
    pub pending_links: &'a PendingLinkCache,
    /// Catch-all tenant for senders no hint or discovery can place.
    pub default_tenant_id: i64,
}

/// One verified inbound delivery plus its endpoint configuration.
#[derive(Debug, Clone)]
pub struct InboundEnvelope {
    pub channel: Channel,
    /// Tenant the receiving endpoint is provisioned for, when dedicated.
    pub tenant_hint: Option<i64>,
    pub message: InboundMessage,
}

/// What routing decided about one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Provider re-delivered a message id we already recorded.
    DuplicateDelivery,
    /// Identical text inside the suppression window.
    Suppressed,
    /// The sender identifier yields no identity (no usable digits).
    Unresolvable,
    /// Linked session sat idle past the tenant's expiry; fresh scan needed.
    SessionExpired,
    /// Room attached to the conversation.
    RoomLinked,
    /// Link parked awaiting a "yes" from the sender.
    LinkPending,
    /// A parked or code-proven link was committed.
    LinkConfirmed,
    /// Room code failed token validation.
    InvalidRoomCode,
    /// Sender landed in the catch-all tenant with nothing to place them;
    /// asked to scan their room's code.
    NeedsRoomCode,
    /// Plain guest message, stored and handed to the reply pipeline.
    Routed,
}

/// Routes one inbound message end to end.
pub fn route_inbound(
    context: &RouterContext<'_>,
    envelope: &InboundEnvelope,
    now: DateTime<Utc>,
) -> Result<RouteOutcome> {
    let message = &envelope.message;
    if let Some(provider_message_id) = message.provider_message_id.as_deref() {
        if context
            .store
            .has_incoming_with_provider_id(provider_message_id)
            .context("provider message id dedup")?
        {
            debug!(provider_message_id, "dropping re-delivered message");
            return Ok(RouteOutcome::DuplicateDelivery);
        }
    }

    let Some(mut identity) = resolve(context, envelope)? else {
        warn!(sender = message.sender_id, "unresolvable sender identifier");
        return Ok(RouteOutcome::Unresolvable);
    };
    // Shared-endpoint ambiguity: a sender no in-house discovery could place
    // may still have an open exchange with some tenant; reuse it rather
    // than fork a catch-all conversation.
    if envelope.channel == Channel::SharedPhone
        && identity.tenant.id == context.default_tenant_id
        && identity.state != StayState::InHouse
    {
        if let Some(adopted) = adopt_open_conversation(context, &message.sender_id, &identity)? {
            identity = adopted;
        }
    }
    if let Some(name) = message.sender_name.as_deref() {
        context
            .store
            .ensure_contact_name(identity.guest.id, name)
            .context("storing profile name hint")?;
    }

    let active_stay = identity
        .stay
        .as_ref()
        .filter(|stay| stay.status == StayStatus::InHouse);
    let conversation = context
        .store
        .open_conversation(identity.tenant.id, identity.guest.id, envelope.channel, active_stay)
        .context("opening conversation")?;

    let text = message.text.trim();
    if !text.is_empty()
        && context
            .store
            .has_recent_incoming_text(conversation.id, &message.text, now - SPAM_SUPPRESSION_WINDOW)
            .context("spam suppression probe")?
    {
        debug!(conversation_id = conversation.id, "suppressing repeated text");
        return Ok(RouteOutcome::Suppressed);
    }
    context
        .store
        .insert_message(
            conversation.id,
            MessageSender::Guest,
            MessageDirection::Incoming,
            &message.text,
            message.provider_message_id.as_deref(),
        )
        .context("recording inbound message")?;

    if session_expired(&identity, &conversation, now) {
        context
            .store
            .expire_conversation(conversation.id)
            .context("expiring idle session")?;
        info!(conversation_id = conversation.id, "linked session expired");
        reply(
            context,
            envelope,
            &identity,
            conversation.id,
            "This chat session has expired. Please scan the code in your room to reconnect.",
        )?;
        return Ok(RouteOutcome::SessionExpired);
    }

    let pending_key = pending_link_key(envelope.channel, &message.sender_id);
    if text.eq_ignore_ascii_case("yes") {
        if let Some((guest_id, room_id)) = context.pending_links.take_fresh(&pending_key) {
            commit_link(context, envelope, &conversation, guest_id, room_id, now)?;
            reply(
                context,
                envelope,
                &identity,
                conversation.id,
                "You are connected to your room. How can we help?",
            )?;
            return Ok(RouteOutcome::LinkConfirmed);
        }
    }

    // A bare number only ever links a room-less conversation; it must
    // never silently move an already linked one.
    let code = parse_room_link_code(text).or_else(|| {
        (envelope.channel == Channel::SharedPhone
            && conversation.room_id.is_none()
            && is_bare_room_number(text))
        .then(|| RoomLinkCode {
            room_label: text.to_string(),
            tenant_id: None,
            token: None,
        })
    });
    if let Some(code) = code {
        return handle_room_code(context, envelope, identity, conversation, code, now);
    }

    if envelope.channel == Channel::SharedPhone
        && identity.tenant.id == context.default_tenant_id
    {
        reply(
            context,
            envelope,
            &identity,
            conversation.id,
            "Please scan the code in your room so we can connect you to your hotel.",
        )?;
        return Ok(RouteOutcome::NeedsRoomCode);
    }

    Ok(RouteOutcome::Routed)
}

/// Looks for an OPEN conversation in any tenant whose guest matches the
/// sender's hash set and rebuilds the identity around it.
fn adopt_open_conversation(
    context: &RouterContext<'_>,
    sender_id: &str,
    current: &IdentityContext,
) -> Result<Option<IdentityContext>> {
    let hashes = variant_hashes(sender_id, &current.tenant.country_code);
    let Some(conversation) = context
        .store
        .find_open_conversation_by_hashes(Channel::SharedPhone, &hashes)
        .context("open conversation probe")?
    else {
        return Ok(None);
    };
    if conversation.tenant_id == context.default_tenant_id {
        return Ok(None);
    }
    let Some(tenant) = context
        .store
        .get_tenant(conversation.tenant_id)
        .context("loading adopted tenant")?
    else {
        return Ok(None);
    };
    let Some(guest) = context
        .store
        .get_guest(conversation.guest_id)
        .context("loading adopted guest")?
    else {
        return Ok(None);
    };
    let stay = context
        .store
        .latest_stay_for_guest(guest.id)
        .context("loading adopted stay")?;
    let state = derive_stay_state(stay.as_ref(), Utc::now());
    debug!(
        tenant_id = tenant.id,
        guest_id = guest.id,
        conversation_id = conversation.id,
        "adopted tenant from open conversation"
    );
    Ok(Some(IdentityContext {
        tenant,
        guest,
        stay,
        state,
        created_guest: false,
    }))
}

fn resolve(
    context: &RouterContext<'_>,
    envelope: &InboundEnvelope,
) -> Result<Option<IdentityContext>> {
    match envelope.channel {
        Channel::SharedPhone => resolve_identity(
            context.store,
            &envelope.message.sender_id,
            envelope.tenant_hint,
            context.default_tenant_id,
        ),
        Channel::DirectChat => {
            let tenant_id = envelope.tenant_hint.unwrap_or(context.default_tenant_id);
            resolve_identity_by_channel_user(context.store, &envelope.message.sender_id, tenant_id)
                .map(Some)
        }
    }
}

/// A conversation with a linked room expires once its last scan is older
/// than the tenant's idle window.
fn session_expired(
    identity: &IdentityContext,
    conversation: &Conversation,
    now: DateTime<Utc>,
) -> bool {
    let settings = &identity.tenant.settings;
    if !settings.session_expiry_enabled || conversation.room_id.is_none() {
        return false;
    }
    match conversation.last_link_scan_at {
        Some(scan_at) => now - scan_at > Duration::hours(settings.session_idle_hours),
        None => false,
    }
}

fn handle_room_code(
    context: &RouterContext<'_>,
    envelope: &InboundEnvelope,
    identity: IdentityContext,
    conversation: Conversation,
    code: RoomLinkCode,
    now: DateTime<Utc>,
) -> Result<RouteOutcome> {
    // A code can carry its own tenant marker; a scan from a different
    // property re-homes the whole exchange there. The code must pass the
    // target property's token registry first: a rejected scan leaves no
    // guest or conversation behind in the named tenant.
    let rehome_target = match code.tenant_id {
        Some(target) if target != identity.tenant.id => {
            if context
                .store
                .get_tenant(target)
                .context("loading code tenant")?
                .is_none()
            {
                reply(
                    context,
                    envelope,
                    &identity,
                    conversation.id,
                    "That room code is not valid here.",
                )?;
                return Ok(RouteOutcome::InvalidRoomCode);
            }
            Some(target)
        }
        _ => None,
    };

    let gated_tenant_id = rehome_target.unwrap_or(identity.tenant.id);
    if !room_code_token_valid(context, gated_tenant_id, &code)? {
        info!(
            tenant_id = gated_tenant_id,
            room = code.room_label,
            "rejected room code with missing or unknown token"
        );
        reply(
            context,
            envelope,
            &identity,
            conversation.id,
            "That room code is not valid. Please scan the code printed in your room.",
        )?;
        return Ok(RouteOutcome::InvalidRoomCode);
    }

    let (identity, conversation) = match rehome_target {
        Some(target) => {
            let Some(rehomed) = rehome(context, envelope, target)? else {
                reply(
                    context,
                    envelope,
                    &identity,
                    conversation.id,
                    "That room code is not valid here.",
                )?;
                return Ok(RouteOutcome::InvalidRoomCode);
            };
            rehomed
        }
        None => (identity, conversation),
    };

    let tenant = &identity.tenant;
    let room = context
        .store
        .get_or_create_room(tenant.id, &code.room_label)
        .context("room get-or-create")?;
    let occupant = context
        .store
        .find_in_house_stay_for_room_label(tenant.id, &code.room_label)
        .context("room occupancy lookup")?;

    match occupant {
        // The room's registered stay belongs to a different guest record.
        // The link is parked until the sender confirms: the code may have
        // been photographed, or the stay may belong to a companion.
        Some(stay) if stay.guest_id != identity.guest.id => {
            context.pending_links.put(
                &pending_link_key(envelope.channel, &envelope.message.sender_id),
                stay.guest_id,
                room.id,
            );
            let registered_name = context
                .store
                .get_contact(stay.guest_id)
                .context("loading registered guest contact")?
                .and_then(|contact| contact.full_name);
            let prompt = match registered_name {
                Some(name) => format!("Are you {name}? Reply YES to connect to this room."),
                None => "Reply YES to connect to this room.".to_string(),
            };
            reply(context, envelope, &identity, conversation.id, &prompt)?;
            Ok(RouteOutcome::LinkPending)
        }
        _ => {
            context
                .store
                .set_conversation_room(conversation.id, room.id, now)
                .context("linking room to conversation")?;
            info!(
                conversation_id = conversation.id,
                room_id = room.id,
                "room linked to conversation"
            );
            reply(
                context,
                envelope,
                &identity,
                conversation.id,
                "You are connected to your room. How can we help?",
            )?;
            Ok(RouteOutcome::RoomLinked)
        }
    }
}

/// Checks a code against a tenant's token registry. A tenant that never
/// registered tokens accepts any label; one with a registry only accepts
/// codes carrying a token mapped to the claimed room.
fn room_code_token_valid(
    context: &RouterContext<'_>,
    tenant_id: i64,
    code: &RoomLinkCode,
) -> Result<bool> {
    if !context
        .store
        .tenant_has_room_code_tokens(tenant_id)
        .context("token registry probe")?
    {
        return Ok(true);
    }
    let Some(token) = code.token.as_deref() else {
        return Ok(false);
    };
    Ok(context
        .store
        .room_for_token(tenant_id, token)
        .context("token lookup")?
        .is_some_and(|label| label.eq_ignore_ascii_case(&code.room_label)))
}

/// Re-resolves the sender under a different tenant and opens a conversation
/// there. Returns `None` when the target tenant does not exist.
fn rehome(
    context: &RouterContext<'_>,
    envelope: &InboundEnvelope,
    target_tenant_id: i64,
) -> Result<Option<(IdentityContext, Conversation)>> {
    if context
        .store
        .get_tenant(target_tenant_id)
        .context("loading code tenant")?
        .is_none()
    {
        return Ok(None);
    }
    let identity = match envelope.channel {
        Channel::SharedPhone => {
            let Some(identity) = resolve_identity(
                context.store,
                &envelope.message.sender_id,
                Some(target_tenant_id),
                context.default_tenant_id,
            )?
            else {
                return Ok(None);
            };
            identity
        }
        Channel::DirectChat => resolve_identity_by_channel_user(
            context.store,
            &envelope.message.sender_id,
            target_tenant_id,
        )?,
    };
    let conversation = context
        .store
        .open_conversation(identity.tenant.id, identity.guest.id, envelope.channel, None)
        .context("opening re-homed conversation")?;
    Ok(Some((identity, conversation)))
}

/// Commits a link: conversation repointed at the stay's guest, room
/// attached, and on opaque-token channels the platform user bound to the
/// guest for every future message.
fn commit_link(
    context: &RouterContext<'_>,
    envelope: &InboundEnvelope,
    conversation: &Conversation,
    guest_id: i64,
    room_id: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    context
        .store
        .set_conversation_guest(conversation.id, guest_id)
        .context("repointing conversation at linked guest")?;
    if envelope.channel == Channel::DirectChat {
        context
            .store
            .link_channel_user(guest_id, &envelope.message.sender_id)
            .context("binding channel user to guest")?;
    }
    context
        .store
        .set_conversation_room(conversation.id, room_id, now)
        .context("linking room after confirmation")?;
    info!(conversation_id = conversation.id, guest_id, room_id, "link committed");
    Ok(())
}

fn pending_link_key(channel: Channel, sender_id: &str) -> String {
    format!("{}:{sender_id}", channel.as_str())
}

fn reply(
    context: &RouterContext<'_>,
    envelope: &InboundEnvelope,
    identity: &IdentityContext,
    conversation_id: i64,
    text: &str,
) -> Result<()> {
    let recipient = match envelope.channel {
        Channel::SharedPhone => {
            canonical_phone(&envelope.message.sender_id, &identity.tenant.country_code)
                .unwrap_or_else(|| envelope.message.sender_id.clone())
        }
        Channel::DirectChat => envelope.message.sender_id.clone(),
    };
    if !context.sender.send(&recipient, text) {
        warn!(conversation_id, "reply delivery failed");
        return Ok(());
    }
    context
        .store
        .insert_message(
            conversation_id,
            MessageSender::Bot,
            MessageDirection::Outgoing,
            text,
            None,
        )
        .context("recording reply")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stayline_core::NullOutboundSender;
    use stayline_store::{NewStay, NewTenant, Tenant};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: StayStore,
        pending: PendingLinkCache,
        default_tenant: Tenant,
        hotel: Tenant,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().expect("tempdir");
        let store = StayStore::new(dir.path().join("stayline.db")).expect("store");
        let default_tenant = store
            .create_tenant(NewTenant {
                name: "Catch-all".to_string(),
                country_code: "40".to_string(),
                ..NewTenant::default()
            })
            .expect("tenant");
        let hotel = store
            .create_tenant(NewTenant {
                name: "Hotel Aurora".to_string(),
                country_code: "40".to_string(),
                ..NewTenant::default()
            })
            .expect("tenant");
        Fixture {
            _dir: dir,
            store,
            pending: PendingLinkCache::new(),
            default_tenant,
            hotel,
        }
    }

    fn context<'a>(fixture: &'a Fixture, sender: &'a NullOutboundSender) -> RouterContext<'a> {
        RouterContext {
            store: &fixture.store,
            sender,
            pending_links: &fixture.pending,
            default_tenant_id: fixture.default_tenant.id,
        }
    }

    fn envelope(channel: Channel, tenant_hint: Option<i64>, sender: &str, text: &str) -> InboundEnvelope {
        envelope_with_id(channel, tenant_hint, sender, text, None)
    }

    fn envelope_with_id(
        channel: Channel,
        tenant_hint: Option<i64>,
        sender: &str,
        text: &str,
        provider_message_id: Option<&str>,
    ) -> InboundEnvelope {
        InboundEnvelope {
            channel,
            tenant_hint,
            message: InboundMessage {
                sender_id: sender.to_string(),
                text: text.to_string(),
                provider_message_id: provider_message_id.map(str::to_string),
                sender_name: None,
            },
        }
    }

    /// Seeds an in-house stay in room 101 for a PMS-known guest.
    fn seed_occupied_room(fixture: &Fixture, phone_hash: &str) -> i64 {
        let (guest, _) = fixture
            .store
            .get_or_create_guest(fixture.hotel.id, phone_hash)
            .expect("guest");
        let room = fixture
            .store
            .get_or_create_room(fixture.hotel.id, "101")
            .expect("room");
        fixture
            .store
            .insert_stay(NewStay {
                tenant_id: fixture.hotel.id,
                guest_id: guest.id,
                room_id: Some(room.id),
                checkin: Some(Utc::now() - Duration::hours(4)),
                checkout: Some(Utc::now() + Duration::days(2)),
                status: StayStatus::InHouse,
                external_reservation_id: Some("R-1".to_string()),
            })
            .expect("stay");
        guest.id
    }

    #[test]
    fn functional_duplicate_provider_id_is_dropped() {
        let fixture = fixture();
        let sender = NullOutboundSender;
        let context = context(&fixture, &sender);
        let envelope = envelope_with_id(
            Channel::SharedPhone,
            None,
            "+40721000111",
            "hello",
            Some("m-1"),
        );
        assert_eq!(
            route_inbound(&context, &envelope, Utc::now()).expect("route"),
            RouteOutcome::NeedsRoomCode
        );
        assert_eq!(
            route_inbound(&context, &envelope, Utc::now()).expect("route"),
            RouteOutcome::DuplicateDelivery
        );
    }

    #[test]
    fn functional_repeated_text_is_suppressed_within_window() {
        let fixture = fixture();
        let sender = NullOutboundSender;
        let context = context(&fixture, &sender);
        let now = Utc::now();
        let first = envelope(Channel::SharedPhone, None, "+40721000111", "hello??");
        assert_eq!(
            route_inbound(&context, &first, now).expect("route"),
            RouteOutcome::NeedsRoomCode
        );
        assert_eq!(
            route_inbound(&context, &first, now + Duration::seconds(5)).expect("route"),
            RouteOutcome::Suppressed
        );
        // Outside the window the same text routes again.
        assert_eq!(
            route_inbound(&context, &first, now + Duration::minutes(5)).expect("route"),
            RouteOutcome::NeedsRoomCode
        );
    }

    #[test]
    fn functional_gibberish_sender_is_unresolvable() {
        let fixture = fixture();
        let sender = NullOutboundSender;
        let context = context(&fixture, &sender);
        let envelope = envelope(Channel::SharedPhone, None, "not-a-number", "hi");
        assert_eq!(
            route_inbound(&context, &envelope, Utc::now()).expect("route"),
            RouteOutcome::Unresolvable
        );
    }

    #[test]
    fn functional_shared_phone_foreign_room_requires_yes_confirmation() {
        let fixture = fixture();
        let occupant_id = seed_occupied_room(&fixture, "pms-guest-hash");
        let sender = NullOutboundSender;
        let context = context(&fixture, &sender);
        let now = Utc::now();

        let claim = envelope(
            Channel::SharedPhone,
            Some(fixture.hotel.id),
            "+40721000999",
            "101",
        );
        assert_eq!(
            route_inbound(&context, &claim, now).expect("route"),
            RouteOutcome::LinkPending
        );

        let confirm = envelope(
            Channel::SharedPhone,
            Some(fixture.hotel.id),
            "+40721000999",
            "YES",
        );
        assert_eq!(
            route_inbound(&context, &confirm, now).expect("route"),
            RouteOutcome::LinkConfirmed
        );
        let conversation = fixture
            .store
            .find_open_conversation(fixture.hotel.id, occupant_id, Channel::SharedPhone)
            .expect("lookup")
            .expect("conversation");
        assert!(conversation.room_id.is_some());
        assert!(conversation.last_link_scan_at.is_some());
        // A second YES with no parked link is just a message.
        assert_eq!(
            route_inbound(&context, &confirm, now + Duration::minutes(1)).expect("route"),
            RouteOutcome::Routed
        );
    }

    #[test]
    fn functional_direct_chat_code_binds_channel_user_after_yes() {
        let fixture = fixture();
        let occupant_id = seed_occupied_room(&fixture, "pms-guest-hash");
        let sender = NullOutboundSender;
        let context = context(&fixture, &sender);

        let scan = envelope(
            Channel::DirectChat,
            Some(fixture.hotel.id),
            "U-abc123",
            "connect room 101",
        );
        assert_eq!(
            route_inbound(&context, &scan, Utc::now()).expect("route"),
            RouteOutcome::LinkPending
        );
        assert!(
            fixture
                .store
                .get_guest(occupant_id)
                .expect("guest")
                .expect("row")
                .channel_user_id
                .is_none(),
            "no link before confirmation"
        );
        let confirm = envelope(Channel::DirectChat, Some(fixture.hotel.id), "U-abc123", "yes");
        assert_eq!(
            route_inbound(&context, &confirm, Utc::now()).expect("route"),
            RouteOutcome::LinkConfirmed
        );
        let guest = fixture
            .store
            .get_guest(occupant_id)
            .expect("guest")
            .expect("row");
        assert_eq!(guest.channel_user_id.as_deref(), Some("U-abc123"));
        // Future messages resolve straight to the linked guest.
        let followup = envelope(
            Channel::DirectChat,
            Some(fixture.hotel.id),
            "U-abc123",
            "what time is breakfast?",
        );
        assert_eq!(
            route_inbound(&context, &followup, Utc::now()).expect("route"),
            RouteOutcome::Routed
        );
    }

    #[test]
    fn functional_token_registry_rejects_unregistered_codes() {
        let fixture = fixture();
        seed_occupied_room(&fixture, "pms-guest-hash");
        let token = fixture
            .store
            .register_room_code_token(fixture.hotel.id, "101")
            .expect("token");
        let sender = NullOutboundSender;
        let context = context(&fixture, &sender);

        let missing_token = envelope(
            Channel::DirectChat,
            Some(fixture.hotel.id),
            "U-abc123",
            "connect room 101",
        );
        assert_eq!(
            route_inbound(&context, &missing_token, Utc::now()).expect("route"),
            RouteOutcome::InvalidRoomCode
        );
        let wrong_room = envelope(
            Channel::DirectChat,
            Some(fixture.hotel.id),
            "U-abc123",
            &format!("connect room 102 !{token}"),
        );
        assert_eq!(
            route_inbound(&context, &wrong_room, Utc::now()).expect("route"),
            RouteOutcome::InvalidRoomCode
        );
        let valid = envelope(
            Channel::DirectChat,
            Some(fixture.hotel.id),
            "U-abc123",
            &format!("connect room 101 !{token}"),
        );
        assert_eq!(
            route_inbound(&context, &valid, Utc::now()).expect("route"),
            RouteOutcome::LinkPending
        );
        let confirm = envelope(Channel::DirectChat, Some(fixture.hotel.id), "U-abc123", "yes");
        assert_eq!(
            route_inbound(&context, &confirm, Utc::now()).expect("route"),
            RouteOutcome::LinkConfirmed
        );
    }

    #[test]
    fn functional_idle_linked_session_expires_and_clears_room() {
        let fixture = fixture();
        seed_occupied_room(&fixture, "pms-guest-hash");
        let sender = NullOutboundSender;
        let context = context(&fixture, &sender);
        let scan_time = Utc::now() - Duration::days(3);

        let scan = envelope(
            Channel::DirectChat,
            Some(fixture.hotel.id),
            "U-abc123",
            "connect room 101",
        );
        assert_eq!(
            route_inbound(&context, &scan, scan_time).expect("route"),
            RouteOutcome::LinkPending
        );
        let confirm = envelope(Channel::DirectChat, Some(fixture.hotel.id), "U-abc123", "yes");
        assert_eq!(
            route_inbound(&context, &confirm, scan_time).expect("route"),
            RouteOutcome::LinkConfirmed
        );

        // Default idle window is 48 hours; three days later the session is
        // gone and the room link with it.
        let late = envelope(
            Channel::DirectChat,
            Some(fixture.hotel.id),
            "U-abc123",
            "hello again",
        );
        assert_eq!(
            route_inbound(&context, &late, Utc::now()).expect("route"),
            RouteOutcome::SessionExpired
        );
        let guest = fixture
            .store
            .find_guest_by_channel_user(fixture.hotel.id, "U-abc123")
            .expect("lookup")
            .expect("guest");
        assert!(fixture
            .store
            .find_open_conversation(fixture.hotel.id, guest.id, Channel::DirectChat)
            .expect("lookup")
            .is_none());
    }

    #[test]
    fn functional_cross_tenant_code_rehomes_the_exchange() {
        let fixture = fixture();
        seed_occupied_room(&fixture, "pms-guest-hash");
        let sender = NullOutboundSender;
        let context = context(&fixture, &sender);

        // Sender first known only to the catch-all tenant, where a plain
        // message earns the scan-your-room prompt.
        let hello = envelope(Channel::SharedPhone, None, "+40721000999", "hi");
        assert_eq!(
            route_inbound(&context, &hello, Utc::now()).expect("route"),
            RouteOutcome::NeedsRoomCode
        );
        // A code carrying the hotel's tenant marker moves them over.
        let scan = envelope(
            Channel::SharedPhone,
            None,
            "+40721000999",
            &format!("connect room 101 #{}", fixture.hotel.id),
        );
        assert_eq!(
            route_inbound(&context, &scan, Utc::now()).expect("route"),
            RouteOutcome::LinkPending
        );
        // Unknown tenant marker is rejected outright.
        let bogus = envelope(
            Channel::SharedPhone,
            None,
            "+40721000999",
            "connect room 101 #9999",
        );
        assert_eq!(
            route_inbound(&context, &bogus, Utc::now()).expect("route"),
            RouteOutcome::InvalidRoomCode
        );
    }

    #[test]
    fn functional_rejected_cross_tenant_code_leaves_no_trace() {
        let fixture = fixture();
        seed_occupied_room(&fixture, "pms-guest-hash");
        let token = fixture
            .store
            .register_room_code_token(fixture.hotel.id, "101")
            .expect("token");
        let sender = NullOutboundSender;
        let context = context(&fixture, &sender);

        // A tokenless scan naming the hotel, from a sender the hotel has
        // never seen, is rejected before anything is written there.
        let scan = envelope(
            Channel::SharedPhone,
            None,
            "+40721000777",
            &format!("connect room 101 #{}", fixture.hotel.id),
        );
        assert_eq!(
            route_inbound(&context, &scan, Utc::now()).expect("route"),
            RouteOutcome::InvalidRoomCode
        );
        assert!(
            fixture
                .store
                .find_guest_by_hashes(
                    fixture.hotel.id,
                    &variant_hashes("+40721000777", &fixture.hotel.country_code),
                )
                .expect("lookup")
                .is_none(),
            "rejected scan created a guest under the named tenant"
        );
        // The follow-up plain message still lands on the catch-all tenant.
        let followup = envelope(Channel::SharedPhone, None, "+40721000777", "hello?");
        assert_eq!(
            route_inbound(&context, &followup, Utc::now()).expect("route"),
            RouteOutcome::NeedsRoomCode
        );

        // The genuine printed code still re-homes the exchange.
        let valid = envelope(
            Channel::SharedPhone,
            None,
            "+40721000777",
            &format!("connect room 101 #{} !{token}", fixture.hotel.id),
        );
        assert_eq!(
            route_inbound(&context, &valid, Utc::now()).expect("route"),
            RouteOutcome::LinkPending
        );
    }

    #[test]
    fn functional_open_hotel_conversation_is_adopted_without_a_hint() {
        let fixture = fixture();
        let sender = NullOutboundSender;
        let context = context(&fixture, &sender);

        // An exchange already open at the hotel, started via a hinted entry
        // point.
        let hinted = envelope(
            Channel::SharedPhone,
            Some(fixture.hotel.id),
            "+40721000555",
            "is late checkout possible?",
        );
        assert_eq!(
            route_inbound(&context, &hinted, Utc::now()).expect("route"),
            RouteOutcome::Routed
        );

        // The same sender arriving on the shared endpoint with no hint lands
        // on the catch-all tenant first, then gets folded back into the open
        // hotel exchange instead of being told to scan a code.
        let unhinted = envelope(Channel::SharedPhone, None, "+40721000555", "any news?");
        assert_eq!(
            route_inbound(&context, &unhinted, Utc::now()).expect("route"),
            RouteOutcome::Routed
        );
        let hotel_guest = fixture
            .store
            .find_guest_by_hashes(
                fixture.hotel.id,
                &variant_hashes("+40721000555", &fixture.hotel.country_code),
            )
            .expect("lookup")
            .expect("guest");
        assert!(fixture
            .store
            .find_open_conversation(fixture.hotel.id, hotel_guest.id, Channel::SharedPhone)
            .expect("lookup")
            .is_some());
    }
}
