//! Journey scheduling: delayed lifecycle messages.
//!
//! The PMS engine creates PENDING journey events; this crate owns the
//! periodic cycle that cancels stale ones and dispatches the rest. Every
//! event is re-validated at send time, because minutes or hours pass
//! between scheduling and dispatch and the stay can change underneath.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use stayline_core::OutboundSender;
use stayline_identity::{derive_stay_state, StayState};
use stayline_store::{
    Channel, JourneyEvent, JourneyEventStatus, JourneyTrigger, MessageDirection, MessageSender,
    StayStore,
};

/// Events still PENDING this long past their run time were missed by too
/// many cycles to be worth sending; a welcome message half a day late
/// reads as noise.
const STALE_AFTER: Duration = Duration::minutes(30);

/// Outbound idempotency window: identical text sent to the conversation
/// within this window means a concurrent cycle already dispatched.
const OUTBOUND_DEDUP_WINDOW: Duration = Duration::minutes(5);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JourneyCycleStats {
    pub cancelled_stale: usize,
    pub dispatched: usize,
    pub cancelled_ineligible: usize,
    /// Due events left PENDING because their stay has not started yet.
    pub deferred: usize,
    pub failed: usize,
}

/// Runs one journey cycle: staleness pass first, then dispatch of due
/// events.
pub fn run_journey_cycle(
    store: &StayStore,
    sender: &dyn OutboundSender,
    now: DateTime<Utc>,
) -> Result<JourneyCycleStats> {
    let mut stats = JourneyCycleStats::default();
    stats.cancelled_stale = store
        .cancel_stale_journey_events(now - STALE_AFTER)
        .context("cancelling stale journey events")?;
    if stats.cancelled_stale > 0 {
        info!(cancelled = stats.cancelled_stale, "cancelled stale journey events");
    }

    for event in store
        .list_due_journey_events(now)
        .context("listing due journey events")?
    {
        match dispatch_event(store, sender, &event, now) {
            Ok(DispatchOutcome::Sent) => stats.dispatched += 1,
            Ok(DispatchOutcome::Deferred) => stats.deferred += 1,
            Ok(DispatchOutcome::Cancelled(reason)) => {
                debug!(event_id = event.id, reason, "journey event cancelled");
                stats.cancelled_ineligible += 1;
            }
            Err(error) => {
                warn!(event_id = event.id, error = %error, "journey dispatch failed");
                stats.failed += 1;
            }
        }
    }
    Ok(stats)
}

enum DispatchOutcome {
    Sent,
    Deferred,
    Cancelled(&'static str),
}

fn dispatch_event(
    store: &StayStore,
    sender: &dyn OutboundSender,
    event: &JourneyEvent,
    now: DateTime<Utc>,
) -> Result<DispatchOutcome> {
    let cancel = |reason: &'static str| -> Result<DispatchOutcome> {
        store
            .set_journey_event_status(event.id, JourneyEventStatus::Cancelled)
            .context("cancelling journey event")?;
        Ok(DispatchOutcome::Cancelled(reason))
    };

    let Some(journey) = store.get_journey(event.journey_id).context("loading journey")? else {
        return cancel("journey deleted");
    };
    if !journey.active {
        return cancel("journey deactivated");
    }
    let Some(stay) = store.get_stay(event.stay_id).context("loading stay")? else {
        return cancel("stay deleted");
    };
    if stay.opted_out {
        return cancel("stay opted out");
    }
    // Eligibility recheck: the stay must still be in the phase the trigger
    // targets. A welcome whose stay has not started yet stays PENDING; the
    // staleness pass bounds how long it can wait.
    let state = derive_stay_state(Some(&stay), now);
    match (journey.trigger, state) {
        (JourneyTrigger::AfterCheckinWelcome, StayState::InHouse) => {}
        (JourneyTrigger::AfterCheckinWelcome, StayState::PreStay) => {
            return Ok(DispatchOutcome::Deferred);
        }
        (JourneyTrigger::AfterCheckoutFeedback, StayState::PostStay) => {}
        _ => return cancel("stay phase changed"),
    }

    let Some(contact) = store.get_contact(event.guest_id).context("loading contact")? else {
        return cancel("guest has no contact details");
    };
    let Some(phone) = contact.phone.as_deref() else {
        return cancel("guest has no phone");
    };

    let text = render_template(&journey.template_text, contact.full_name.as_deref());
    let conversation = store
        .open_conversation(event.tenant_id, event.guest_id, Channel::SharedPhone, Some(&stay))
        .context("opening conversation for dispatch")?;
    if store
        .has_recent_outgoing_text(conversation.id, &text, now - OUTBOUND_DEDUP_WINDOW)
        .context("outbound dedup probe")?
    {
        // A concurrent cycle already delivered this text; record the event
        // as SENT without putting a second copy on the wire.
        store
            .set_journey_event_status(event.id, JourneyEventStatus::Sent)
            .context("marking duplicate dispatch sent")?;
        return Ok(DispatchOutcome::Sent);
    }

    // Commit SENT before the network call: a crash mid-send must never
    // replay the message to the guest.
    store
        .set_journey_event_status(event.id, JourneyEventStatus::Sent)
        .context("marking journey event sent")?;
    if !sender.send(phone, &text) {
        store
            .set_journey_event_status(event.id, JourneyEventStatus::Cancelled)
            .context("cancelling after delivery failure")?;
        warn!(event_id = event.id, "journey delivery failed");
        return Ok(DispatchOutcome::Cancelled("delivery failed"));
    }
    store
        .insert_message(
            conversation.id,
            MessageSender::Bot,
            MessageDirection::Outgoing,
            &text,
            None,
        )
        .context("recording journey message")?;
    info!(
        event_id = event.id,
        conversation_id = conversation.id,
        trigger = journey.trigger.as_str(),
        "journey message dispatched"
    );
    Ok(DispatchOutcome::Sent)
}

/// Fills the `{name}` placeholder from contact details, falling back to a
/// neutral greeting when the name is unknown.
fn render_template(template: &str, full_name: Option<&str>) -> String {
    let name = full_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("there");
    template.replace("{name}", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use stayline_store::{NewStay, NewTenant, StayStatus, Tenant};
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl OutboundSender for RecordingSender {
        fn send(&self, recipient: &str, text: &str) -> bool {
            if self.fail {
                return false;
            }
            self.sent
                .lock()
                .expect("lock")
                .push((recipient.to_string(), text.to_string()));
            true
        }
    }

    struct Fixture {
        _dir: TempDir,
        store: StayStore,
        tenant: Tenant,
        guest_id: i64,
        stay_id: i64,
        journey_id: i64,
    }

    fn fixture(trigger: JourneyTrigger, stay_status: StayStatus) -> Fixture {
        let dir = TempDir::new().expect("tempdir");
        let store = StayStore::new(dir.path().join("stayline.db")).expect("store");
        let tenant = store
            .create_tenant(NewTenant {
                name: "Hotel Aurora".to_string(),
                country_code: "40".to_string(),
                ..NewTenant::default()
            })
            .expect("tenant");
        let (guest, _) = store.get_or_create_guest(tenant.id, "hash-a").expect("guest");
        store
            .upsert_contact_from_pms(guest.id, "Ana Pop", "40721000111", None)
            .expect("contact");
        let now = Utc::now();
        let stay = store
            .insert_stay(NewStay {
                tenant_id: tenant.id,
                guest_id: guest.id,
                room_id: None,
                checkin: Some(now - Duration::hours(2)),
                checkout: Some(now + Duration::days(2)),
                status: stay_status,
                external_reservation_id: None,
            })
            .expect("stay");
        let journey = store
            .create_journey(tenant.id, trigger, Some(20), "Hi {name}, welcome!")
            .expect("journey");
        Fixture {
            _dir: dir,
            store,
            tenant: tenant.clone(),
            guest_id: guest.id,
            stay_id: stay.id,
            journey_id: journey.id,
        }
    }

    fn schedule(fixture: &Fixture, run_at: DateTime<Utc>) -> JourneyEvent {
        fixture
            .store
            .insert_journey_event(
                fixture.tenant.id,
                fixture.journey_id,
                fixture.guest_id,
                fixture.stay_id,
                run_at,
            )
            .expect("event")
    }

    #[test]
    fn functional_due_event_sends_rendered_message_and_commits_sent() {
        let fixture = fixture(JourneyTrigger::AfterCheckinWelcome, StayStatus::InHouse);
        let now = Utc::now();
        let event = schedule(&fixture, now - Duration::minutes(1));
        let sender = RecordingSender::default();

        let stats = run_journey_cycle(&fixture.store, &sender, now).expect("cycle");
        assert_eq!(stats.dispatched, 1);
        let sent = sender.sent.lock().expect("lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "40721000111");
        assert_eq!(sent[0].1, "Hi Ana Pop, welcome!");
        drop(sent);

        let conversation = fixture
            .store
            .find_open_conversation(fixture.tenant.id, fixture.guest_id, Channel::SharedPhone)
            .expect("lookup")
            .expect("conversation");
        assert!(fixture
            .store
            .has_recent_outgoing_text(conversation.id, "Hi Ana Pop, welcome!", now - Duration::minutes(1))
            .expect("probe"));
        // A rerun neither resends nor reschedules.
        let rerun = run_journey_cycle(&fixture.store, &sender, now).expect("cycle");
        assert_eq!(rerun.dispatched, 0);
        assert_eq!(sender.sent.lock().expect("lock").len(), 1);
        let _ = event;
    }

    #[test]
    fn functional_stale_event_is_cancelled_not_sent() {
        let fixture = fixture(JourneyTrigger::AfterCheckinWelcome, StayStatus::InHouse);
        let now = Utc::now();
        schedule(&fixture, now - Duration::hours(2));
        let sender = RecordingSender::default();

        let stats = run_journey_cycle(&fixture.store, &sender, now).expect("cycle");
        assert_eq!(stats.cancelled_stale, 1);
        assert_eq!(stats.dispatched, 0);
        assert!(sender.sent.lock().expect("lock").is_empty());
    }

    #[test]
    fn functional_phase_change_cancels_at_dispatch_time() {
        let fixture = fixture(JourneyTrigger::AfterCheckinWelcome, StayStatus::InHouse);
        let now = Utc::now();
        schedule(&fixture, now - Duration::minutes(1));
        // Guest checked out between scheduling and dispatch.
        fixture
            .store
            .set_stay_status(fixture.stay_id, StayStatus::PostStay)
            .expect("status");
        let sender = RecordingSender::default();

        let stats = run_journey_cycle(&fixture.store, &sender, now).expect("cycle");
        assert_eq!(stats.cancelled_ineligible, 1);
        assert!(sender.sent.lock().expect("lock").is_empty());
    }

    #[test]
    fn functional_delivery_failure_cancels_event_without_message_record() {
        let fixture = fixture(JourneyTrigger::AfterCheckinWelcome, StayStatus::InHouse);
        let now = Utc::now();
        let event = schedule(&fixture, now - Duration::minutes(1));
        let sender = RecordingSender {
            fail: true,
            ..RecordingSender::default()
        };

        let stats = run_journey_cycle(&fixture.store, &sender, now).expect("cycle");
        assert_eq!(stats.cancelled_ineligible, 1);
        assert_eq!(stats.dispatched, 0);
        assert!(!fixture
            .store
            .has_live_journey_event(fixture.journey_id, fixture.stay_id)
            .expect("probe"));
        let refreshed = fixture
            .store
            .list_due_journey_events(now + Duration::hours(1))
            .expect("due");
        assert!(refreshed.iter().all(|candidate| candidate.id != event.id));
    }

    #[test]
    fn functional_welcome_for_not_yet_started_stay_stays_pending() {
        let fixture = fixture(JourneyTrigger::AfterCheckinWelcome, StayStatus::PreStay);
        let now = Utc::now();
        // Arrival is still ahead of us.
        fixture
            .store
            .update_stay_for_checkin(
                fixture.stay_id,
                None,
                Some(now + Duration::hours(6)),
                Some(now + Duration::days(2)),
            )
            .expect("dates");
        fixture
            .store
            .set_stay_status(fixture.stay_id, StayStatus::PreStay)
            .expect("status");
        schedule(&fixture, now - Duration::minutes(1));
        let sender = RecordingSender::default();

        let stats = run_journey_cycle(&fixture.store, &sender, now).expect("cycle");
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats.dispatched, 0);
        assert!(sender.sent.lock().expect("lock").is_empty());
        assert!(fixture
            .store
            .has_live_journey_event(fixture.journey_id, fixture.stay_id)
            .expect("probe"));
    }

    #[test]
    fn unit_render_template_falls_back_without_name() {
        assert_eq!(render_template("Hi {name}!", Some("Ana")), "Hi Ana!");
        assert_eq!(render_template("Hi {name}!", Some("  ")), "Hi there!");
        assert_eq!(render_template("Hi {name}!", None), "Hi there!");
    }
}
