//! Worker runtime: periodic jobs over one shared store.
//!
//! Three loops drive the engine crates. The lifecycle tick runs the PMS
//! reconciliation pass and then immediately a journey cycle, so events
//! scheduled by a sync are considered for dispatch in the same tick.
//! Between syncs a lighter journey-only tick keeps dispatch latency low,
//! and a slow sweep tick closes stays whose checkout events never arrived
//! and retires tasks nobody will act on anymore.

pub mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use stayline_core::OutboundSender;
use stayline_journey::run_journey_cycle;
use stayline_pms::{run_pms_sync, run_stay_sweep};
use stayline_store::StayStore;
use stayline_tasks::run_task_cleanup;

pub use config::RuntimeConfig;

/// Transport placeholder for deployments without a wired channel provider:
/// every send is logged and accepted.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingOutboundSender;

impl OutboundSender for LoggingOutboundSender {
    fn send(&self, recipient: &str, text: &str) -> bool {
        info!(recipient, chars = text.len(), "outbound message (logging transport)");
        true
    }
}

/// Initializes the global tracing subscriber. `RUST_LOG` overrides the
/// default `info` filter.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// One lifecycle tick: reconcile every PMS tenant, then dispatch journeys.
pub fn run_lifecycle_tick(store: &StayStore, sender: &dyn OutboundSender) -> Result<()> {
    let now = Utc::now();
    run_pms_sync(store, now).context("pms sync pass")?;
    run_journey_cycle(store, sender, now).context("journey cycle")?;
    Ok(())
}

/// Runs the worker loops until Ctrl-C.
pub async fn run(config: RuntimeConfig) -> Result<()> {
    let store = StayStore::new(&config.db_path).context("opening store")?;
    let sender: Arc<dyn OutboundSender> = Arc::new(LoggingOutboundSender);
    info!(db_path = %config.db_path.display(), "stayline worker starting");

    let mut lifecycle_tick = interval(Duration::from_secs(config.sync_interval_secs));
    let mut journey_tick = interval(Duration::from_secs(config.journey_interval_secs));
    let mut sweep_tick = interval(Duration::from_secs(config.sweep_interval_secs));
    for tick in [&mut lifecycle_tick, &mut journey_tick, &mut sweep_tick] {
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    }

    loop {
        tokio::select! {
            _ = lifecycle_tick.tick() => {
                let store = store.clone();
                let sender = Arc::clone(&sender);
                spawn_job("lifecycle", move || run_lifecycle_tick(&store, sender.as_ref())).await;
            }
            _ = journey_tick.tick() => {
                let store = store.clone();
                let sender = Arc::clone(&sender);
                spawn_job("journey", move || {
                    run_journey_cycle(&store, sender.as_ref(), Utc::now()).map(|_| ())
                })
                .await;
            }
            _ = sweep_tick.tick() => {
                let store = store.clone();
                spawn_job("sweep", move || {
                    run_stay_sweep(&store, Utc::now())?;
                    run_task_cleanup(&store, Utc::now()).map(|_| ())
                })
                .await;
            }
            result = tokio::signal::ctrl_c() => {
                result.context("listening for shutdown signal")?;
                info!("shutdown signal received");
                break;
            }
        }
    }
    Ok(())
}

/// Runs one blocking job off the async runtime. Job failures are logged,
/// never fatal: the next tick retries from current state.
async fn spawn_job<F>(name: &'static str, job: F)
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(Ok(())) => {}
        Ok(Err(job_error)) => warn!(job = name, error = %job_error, "job failed"),
        Err(join_error) => error!(job = name, error = %join_error, "job panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stayline_pms::{NormalizedReservation, ReservationLifecycle};
    use stayline_store::{JourneyTrigger, NewTenant, PmsKind, StayStatus};
    use tempfile::TempDir;

    #[test]
    fn functional_lifecycle_tick_syncs_then_dispatches_in_one_pass() {
        let dir = TempDir::new().expect("tempdir");
        let store = StayStore::new(dir.path().join("stayline.db")).expect("store");
        let now = Utc::now();
        let script = vec![NormalizedReservation {
            external_reservation_id: "R-1".to_string(),
            lifecycle: ReservationLifecycle::InHouse,
            guest_name: "Ana Pop".to_string(),
            guest_phone: "+40721000111".to_string(),
            guest_email: None,
            guest_language: None,
            room_label: Some("101".to_string()),
            checkin: Some(now - chrono::Duration::hours(1)),
            checkout: Some(now + chrono::Duration::days(2)),
        }];
        let tenant = store
            .create_tenant(NewTenant {
                name: "Hotel Aurora".to_string(),
                country_code: "40".to_string(),
                pms_kind: Some(PmsKind::Simulation),
                pms_api_key: Some(serde_json_script(&script)),
                ..NewTenant::default()
            })
            .expect("tenant");
        // Zero delay: the welcome is due the moment the sync schedules it.
        store
            .create_journey(tenant.id, JourneyTrigger::AfterCheckinWelcome, Some(0), "Welcome {name}!")
            .expect("journey");

        run_lifecycle_tick(&store, &LoggingOutboundSender).expect("tick");

        let stay = store
            .find_stay_by_reservation(tenant.id, "R-1")
            .expect("lookup")
            .expect("stay");
        assert_eq!(stay.status, StayStatus::InHouse);
        assert!(
            store
                .list_due_journey_events(Utc::now() + chrono::Duration::hours(1))
                .expect("due")
                .is_empty(),
            "welcome event dispatched within the same tick"
        );
    }

    fn serde_json_script(reservations: &[NormalizedReservation]) -> String {
        serde_json::to_string(reservations).expect("script json")
    }
}
