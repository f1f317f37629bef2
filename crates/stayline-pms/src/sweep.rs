//! Stay sweep: safety net for missed checkout events.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use stayline_store::StayStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub closed: usize,
}

/// Force-closes IN_HOUSE stays whose checkout has passed. Catches tenants
/// whose PMS never delivered the checkout transition (vendor outage,
/// webhook gap, disabled integration).
pub fn run_stay_sweep(store: &StayStore, now: DateTime<Utc>) -> Result<SweepStats> {
    let closed = store
        .close_expired_stays(now)
        .context("closing expired stays")?;
    for stay in &closed {
        info!(
            tenant_id = stay.tenant_id,
            stay_id = stay.id,
            checkout = ?stay.checkout,
            "sweep closed overdue stay"
        );
    }
    Ok(SweepStats { closed: closed.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stayline_store::{NewStay, NewTenant, StayStatus};
    use tempfile::TempDir;

    #[test]
    fn functional_sweep_closes_only_overdue_stays() {
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
        let now = Utc::now();
        let overdue = store
            .insert_stay(NewStay {
                tenant_id: tenant.id,
                guest_id: guest.id,
                room_id: None,
                checkin: Some(now - Duration::days(2)),
                checkout: Some(now - Duration::hours(2)),
                status: StayStatus::InHouse,
                external_reservation_id: None,
            })
            .expect("stay");
        let open_ended = store
            .insert_stay(NewStay {
                tenant_id: tenant.id,
                guest_id: guest.id,
                room_id: None,
                checkin: Some(now - Duration::days(1)),
                checkout: None,
                status: StayStatus::InHouse,
                external_reservation_id: None,
            })
            .expect("stay");

        let stats = run_stay_sweep(&store, now).expect("sweep");
        assert_eq!(stats.closed, 1);
        assert_eq!(
            store.get_stay(overdue.id).expect("stay").expect("row").status,
            StayStatus::PostStay
        );
        // A stay without a checkout date is never swept.
        assert_eq!(
            store.get_stay(open_ended.id).expect("stay").expect("row").status,
            StayStatus::InHouse
        );
    }
}
