//! Vendor-neutral connector contract.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use stayline_store::{PmsKind, Tenant};

use crate::apaleo::ApaleoConnector;
use crate::cloudbeds::CloudbedsConnector;
use crate::mews::MewsConnector;
use crate::simulation::SimulationConnector;

/// Reservation phase as reported by the PMS, already collapsed to the two
/// transitions the lifecycle engine acts on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationLifecycle {
    InHouse,
    CheckedOut,
}

impl ReservationLifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InHouse => "in_house",
            Self::CheckedOut => "checked_out",
        }
    }
}

/// A PMS reservation mapped into vendor-neutral shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedReservation {
    pub external_reservation_id: String,
    pub lifecycle: ReservationLifecycle,
    pub guest_name: String,
    pub guest_phone: String,
    #[serde(default)]
    pub guest_email: Option<String>,
    #[serde(default)]
    pub guest_language: Option<String>,
    #[serde(default)]
    pub room_label: Option<String>,
    #[serde(default)]
    pub checkin: Option<DateTime<Utc>>,
    #[serde(default)]
    pub checkout: Option<DateTime<Utc>>,
}

/// Time window a sync pass asks the PMS about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl SyncWindow {
    /// The window every periodic pass uses: one day back for late checkout
    /// events, one day forward for arrivals already marked in-house.
    pub fn around(now: DateTime<Utc>) -> Self {
        Self {
            from: now - Duration::days(1),
            to: now + Duration::days(1),
        }
    }
}

/// One PMS vendor integration.
pub trait PmsConnector: Send + Sync {
    /// Vendor name for logs.
    fn name(&self) -> &'static str;

    /// Fetches reservations overlapping `window` in normalized form.
    fn fetch_reservations(&self, window: SyncWindow) -> Result<Vec<NormalizedReservation>>;

    /// Cheap credential probe used by provisioning flows.
    fn test_connection(&self) -> Result<()>;
}

/// Builds the connector for a tenant from its persisted PMS configuration.
pub fn build_connector(tenant: &Tenant) -> Result<Box<dyn PmsConnector>> {
    let Some(kind) = tenant.pms_kind else {
        bail!("tenant {} has no PMS configured", tenant.id);
    };
    let Some(api_key) = tenant.pms_api_key.as_deref() else {
        bail!("tenant {} has no PMS credentials", tenant.id);
    };
    let property_id = tenant.pms_property_id.as_deref().unwrap_or_default();
    match kind {
        PmsKind::Apaleo => Ok(Box::new(ApaleoConnector::new(
            tenant.id,
            api_key,
            property_id,
        )?)),
        PmsKind::Cloudbeds => Ok(Box::new(CloudbedsConnector::new(
            tenant.id,
            api_key,
            property_id,
        )?)),
        PmsKind::Mews => Ok(Box::new(MewsConnector::new(api_key, property_id)?)),
        PmsKind::Simulation => Ok(Box::new(SimulationConnector::from_script(api_key)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_sync_window_spans_a_day_each_way() {
        let now = Utc::now();
        let window = SyncWindow::around(now);
        assert_eq!(window.to - window.from, Duration::days(2));
        assert!(window.from < now && now < window.to);
    }

    #[test]
    fn unit_normalized_reservation_deserializes_with_sparse_fields() {
        let reservation: NormalizedReservation = serde_json::from_str(
            r#"{
                "external_reservation_id": "R-9",
                "lifecycle": "in_house",
                "guest_name": "Ana Pop",
                "guest_phone": "+40721000111"
            }"#,
        )
        .expect("parse");
        assert_eq!(reservation.lifecycle, ReservationLifecycle::InHouse);
        assert!(reservation.room_label.is_none());
        assert!(reservation.checkout.is_none());
    }
}
