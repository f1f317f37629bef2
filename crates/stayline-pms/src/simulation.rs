//! Scripted connector for demos and tests.

use anyhow::{Context, Result};

use crate::contract::{NormalizedReservation, PmsConnector, SyncWindow};

/// Replays a fixed reservation script instead of calling a vendor. Tenants
/// provisioned with the `simulation` (or `demo`) PMS kind store the script
/// as a JSON array in the credential slot, so demo properties need no
/// external account at all.
pub struct SimulationConnector {
    reservations: Vec<NormalizedReservation>,
}

impl SimulationConnector {
    pub fn new(reservations: Vec<NormalizedReservation>) -> Self {
        Self { reservations }
    }

    /// Parses a JSON reservation script. An empty script is a valid,
    /// quiet property.
    pub fn from_script(script: &str) -> Result<Self> {
        let trimmed = script.trim();
        if trimmed.is_empty() {
            return Ok(Self::new(Vec::new()));
        }
        let reservations =
            serde_json::from_str(trimmed).context("parsing simulation reservation script")?;
        Ok(Self::new(reservations))
    }
}

impl PmsConnector for SimulationConnector {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn fetch_reservations(&self, window: SyncWindow) -> Result<Vec<NormalizedReservation>> {
        Ok(self
            .reservations
            .iter()
            .filter(|reservation| {
                // Same visibility rule a live vendor applies: only
                // reservations overlapping the requested window.
                let starts_before_end =
                    reservation.checkin.map_or(true, |checkin| checkin <= window.to);
                let ends_after_start = reservation
                    .checkout
                    .map_or(true, |checkout| checkout >= window.from);
                starts_before_end && ends_after_start
            })
            .cloned()
            .collect())
    }

    fn test_connection(&self) -> Result<()> {
        Ok(())
    }
}

impl Default for SimulationConnector {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
