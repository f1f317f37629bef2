//! Property-management-system synchronization.
//!
//! Periodically reconciles each tenant's PMS reservations into local stay
//! lifecycle state. Vendor specifics stay behind [`PmsConnector`]; the
//! reconciliation engine in [`sync`] only ever sees normalized reservations.

pub mod apaleo;
pub mod cloudbeds;
pub mod contract;
pub mod mews;
pub mod simulation;
pub mod sweep;
pub mod sync;
mod token_cache;

pub use apaleo::ApaleoConnector;
pub use cloudbeds::CloudbedsConnector;
pub use contract::{
    build_connector, NormalizedReservation, PmsConnector, ReservationLifecycle, SyncWindow,
};
pub use mews::MewsConnector;
pub use simulation::SimulationConnector;
pub use sweep::{run_stay_sweep, SweepStats};
pub use sync::{run_pms_sync, sync_tenant, SyncStats};
pub use token_cache::BearerTokenCache;
