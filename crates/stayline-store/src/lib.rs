//! Authoritative relational persistence for Stayline.
//!
//! All durable state (tenants, guests, rooms, stays, conversations,
//! journeys, tasks, room-code tokens) lives in SQLite behind [`StayStore`].
//! Engines hold no durable in-process state of their own: every operation
//! opens a short-lived connection, so independent worker jobs can share one
//! database file safely. Get-or-create paths are written as atomic
//! `INSERT ... ON CONFLICT DO NOTHING` followed by a re-query, so concurrent
//! first contact never surfaces a constraint error to callers.

use thiserror::Error;

mod model;
mod sqlite;

pub use model::*;
pub use sqlite::StayStore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("tenant {0} not found")]
    TenantNotFound(i64),
    #[error("guest {0} not found")]
    GuestNotFound(i64),
    #[error("conversation {0} not found")]
    ConversationNotFound(i64),
    #[error("room-code token space exhausted for tenant {0}")]
    TokenSpaceExhausted(i64),
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Chrono(#[from] chrono::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
