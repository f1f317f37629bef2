//! Short-lived pending link confirmations.
//!
//! When a room code resolves to a stay owned by a different guest record,
//! the link is parked here until the sender confirms with "yes". Entries
//! are in-memory only: an unconfirmed link is worthless after a restart
//! anyway.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long a parked link stays confirmable.
const PENDING_LINK_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct PendingLink {
    guest_id: i64,
    room_id: i64,
    created_at: Instant,
}

/// Pending links keyed by `channel:sender` strings.
#[derive(Debug, Default)]
pub struct PendingLinkCache {
    entries: Mutex<HashMap<String, PendingLink>>,
}

impl PendingLinkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a link proposal, replacing any previous one for the sender.
    /// Stale entries from other senders are dropped on the way in so the
    /// map never grows past the set of recently-prompted senders.
    pub fn put(&self, key: &str, guest_id: i64, room_id: i64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, link| link.created_at.elapsed() <= PENDING_LINK_TTL);
            entries.insert(
                key.to_string(),
                PendingLink {
                    guest_id,
                    room_id,
                    created_at: Instant::now(),
                },
            );
        }
    }

    /// Removes and returns the sender's parked (guest, room) pair if it has
    /// not expired. Expired entries are dropped on access.
    pub fn take_fresh(&self, key: &str) -> Option<(i64, i64)> {
        let mut entries = self.entries.lock().ok()?;
        let link = entries.remove(key)?;
        if link.created_at.elapsed() > PENDING_LINK_TTL {
            return None;
        }
        Some((link.guest_id, link.room_id))
    }
}
