//! Process-wide OAuth bearer token cache.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Tokens are treated as expired this long before their real expiry so an
/// in-flight request never rides a token that dies mid-call.
const EXPIRY_BUFFER: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Bearer tokens keyed by tenant, shared by every sync pass in the process.
#[derive(Debug, Default)]
pub struct BearerTokenCache {
    entries: Mutex<HashMap<i64, CachedToken>>,
}

impl BearerTokenCache {
    /// The process-wide cache instance.
    pub fn global() -> &'static Self {
        static CACHE: OnceLock<BearerTokenCache> = OnceLock::new();
        CACHE.get_or_init(Self::default)
    }

    /// Returns the cached token for a tenant unless it is (nearly) expired.
    pub fn get(&self, tenant_id: i64) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        let cached = entries.get(&tenant_id)?;
        if cached.expires_at.saturating_duration_since(Instant::now()) > EXPIRY_BUFFER {
            Some(cached.token.clone())
        } else {
            None
        }
    }

    pub fn put(&self, tenant_id: i64, token: String, ttl: Duration) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                tenant_id,
                CachedToken {
                    token,
                    expires_at: Instant::now() + ttl,
                },
            );
        }
    }

    /// Drops a tenant's token, forcing the next call to re-authenticate.
    pub fn invalidate(&self, tenant_id: i64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&tenant_id);
        }
    }
}
