use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::time::Duration;
use tokio::time::Instant;

/// Cached origin response. Never mutated once built; the store shares it
/// behind an `Arc` and `Bytes` keeps the body buffer read-only.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Build an entry that expires `ttl` after `created_at`.
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        created_at: Instant,
        ttl: Duration,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    /// An entry is live strictly before its expiry instant.
    pub fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    pub fn ttl(&self) -> Duration {
        self.expires_at - self.created_at
    }
}
