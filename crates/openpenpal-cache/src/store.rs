//! The cache store port every scheduler primitive is built on: distributed
//! locks, the delayed queue, the
//! replay-protection set for signed events, and gateway rate limiting.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Compare-and-set lock acquisition. Returns a random holder token on
    /// success, `None` if already held.
    async fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<Option<String>, CacheError>;

    /// Token-checked release; never blindly deletes.
    async fn release_lock(&self, key: &str, token: &str) -> Result<bool, CacheError>;

    /// Adds `member` to the delayed queue's ordered set with score
    /// `execute_at_unix`.
    async fn enqueue_delayed(&self, queue: &str, member: String, execute_at_unix: i64) -> Result<(), CacheError>;

    /// Pops up to `limit` members whose score is `<= now_unix`, removing
    /// them atomically so two dispatchers never double-pop the same item.
    async fn pop_due(&self, queue: &str, now_unix: i64, limit: usize) -> Result<Vec<String>, CacheError>;

    /// Marks `id` as seen in `set` for `ttl`. Returns `true` if this call
    /// was the first to mark it (i.e. not a replay).
    async fn mark_seen(&self, set: &str, id: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Increments a counter keyed by `key`, setting `ttl` only on first
    /// creation. Used for the gateway's per-client rate limit window.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, CacheError>;
}
