//! In-process `CacheStore`. Correct for a single instance and for tests;
//! multi-instance deployments need the `redis-backend` feature instead.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;

use crate::error::CacheError;
use crate::store::CacheStore;

struct LockEntry {
    token: String,
    expires_at: Instant,
}

struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryCacheStore {
    locks: Mutex<HashMap<String, LockEntry>>,
    queues: Mutex<HashMap<String, BTreeMap<i64, Vec<String>>>>,
    seen: Mutex<HashMap<String, Instant>>,
    counters: Mutex<HashMap<String, CounterEntry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn random_token() -> String {
        let mut rng = rand::thread_rng();
        let bytes: [u8; 16] = rng.gen();
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<Option<String>, CacheError> {
        let mut locks = self.locks.lock().unwrap();
        let now = Instant::now();
        if let Some(existing) = locks.get(key) {
            if existing.expires_at > now {
                return Ok(None);
            }
        }
        let token = Self::random_token();
        locks.insert(
            key.to_string(),
            LockEntry { token: token.clone(), expires_at: now + ttl },
        );
        Ok(Some(token))
    }

    async fn release_lock(&self, key: &str, token: &str) -> Result<bool, CacheError> {
        let mut locks = self.locks.lock().unwrap();
        match locks.get(key) {
            Some(entry) if entry.token == token => {
                locks.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn enqueue_delayed(&self, queue: &str, member: String, execute_at_unix: i64) -> Result<(), CacheError> {
        let mut queues = self.queues.lock().unwrap();
        queues.entry(queue.to_string()).or_default().entry(execute_at_unix).or_default().push(member);
        Ok(())
    }

    async fn pop_due(&self, queue: &str, now_unix: i64, limit: usize) -> Result<Vec<String>, CacheError> {
        let mut queues = self.queues.lock().unwrap();
        let Some(ordered) = queues.get_mut(queue) else {
            return Ok(vec![]);
        };

        let mut due = Vec::with_capacity(limit);
        let due_keys: Vec<i64> = ordered.range(..=now_unix).map(|(k, _)| *k).collect();

        'outer: for key in due_keys {
            if let Some(members) = ordered.get_mut(&key) {
                while !members.is_empty() && due.len() < limit {
                    due.push(members.remove(0));
                }
                if members.is_empty() {
                    ordered.remove(&key);
                }
            }
            if due.len() >= limit {
                break 'outer;
            }
        }

        Ok(due)
    }

    async fn mark_seen(&self, set: &str, id: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut seen = self.seen.lock().unwrap();
        let key = format!("{set}:{id}");
        let now = Instant::now();
        if let Some(expires_at) = seen.get(&key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        seen.insert(key, now + ttl);
        Ok(true)
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, CacheError> {
        let mut counters = self.counters.lock().unwrap();
        let now = Instant::now();
        let entry = counters.entry(key.to_string()).or_insert(CounterEntry { count: 0, expires_at: now + ttl });
        if entry.expires_at <= now {
            entry.count = 0;
            entry.expires_at = now + ttl;
        }
        entry.count += 1;
        Ok(entry.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let store = InMemoryCacheStore::new();
        let token = store.acquire_lock("scheduler:t1", Duration::from_secs(5)).await.unwrap().unwrap();
        assert!(store.acquire_lock("scheduler:t1", Duration::from_secs(5)).await.unwrap().is_none());
        assert!(store.release_lock("scheduler:t1", &token).await.unwrap());
        assert!(store.acquire_lock("scheduler:t1", Duration::from_secs(5)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn release_with_wrong_token_fails() {
        let store = InMemoryCacheStore::new();
        store.acquire_lock("scheduler:t2", Duration::from_secs(5)).await.unwrap();
        assert!(!store.release_lock("scheduler:t2", "not-the-token").await.unwrap());
    }

    #[tokio::test]
    async fn delayed_queue_pops_only_due_items_in_score_order() {
        let store = InMemoryCacheStore::new();
        store.enqueue_delayed("retries", "a".to_string(), 100).await.unwrap();
        store.enqueue_delayed("retries", "b".to_string(), 200).await.unwrap();
        store.enqueue_delayed("retries", "c".to_string(), 50).await.unwrap();

        let due = store.pop_due("retries", 150, 10).await.unwrap();
        assert_eq!(due, vec!["c".to_string(), "a".to_string()]);

        let remaining = store.pop_due("retries", 1000, 10).await.unwrap();
        assert_eq!(remaining, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn mark_seen_rejects_replay_within_ttl() {
        let store = InMemoryCacheStore::new();
        assert!(store.mark_seen("events", "evt-1", Duration::from_secs(60)).await.unwrap());
        assert!(!store.mark_seen("events", "evt-1", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn incr_with_expiry_counts_within_window() {
        let store = InMemoryCacheStore::new();
        assert_eq!(store.incr_with_expiry("rl:client1", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(store.incr_with_expiry("rl:client1", Duration::from_secs(60)).await.unwrap(), 2);
    }
}
