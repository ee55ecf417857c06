//! `scheduler:<task_id>` lock acquisition with
//! `TTL = timeout_seconds + grace`, held across the handler's run and
//! released by a token-checked delete.

use std::time::Duration;

use openpenpal_cache::CacheStore;

use crate::error::SchedulerError;

const LOCK_GRACE: Duration = Duration::from_secs(5);

pub struct TaskLock<'a> {
    cache: &'a dyn CacheStore,
    key: String,
    token: String,
}

impl<'a> TaskLock<'a> {
    pub async fn acquire(cache: &'a dyn CacheStore, task_id: &str, timeout: Duration) -> Result<Option<Self>, SchedulerError> {
        let key = format!("scheduler:{task_id}");
        let ttl = timeout + LOCK_GRACE;
        match cache.acquire_lock(&key, ttl).await? {
            Some(token) => Ok(Some(Self { cache, key, token })),
            None => Ok(None),
        }
    }

    pub async fn release(self) -> Result<bool, SchedulerError> {
        Ok(self.cache.release_lock(&self.key, &self.token).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpenpal_cache::InMemoryCacheStore;

    #[tokio::test]
    async fn second_acquisition_is_skipped_while_held() {
        let cache = InMemoryCacheStore::new();
        let first = TaskLock::acquire(&cache, "t1", Duration::from_secs(30)).await.unwrap();
        assert!(first.is_some());
        let second = TaskLock::acquire(&cache, "t1", Duration::from_secs(30)).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn release_allows_reacquisition() {
        let cache = InMemoryCacheStore::new();
        let lock = TaskLock::acquire(&cache, "t2", Duration::from_secs(30)).await.unwrap().unwrap();
        assert!(lock.release().await.unwrap());
        assert!(TaskLock::acquire(&cache, "t2", Duration::from_secs(30)).await.unwrap().is_some());
    }
}
