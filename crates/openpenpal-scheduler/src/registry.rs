//! Worker registry: self-registration, heartbeat, and the
//! 3-missed-heartbeat inactivity sweep. In-flight locks are not touched
//! here; they simply expire on their own TTL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MISSED_HEARTBEATS_BEFORE_INACTIVE: i64 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub heartbeat_interval_secs: i64,
    pub active: bool,
}

impl Worker {
    pub fn register(id: String, now: DateTime<Utc>, heartbeat_interval_secs: i64) -> Self {
        Self {
            id,
            registered_at: now,
            last_heartbeat_at: now,
            heartbeat_interval_secs,
            active: true,
        }
    }

    pub fn heartbeat(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat_at = now;
        self.active = true;
    }

    /// True once `now` is past three full heartbeat intervals since the
    /// last one received.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        let elapsed = (now - self.last_heartbeat_at).num_seconds();
        elapsed > self.heartbeat_interval_secs * MISSED_HEARTBEATS_BEFORE_INACTIVE
    }
}

/// Marks every worker whose heartbeat is overdue as inactive. Returns the
/// ids that were flipped, for a single log line per transition.
pub fn sweep_inactive(workers: &mut [Worker], now: DateTime<Utc>) -> Vec<String> {
    let mut flipped = Vec::new();
    for worker in workers.iter_mut() {
        if worker.active && worker.is_overdue(now) {
            worker.active = false;
            flipped.push(worker.id.clone());
        }
    }
    flipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn worker_stays_active_within_heartbeat_budget() {
        let now = Utc::now();
        let worker = Worker::register("w1".to_string(), now, 30);
        assert!(!worker.is_overdue(now + Duration::seconds(60)));
    }

    #[test]
    fn worker_goes_overdue_after_three_missed_heartbeats() {
        let now = Utc::now();
        let worker = Worker::register("w1".to_string(), now, 30);
        assert!(worker.is_overdue(now + Duration::seconds(100)));
    }

    #[test]
    fn sweep_flips_only_overdue_workers() {
        let now = Utc::now();
        let mut workers = vec![
            Worker::register("fresh".to_string(), now, 30),
            {
                let mut w = Worker::register("stale".to_string(), now - Duration::seconds(200), 30);
                w.last_heartbeat_at = now - Duration::seconds(200);
                w
            },
        ];
        let flipped = sweep_inactive(&mut workers, now);
        assert_eq!(flipped, vec!["stale".to_string()]);
        assert!(workers[0].active);
        assert!(!workers[1].active);
    }
}
