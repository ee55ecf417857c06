//! A single upstream instance and the stats the load-balancing algorithms
//! read and update on every request.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Rolling stats kept per instance. All fields are atomics so a selection
/// algorithm and a concurrent proxy call can both touch them lock-free.
#[derive(Debug)]
pub struct BackendStats {
    pub active_connections: AtomicU32,
    /// Exponential moving average of response time, in milliseconds, ×100
    /// for integer storage. `None` (represented as `u64::MAX`) means no
    /// sample has landed yet.
    average_response_ms_x100: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
}

const NO_SAMPLE: u64 = u64::MAX;
const EMA_ALPHA_X100: u64 = 20; // 0.2 smoothing factor, fixed-point

impl Default for BackendStats {
    fn default() -> Self {
        Self {
            active_connections: AtomicU32::new(0),
            average_response_ms_x100: AtomicU64::new(NO_SAMPLE),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
        }
    }
}

impl BackendStats {
    pub fn average_response(&self) -> Option<Duration> {
        let raw = self.average_response_ms_x100.load(Ordering::Relaxed);
        if raw == NO_SAMPLE {
            None
        } else {
            Some(Duration::from_micros(raw * 10))
        }
    }

    pub fn record(&self, duration: Duration, success: bool) {
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }

        let sample_x100 = (duration.as_micros() as u64 / 10).max(1);
        loop {
            let prev = self.average_response_ms_x100.load(Ordering::Relaxed);
            let next = if prev == NO_SAMPLE {
                sample_x100
            } else {
                (sample_x100 * EMA_ALPHA_X100 + prev * (100 - EMA_ALPHA_X100)) / 100
            };
            if self
                .average_response_ms_x100
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    pub fn success_rate(&self) -> f64 {
        let success = self.success_count.load(Ordering::Relaxed) as f64;
        let failure = self.failure_count.load(Ordering::Relaxed) as f64;
        let total = success + failure;
        if total == 0.0 {
            1.0
        } else {
            success / total
        }
    }

    pub fn error_rate(&self) -> f64 {
        1.0 - self.success_rate()
    }
}

/// A configured upstream for a named service. `weight` drives the
/// weighted algorithms; `current_weight` is the smooth-WRR algorithm's
/// mutable running state.
#[derive(Debug)]
pub struct BackendInstance {
    pub service_name: String,
    pub host: String,
    pub weight: u32,
    pub health_check_path: String,
    healthy: AtomicBool,
    consecutive_failures: AtomicU32,
    pub current_weight: AtomicI64,
    pub stats: BackendStats,
}

impl BackendInstance {
    pub fn new(service_name: impl Into<String>, host: impl Into<String>, weight: u32, health_check_path: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            host: host.into(),
            weight: weight.max(1),
            health_check_path: health_check_path.into(),
            healthy: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            current_weight: AtomicI64::new(0),
            stats: BackendStats::default(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Applies one health probe result, returning `Some(new_state)` only on
    /// a transition so the caller logs exactly once per flip.
    pub fn observe_probe(&self, ok: bool, threshold: u32) -> Option<bool> {
        if ok {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            if !self.healthy.swap(true, Ordering::AcqRel) {
                return Some(true);
            }
        } else {
            let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
            if failures >= threshold && self.healthy.swap(false, Ordering::AcqRel) {
                return Some(false);
            }
        }
        None
    }

    /// Forces the instance unhealthy, used when a retry budget is exhausted
    /// on this instance without waiting for the next health-check tick.
    pub fn mark_unhealthy(&self) -> bool {
        self.healthy.swap(false, Ordering::AcqRel)
    }

    pub fn health_score(&self, now_load_score: f64) -> f64 {
        let success_rate = self.stats.success_rate();
        let response_score = match self.stats.average_response() {
            None => 1.0,
            Some(avg) => {
                let ms = avg.as_secs_f64() * 1000.0;
                (1.0 / (1.0 + ms / 100.0)).clamp(0.0, 1.0)
            }
        };
        let error_penalty = 1.0 - self.stats.error_rate();
        let raw = 0.4 * success_rate + 0.3 * response_score + 0.2 * now_load_score + 0.1 * error_penalty;
        raw.clamp(0.01, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_instance_has_no_average_response() {
        let instance = BackendInstance::new("letters", "http://a", 1, "/health");
        assert_eq!(instance.stats.average_response(), None);
    }

    #[test]
    fn three_consecutive_failures_flip_unhealthy_once() {
        let instance = BackendInstance::new("letters", "http://a", 1, "/health");
        assert_eq!(instance.observe_probe(false, 3), None);
        assert_eq!(instance.observe_probe(false, 3), None);
        assert_eq!(instance.observe_probe(false, 3), Some(false));
        assert!(!instance.is_healthy());
        assert_eq!(instance.observe_probe(false, 3), None, "already unhealthy, no repeat transition");
    }

    #[test]
    fn recovery_probe_flips_back_healthy_once() {
        let instance = BackendInstance::new("letters", "http://a", 1, "/health");
        instance.observe_probe(false, 1);
        assert!(!instance.is_healthy());
        assert_eq!(instance.observe_probe(true, 1), Some(true));
        assert_eq!(instance.observe_probe(true, 1), None);
    }

    #[test]
    fn health_score_is_clamped_to_unit_interval() {
        let instance = BackendInstance::new("letters", "http://a", 1, "/health");
        for _ in 0..10 {
            instance.stats.record(Duration::from_millis(5), true);
        }
        let score = instance.health_score(1.0);
        assert!(score > 0.01 && score <= 1.0);
    }
}
