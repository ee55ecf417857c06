//! The seven selection algorithms. Each implements `select` and
//! `update_stats`; `update_stats` is where the stateful algorithms
//! (round robin's counter aside) record what `select` will read next time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::backend::BackendInstance;

pub trait LoadBalancer: Send + Sync {
    /// `key` is the consistent-hash routing key (e.g. a session or user id);
    /// algorithms that ignore it accept `None` or anything else.
    fn select(&self, instances: &[Arc<BackendInstance>], key: Option<&str>) -> Option<Arc<BackendInstance>>;

    fn update_stats(&self, instance: &BackendInstance, duration: Duration, success: bool) {
        instance.stats.record(duration, success);
    }
}

fn healthy_only(instances: &[Arc<BackendInstance>]) -> Vec<Arc<BackendInstance>> {
    instances.iter().filter(|i| i.is_healthy()).cloned().collect()
}

#[derive(Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl LoadBalancer for RoundRobin {
    fn select(&self, instances: &[Arc<BackendInstance>], _key: Option<&str>) -> Option<Arc<BackendInstance>> {
        let pool = healthy_only(instances);
        if pool.is_empty() {
            return None;
        }
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % pool.len();
        Some(pool[idx].clone())
    }
}

/// Smooth weighted round robin (the nginx algorithm): each pick adds its
/// static weight to a running `current_weight`, picks the maximum, then
/// subtracts the total weight from the winner.
#[derive(Default)]
pub struct WeightedRoundRobin;

impl LoadBalancer for WeightedRoundRobin {
    fn select(&self, instances: &[Arc<BackendInstance>], _key: Option<&str>) -> Option<Arc<BackendInstance>> {
        let pool = healthy_only(instances);
        if pool.is_empty() {
            return None;
        }
        let total_weight: i64 = pool.iter().map(|i| i.weight as i64).sum();

        let mut winner: Option<&Arc<BackendInstance>> = None;
        let mut winner_weight = i64::MIN;
        for instance in &pool {
            let updated =
                instance.current_weight.fetch_add(instance.weight as i64, Ordering::Relaxed) + instance.weight as i64;
            if updated > winner_weight {
                winner_weight = updated;
                winner = Some(instance);
            }
        }
        let winner = winner?;
        winner
            .current_weight
            .fetch_sub(total_weight, Ordering::Relaxed);
        Some((*winner).clone())
    }
}

#[derive(Default)]
pub struct LeastConnections;

impl LoadBalancer for LeastConnections {
    fn select(&self, instances: &[Arc<BackendInstance>], _key: Option<&str>) -> Option<Arc<BackendInstance>> {
        healthy_only(instances)
            .into_iter()
            .min_by_key(|i| i.stats.active_connections.load(Ordering::Relaxed))
    }
}

#[derive(Default)]
pub struct LeastResponseTime;

impl LoadBalancer for LeastResponseTime {
    fn select(&self, instances: &[Arc<BackendInstance>], _key: Option<&str>) -> Option<Arc<BackendInstance>> {
        healthy_only(instances)
            .into_iter()
            .min_by(|a, b| {
                let a_response = a.stats.average_response();
                let b_response = b.stats.average_response();
                match (a_response, b_response) {
                    (None, None) => std::cmp::Ordering::Equal,
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (Some(a), Some(b)) => a.cmp(&b),
                }
            })
    }
}

#[derive(Default)]
pub struct HealthAware;

impl LoadBalancer for HealthAware {
    fn select(&self, instances: &[Arc<BackendInstance>], _key: Option<&str>) -> Option<Arc<BackendInstance>> {
        let pool = healthy_only(instances);
        if pool.is_empty() {
            return None;
        }
        let weighted_scores: Vec<f64> = pool
            .iter()
            .map(|i| i.weight as f64 * i.health_score(load_score(i)))
            .collect();
        let total: f64 = weighted_scores.iter().sum();
        if total <= 0.0 {
            return pool.first().map(|i| (*i).clone());
        }
        let mut target = rand::thread_rng().gen_range(0.0..total);
        for (instance, score) in pool.iter().zip(weighted_scores.iter()) {
            if target < *score {
                return Some((*instance).clone());
            }
            target -= score;
        }
        pool.last().map(|i| (*i).clone())
    }
}

/// Hash ring with 150 virtual nodes per instance. Rebuilt on every call;
/// the instance list changes rarely (health flips don't remove entries from
/// the ring, only from selection) so this stays cheap relative to a network
/// round trip.
#[derive(Default)]
pub struct ConsistentHash;

impl ConsistentHash {
    const VIRTUAL_NODES_PER_INSTANCE: u32 = 150;

    fn hash(input: &str) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        input.hash(&mut hasher);
        hasher.finish()
    }
}

impl LoadBalancer for ConsistentHash {
    fn select(&self, instances: &[Arc<BackendInstance>], key: Option<&str>) -> Option<Arc<BackendInstance>> {
        let pool = healthy_only(instances);
        if pool.is_empty() {
            return None;
        }
        let key = key.unwrap_or("");

        let mut ring: BTreeMap<u64, usize> = BTreeMap::new();
        for (idx, instance) in pool.iter().enumerate() {
            for vnode in 0..Self::VIRTUAL_NODES_PER_INSTANCE {
                let point = Self::hash(&format!("{}#{vnode}", instance.host));
                ring.insert(point, idx);
            }
        }

        let hashed_key = Self::hash(key);
        let idx = ring
            .range(hashed_key..)
            .next()
            .or_else(|| ring.iter().next())
            .map(|(_, idx)| *idx)?;
        Some(pool[idx].clone())
    }
}

/// `health_score` adjusted by connection load (the `load_score` term) with
/// no additional recency weighting beyond what `BackendStats`'s EMA already
/// gives the response-time component.
#[derive(Default)]
pub struct Adaptive;

impl LoadBalancer for Adaptive {
    fn select(&self, instances: &[Arc<BackendInstance>], _key: Option<&str>) -> Option<Arc<BackendInstance>> {
        healthy_only(instances)
            .into_iter()
            .max_by(|a, b| {
                let a_score = a.health_score(load_score(a));
                let b_score = b.health_score(load_score(b));
                a_score.partial_cmp(&b_score).unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

/// `load_score`: inverse of active connections, so a busier instance scores
/// lower in both `health_aware` and `adaptive`.
fn load_score(instance: &BackendInstance) -> f64 {
    let active = instance.stats.active_connections.load(Ordering::Relaxed) as f64;
    1.0 / (1.0 + active)
}

pub fn by_name(name: &str) -> Option<Box<dyn LoadBalancer>> {
    Some(match name {
        "round_robin" => Box::new(RoundRobin::default()),
        "weighted_round_robin" => Box::new(WeightedRoundRobin),
        "least_connections" => Box::new(LeastConnections),
        "least_response_time" => Box::new(LeastResponseTime),
        "health_aware" => Box::new(HealthAware),
        "consistent_hash" => Box::new(ConsistentHash),
        "adaptive" => Box::new(Adaptive),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instances() -> Vec<Arc<BackendInstance>> {
        vec![
            Arc::new(BackendInstance::new("letters", "http://a", 1, "/health")),
            Arc::new(BackendInstance::new("letters", "http://b", 1, "/health")),
        ]
    }

    #[test]
    fn round_robin_cycles_through_all_healthy_instances() {
        let lb = RoundRobin::default();
        let pool = instances();
        let first = lb.select(&pool, None).unwrap();
        let second = lb.select(&pool, None).unwrap();
        assert_ne!(first.host, second.host);
        let third = lb.select(&pool, None).unwrap();
        assert_eq!(first.host, third.host);
    }

    #[test]
    fn round_robin_skips_unhealthy_instances() {
        let lb = RoundRobin::default();
        let pool = instances();
        pool[0].observe_probe(false, 1);
        for _ in 0..5 {
            assert_eq!(lb.select(&pool, None).unwrap().host, "http://b");
        }
    }

    #[test]
    fn weighted_round_robin_favors_higher_weight() {
        let pool = vec![
            Arc::new(BackendInstance::new("letters", "http://heavy", 3, "/health")),
            Arc::new(BackendInstance::new("letters", "http://light", 1, "/health")),
        ];
        let lb = WeightedRoundRobin;
        let mut heavy_picks = 0;
        for _ in 0..8 {
            if lb.select(&pool, None).unwrap().host == "http://heavy" {
                heavy_picks += 1;
            }
        }
        assert_eq!(heavy_picks, 6);
    }

    #[test]
    fn least_connections_picks_the_idlest_instance() {
        let pool = instances();
        pool[0].stats.active_connections.fetch_add(5, Ordering::Relaxed);
        let lb = LeastConnections;
        assert_eq!(lb.select(&pool, None).unwrap().host, "http://b");
    }

    #[test]
    fn least_response_time_prefers_instances_with_no_samples_yet() {
        let pool = instances();
        pool[0].stats.record(Duration::from_millis(50), true);
        let lb = LeastResponseTime;
        assert_eq!(lb.select(&pool, None).unwrap().host, "http://b");
    }

    #[test]
    fn consistent_hash_is_stable_for_the_same_key() {
        let pool = instances();
        let lb = ConsistentHash;
        let first = lb.select(&pool, Some("user-42")).unwrap();
        let second = lb.select(&pool, Some("user-42")).unwrap();
        assert_eq!(first.host, second.host);
    }

    #[test]
    fn no_algorithm_selects_from_an_all_unhealthy_pool() {
        let pool = instances();
        for instance in &pool {
            instance.observe_probe(false, 1);
        }
        for name in ["round_robin", "weighted_round_robin", "least_connections", "least_response_time", "health_aware", "consistent_hash", "adaptive"] {
            let lb = by_name(name).unwrap();
            assert!(lb.select(&pool, Some("k")).is_none(), "{name} should return None");
        }
    }
}
