//! Service discovery and per-instance health tracking. Services are
//! statically configured; a periodic checker probes each instance's health
//! path and flips `healthy` after consecutive failures.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{info, warn};

use crate::algorithms::{by_name, LoadBalancer};
use crate::backend::BackendInstance;
use crate::error::GatewayError;

struct ServiceEntry {
    instances: Vec<Arc<BackendInstance>>,
    balancer: Box<dyn LoadBalancer>,
    algorithm: String,
}

/// Serializable view of one instance's health, for the admin surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InstanceHealth {
    pub service_name: String,
    pub host: String,
    pub healthy: bool,
    pub active_connections: u32,
    pub success_rate: f64,
    pub average_response_ms: Option<u64>,
}

/// All registered services keyed by name, each with its configured
/// balancing algorithm. Registration happens once at startup; selection
/// and stat updates happen on every proxied request.
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, ServiceEntry>>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        service_name: &str,
        instances: Vec<Arc<BackendInstance>>,
        algorithm: &str,
    ) -> Result<(), GatewayError> {
        let balancer =
            by_name(algorithm).ok_or_else(|| GatewayError::UnknownAlgorithm(algorithm.to_string()))?;
        info!(service_name, algorithm, instance_count = instances.len(), "service registered");
        self.services.write().expect("registry lock poisoned").insert(
            service_name.to_string(),
            ServiceEntry {
                instances,
                balancer,
                algorithm: algorithm.to_string(),
            },
        );
        Ok(())
    }

    pub fn select(&self, service_name: &str, key: Option<&str>) -> Result<Arc<BackendInstance>, GatewayError> {
        let services = self.services.read().expect("registry lock poisoned");
        let entry = services
            .get(service_name)
            .ok_or_else(|| GatewayError::NoHealthyInstance(service_name.to_string()))?;
        entry
            .balancer
            .select(&entry.instances, key)
            .ok_or_else(|| GatewayError::NoHealthyInstance(service_name.to_string()))
    }

    pub fn update_stats(&self, service_name: &str, instance: &BackendInstance, duration: Duration, success: bool) {
        let services = self.services.read().expect("registry lock poisoned");
        if let Some(entry) = services.get(service_name) {
            entry.balancer.update_stats(instance, duration, success);
        }
    }

    pub fn algorithm_of(&self, service_name: &str) -> Option<String> {
        let services = self.services.read().expect("registry lock poisoned");
        services.get(service_name).map(|e| e.algorithm.clone())
    }

    /// Every instance across every service, for the health-check loop.
    pub fn all_instances(&self) -> Vec<Arc<BackendInstance>> {
        let services = self.services.read().expect("registry lock poisoned");
        services
            .values()
            .flat_map(|entry| entry.instances.iter().cloned())
            .collect()
    }

    pub fn health_snapshot(&self) -> Vec<InstanceHealth> {
        use std::sync::atomic::Ordering;
        self.all_instances()
            .into_iter()
            .map(|i| InstanceHealth {
                service_name: i.service_name.clone(),
                host: i.host.clone(),
                healthy: i.is_healthy(),
                active_connections: i.stats.active_connections.load(Ordering::Relaxed),
                success_rate: i.stats.success_rate(),
                average_response_ms: i.stats.average_response().map(|d| d.as_millis() as u64),
            })
            .collect()
    }
}

/// Probes every registered instance's health path on a fixed interval.
/// Consecutive failures flip `healthy`; `observe_probe` returns the
/// transition, so each health change is logged exactly once.
pub struct HealthChecker {
    registry: Arc<ServiceRegistry>,
    client: reqwest::Client,
    interval: Duration,
    failure_threshold: u32,
}

impl HealthChecker {
    pub fn new(registry: Arc<ServiceRegistry>, interval: Duration, failure_threshold: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            registry,
            client,
            interval,
            failure_threshold,
        }
    }

    pub async fn run(self) {
        let mut tick = tokio::time::interval(self.interval);
        loop {
            tick.tick().await;
            self.probe_round().await;
        }
    }

    pub async fn probe_round(&self) {
        for instance in self.registry.all_instances() {
            let url = format!("{}{}", instance.host, instance.health_check_path);
            let ok = match self.client.get(&url).send().await {
                Ok(response) => response.status().is_success(),
                Err(_) => false,
            };
            match instance.observe_probe(ok, self.failure_threshold) {
                Some(true) => info!(service = %instance.service_name, host = %instance.host, "instance recovered"),
                Some(false) => warn!(service = %instance.service_name, host = %instance.host, "instance marked unhealthy"),
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(hosts: &[&str]) -> ServiceRegistry {
        let registry = ServiceRegistry::new();
        let instances = hosts
            .iter()
            .map(|host| Arc::new(BackendInstance::new("letters", *host, 1, "/health")))
            .collect();
        registry.register("letters", instances, "round_robin").unwrap();
        registry
    }

    #[test]
    fn unknown_algorithm_is_rejected_at_registration() {
        let registry = ServiceRegistry::new();
        let result = registry.register("letters", vec![], "fastest_first");
        assert!(matches!(result, Err(GatewayError::UnknownAlgorithm(_))));
    }

    #[test]
    fn unknown_service_yields_no_healthy_instance() {
        let registry = ServiceRegistry::new();
        assert!(matches!(
            registry.select("ghost", None),
            Err(GatewayError::NoHealthyInstance(_))
        ));
    }

    #[test]
    fn single_healthy_instance_is_returned_for_every_algorithm() {
        for algorithm in [
            "round_robin",
            "weighted_round_robin",
            "least_connections",
            "least_response_time",
            "health_aware",
            "consistent_hash",
            "adaptive",
        ] {
            let registry = ServiceRegistry::new();
            let only = Arc::new(BackendInstance::new("letters", "http://only", 1, "/health"));
            registry.register("letters", vec![only], algorithm).unwrap();
            let selected = registry.select("letters", Some("k")).unwrap();
            assert_eq!(selected.host, "http://only", "{algorithm}");
        }
    }

    #[test]
    fn snapshot_reflects_health_flips() {
        let registry = registry_with(&["http://a", "http://b"]);
        let instances = registry.all_instances();
        instances[0].observe_probe(false, 1);

        let snapshot = registry.health_snapshot();
        let unhealthy: Vec<_> = snapshot.iter().filter(|h| !h.healthy).collect();
        assert_eq!(unhealthy.len(), 1);
    }
}
