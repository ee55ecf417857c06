//! The request pipeline: select an instance, forward, and on 5xx or
//! transport error retry against another instance with exponential backoff.
//! 4xx responses are the upstream's answer, not an instance failure, and are
//! returned immediately.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Method;
use tracing::{debug, warn};

use crate::backend::BackendInstance;
use crate::error::GatewayError;
use crate::registry::ServiceRegistry;

#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ProxyResponse {
    fn is_retryable(&self) -> bool {
        self.status >= 500
    }
}

/// Backoff schedule for upstream retries: `retry_delay · retry_backoff^attempt`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub retry_backoff: f64,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.retry_backoff.powi(attempt as i32);
        Duration::from_secs_f64(self.retry_delay.as_secs_f64() * factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
            retry_backoff: 2.0,
        }
    }
}

pub struct RequestPipeline {
    registry: Arc<ServiceRegistry>,
    policy: RetryPolicy,
    client: reqwest::Client,
}

impl RequestPipeline {
    pub fn new(registry: Arc<ServiceRegistry>, policy: RetryPolicy, upstream_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(upstream_timeout)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { registry, policy, client }
    }

    /// Forwards `req` to an instance of `service_name`, retrying per policy.
    /// `key` feeds the consistent-hash algorithm when configured.
    pub async fn dispatch(
        &self,
        service_name: &str,
        key: Option<&str>,
        req: ProxyRequest,
    ) -> Result<ProxyResponse, GatewayError> {
        self.dispatch_with(service_name, key, req, |instance, req| self.send(instance, req))
            .await
    }

    /// The pipeline with the transport abstracted out, so retry and
    /// health-marking behavior is testable without a live upstream. Each
    /// attempt receives its own clone of the request.
    pub(crate) async fn dispatch_with<F, Fut>(
        &self,
        service_name: &str,
        key: Option<&str>,
        req: ProxyRequest,
        send: F,
    ) -> Result<ProxyResponse, GatewayError>
    where
        F: Fn(Arc<BackendInstance>, ProxyRequest) -> Fut,
        Fut: std::future::Future<Output = Result<ProxyResponse, GatewayError>>,
    {
        let attempts = self.policy.max_retries + 1;
        let mut last_instance: Option<Arc<BackendInstance>> = None;
        let mut last_error = GatewayError::RetriesExhausted;

        for attempt in 0..attempts {
            let instance = self.pick(service_name, key, last_instance.as_deref())?;

            instance.stats.active_connections.fetch_add(1, Ordering::Relaxed);
            let started = std::time::Instant::now();
            let outcome = send(instance.clone(), req.clone()).await;
            let elapsed = started.elapsed();
            instance.stats.active_connections.fetch_sub(1, Ordering::Relaxed);

            match outcome {
                Ok(response) if !response.is_retryable() => {
                    self.registry.update_stats(service_name, &instance, elapsed, true);
                    return Ok(response);
                }
                Ok(response) => {
                    self.registry.update_stats(service_name, &instance, elapsed, false);
                    debug!(service = service_name, host = %instance.host, status = response.status, attempt, "upstream 5xx, retrying");
                    last_error = GatewayError::RetriesExhausted;
                }
                Err(err) => {
                    self.registry.update_stats(service_name, &instance, elapsed, false);
                    debug!(service = service_name, host = %instance.host, %err, attempt, "transport error, retrying");
                    last_error = err;
                }
            }

            last_instance = Some(instance);
            if attempt + 1 < attempts {
                tokio::time::sleep(self.policy.delay_for(attempt)).await;
            }
        }

        if let Some(instance) = last_instance {
            let was_healthy = instance.mark_unhealthy();
            if was_healthy {
                warn!(service = service_name, host = %instance.host, "marked unhealthy after retry exhaustion");
            }
        }
        match last_error {
            GatewayError::UpstreamTimeout => Err(GatewayError::RetriesExhausted),
            GatewayError::Transport(_) => Err(GatewayError::RetriesExhausted),
            other => Err(other),
        }
    }

    /// Selects an instance, preferring one that differs from the instance
    /// the previous attempt failed on when the pool allows it.
    fn pick(
        &self,
        service_name: &str,
        key: Option<&str>,
        avoid: Option<&BackendInstance>,
    ) -> Result<Arc<BackendInstance>, GatewayError> {
        let first = self.registry.select(service_name, key)?;
        match avoid {
            Some(previous) if previous.host == first.host => {
                let second = self.registry.select(service_name, key)?;
                Ok(second)
            }
            _ => Ok(first),
        }
    }

    async fn send(&self, instance: Arc<BackendInstance>, req: ProxyRequest) -> Result<ProxyResponse, GatewayError> {
        let url = format!("{}{}", instance.host, req.path);
        let response = self
            .client
            .request(req.method, &url)
            .headers(req.headers)
            .body(req.body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::UpstreamTimeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?
            .to_vec();
        Ok(ProxyResponse { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn pipeline_with(hosts: &[&str], max_retries: u32) -> (RequestPipeline, Arc<ServiceRegistry>) {
        let registry = Arc::new(ServiceRegistry::new());
        let instances = hosts
            .iter()
            .map(|host| Arc::new(BackendInstance::new("letters", *host, 1, "/health")))
            .collect();
        registry.register("letters", instances, "round_robin").unwrap();
        let policy = RetryPolicy {
            max_retries,
            retry_delay: Duration::from_millis(1),
            retry_backoff: 2.0,
        };
        (
            RequestPipeline::new(registry.clone(), policy, Duration::from_secs(1)),
            registry,
        )
    }

    fn get_request() -> ProxyRequest {
        ProxyRequest {
            method: Method::GET,
            path: "/api/v1/letters".to_string(),
            headers: HeaderMap::new(),
            body: vec![],
        }
    }

    fn response(status: u16) -> ProxyResponse {
        ProxyResponse {
            status,
            headers: HeaderMap::new(),
            body: vec![],
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt_returns_response() {
        let (pipeline, _) = pipeline_with(&["http://a"], 3);
        let result = pipeline
            .dispatch_with("letters", None, get_request(), |_, _| async { Ok(response(200)) })
            .await
            .unwrap();
        assert_eq!(result.status, 200);
    }

    #[tokio::test]
    async fn five_xx_retries_on_another_instance() {
        let (pipeline, _) = pipeline_with(&["http://a", "http://b"], 3);
        let calls = AtomicU32::new(0);
        let result = pipeline
            .dispatch_with("letters", None, get_request(), |instance, _| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let host = instance.host.clone();
                async move {
                    if n == 0 {
                        Ok(response(502))
                    } else {
                        assert_ne!(host, "http://a", "retry must land on a different instance");
                        Ok(response(200))
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn four_xx_is_returned_without_retry() {
        let (pipeline, _) = pipeline_with(&["http://a", "http://b"], 3);
        let calls = AtomicU32::new(0);
        let result = pipeline
            .dispatch_with("letters", None, get_request(), |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(response(404)) }
            })
            .await
            .unwrap();
        assert_eq!(result.status, 404);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_fails_and_marks_last_instance_unhealthy() {
        let (pipeline, registry) = pipeline_with(&["http://a", "http://b"], 2);
        let result = pipeline
            .dispatch_with("letters", None, get_request(), |_, _| async {
                Err(GatewayError::Transport("connection refused".to_string()))
            })
            .await;
        assert_eq!(result.unwrap_err(), GatewayError::RetriesExhausted);
        let unhealthy = registry.health_snapshot().iter().filter(|h| !h.healthy).count();
        assert_eq!(unhealthy, 1);
    }

    #[test]
    fn backoff_delays_grow_geometrically() {
        let policy = RetryPolicy {
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
            retry_backoff: 2.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }
}
