//! API gateway building blocks: a static service registry with
//! periodic health probing, seven selection algorithms behind one trait,
//! a retrying proxy pipeline, CSRF double-submit tokens, and per-client
//! rate limiting.

pub mod algorithms;
pub mod backend;
pub mod csrf;
pub mod error;
pub mod proxy;
pub mod rate_limit;
pub mod registry;

pub use algorithms::{by_name, LoadBalancer};
pub use backend::{BackendInstance, BackendStats};
pub use error::GatewayError;
pub use proxy::{ProxyRequest, ProxyResponse, RequestPipeline, RetryPolicy};
pub use rate_limit::IngressLimiter;
pub use registry::{HealthChecker, InstanceHealth, ServiceRegistry};
