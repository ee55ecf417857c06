//! Environment-driven configuration for the OpenPenPal operational core.
//!
//! Every setting has a typed default so a developer can run the service with
//! nothing but `DATABASE_URL` set; production deployments override the rest
//! through the environment. Validation happens once, at startup, rather than
//! deep inside a handler.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(String),
    #[error("environment variable {name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
}

/// A single load-balanced backend instance, as listed in `GATEWAY_BACKENDS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub service_name: String,
    pub host: String,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub hmac_secret: String,
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub scheduler_tick_ms: u64,
    pub event_replay_window_secs: i64,
    pub event_max_skew_secs: i64,
    pub worker_heartbeat_timeout_secs: i64,
    pub gateway_backends: Vec<BackendConfig>,
    pub gateway_algorithm: String,
    pub csrf_token_ttl_secs: i64,
    pub gateway_timeout_secs: u64,
    pub gateway_max_retries: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url = require_var("DATABASE_URL")?;
        let hmac_secret = require_var("HMAC_SECRET")?;

        Ok(Self {
            database_url,
            hmac_secret,
            port: parse_with_default("PORT", 8080)?,
            rate_limit_per_minute: parse_with_default("RATE_LIMIT_PER_MINUTE", 120)?,
            scheduler_tick_ms: parse_with_default("SCHEDULER_TICK_MS", 60_000)?,
            event_replay_window_secs: parse_with_default("EVENT_REPLAY_WINDOW_SECS", 24 * 3600)?,
            event_max_skew_secs: parse_with_default("EVENT_MAX_SKEW_SECS", 300)?,
            worker_heartbeat_timeout_secs: parse_with_default(
                "WORKER_HEARTBEAT_TIMEOUT_SECS",
                90,
            )?,
            gateway_backends: parse_backends(
                &std::env::var("GATEWAY_BACKENDS").unwrap_or_default(),
            )?,
            gateway_algorithm: std::env::var("GATEWAY_ALGORITHM")
                .unwrap_or_else(|_| "round_robin".to_string()),
            csrf_token_ttl_secs: parse_with_default("CSRF_TOKEN_TTL_SECS", 24 * 3600)?,
            gateway_timeout_secs: parse_with_default("GATEWAY_TIMEOUT_SECS", 30)?,
            gateway_max_retries: parse_with_default("GATEWAY_MAX_RETRIES", 3)?,
        })
    }

    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_millis(self.scheduler_tick_ms)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }
}

fn require_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name.to_string()))
}

fn parse_with_default<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => parse_value(name, &raw),
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::Invalid {
        name: name.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Parses `name@host=weight,name@host=weight,...`; an absent weight defaults
/// to 1. An empty string yields an empty backend list (the caller decides
/// whether that's fatal).
fn parse_backends(raw: &str) -> Result<Vec<BackendConfig>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_backend_entry)
        .collect()
}

fn parse_backend_entry(entry: &str) -> Result<BackendConfig, ConfigError> {
    let (name_and_host, weight_raw) = match entry.split_once('=') {
        Some((left, right)) => (left, Some(right)),
        None => (entry, None),
    };
    let (service_name, host) = name_and_host.split_once('@').ok_or_else(|| ConfigError::Invalid {
        name: "GATEWAY_BACKENDS".to_string(),
        value: entry.to_string(),
        reason: "expected name@host[=weight]".to_string(),
    })?;
    let weight = match weight_raw {
        Some(w) => parse_value("GATEWAY_BACKENDS", w)?,
        None => 1,
    };
    Ok(BackendConfig {
        service_name: service_name.to_string(),
        host: host.to_string(),
        weight,
    })
}
