//! Inbound signed events for event-triggered tasks. Verification is
//! HMAC-SHA256 over a canonical serialization, constant-time compared, with
//! replay and clock-skew checks layered on top.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use openpenpal_cache::CacheStore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

use crate::error::SchedulerError;

type HmacSha256 = Hmac<Sha256>;

const SEEN_WINDOW: Duration = Duration::from_secs(24 * 3600);
const MAX_SKEW: chrono::Duration = chrono::Duration::minutes(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub event_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub signature: String,
}

impl InboundEvent {
    /// Canonical bytes the signature is computed over: a stable field order
    /// independent of the wire JSON's key ordering.
    fn canonical_bytes(&self) -> Vec<u8> {
        format!(
            "{}|{}|{}|{}",
            self.event_id,
            self.event_type,
            self.timestamp.timestamp(),
            serde_json::to_string(&self.payload).unwrap_or_default()
        )
        .into_bytes()
    }
}

/// Hex-encoded `HMAC_SHA256(secret, canonical_body)`, the value a sender
/// puts in the `X-Signature` header.
pub fn sign(secret: &[u8], event: &InboundEvent) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(&event.canonical_bytes());
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn verify_signature(secret: &[u8], event: &InboundEvent) -> bool {
    let expected = sign(secret, event);
    constant_time_eq(expected.as_bytes(), event.signature.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Runs signature, replay, and skew checks; marks the event seen on success
/// so a retransmission of the same `event_id` is rejected.
pub async fn verify_and_admit(
    cache: &dyn CacheStore,
    secret: &[u8],
    event: &InboundEvent,
    now: DateTime<Utc>,
) -> Result<(), SchedulerError> {
    if !verify_signature(secret, event) {
        return Err(SchedulerError::BadSignature);
    }

    if (now - event.timestamp).num_seconds().abs() > MAX_SKEW.num_seconds() {
        return Err(SchedulerError::StaleEvent);
    }

    let first_seen = cache.mark_seen("scheduler:events:seen", &event.event_id, SEEN_WINDOW).await?;
    if !first_seen {
        return Err(SchedulerError::ReplayedEvent);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpenpal_cache::InMemoryCacheStore;

    fn sample_event(secret: &[u8], timestamp: DateTime<Utc>) -> InboundEvent {
        let mut event = InboundEvent {
            event_id: "evt-1".to_string(),
            event_type: "letter.delivered".to_string(),
            timestamp,
            payload: serde_json::json!({"letter_id": "abc"}),
            signature: String::new(),
        };
        event.signature = sign(secret, &event);
        event
    }

    #[tokio::test]
    async fn valid_event_is_admitted_once() {
        let secret = b"test-secret";
        let cache = InMemoryCacheStore::new();
        let event = sample_event(secret, Utc::now());

        verify_and_admit(&cache, secret, &event, Utc::now()).await.unwrap();
        let result = verify_and_admit(&cache, secret, &event, Utc::now()).await;
        assert_eq!(result.unwrap_err(), SchedulerError::ReplayedEvent);
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let secret = b"test-secret";
        let cache = InMemoryCacheStore::new();
        let mut event = sample_event(secret, Utc::now());
        event.payload = serde_json::json!({"letter_id": "tampered"});

        let result = verify_and_admit(&cache, secret, &event, Utc::now()).await;
        assert_eq!(result.unwrap_err(), SchedulerError::BadSignature);
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected() {
        let secret = b"test-secret";
        let cache = InMemoryCacheStore::new();
        let event = sample_event(secret, Utc::now() - chrono::Duration::minutes(10));

        let result = verify_and_admit(&cache, secret, &event, Utc::now()).await;
        assert_eq!(result.unwrap_err(), SchedulerError::StaleEvent);
    }
}
