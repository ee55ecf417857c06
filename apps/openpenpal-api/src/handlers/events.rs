//! Inbound signed events: verify the HMAC envelope, reject
//! replays and stale timestamps, then queue the matching event-triggered
//! task for immediate dispatch.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{TimeZone, Utc};
use openpenpal_errors::DomainError;
use openpenpal_scheduler::{verify_and_admit, InboundEvent};
use openpenpal_types::ApiResponse;
use serde::Deserialize;
use tracing::info;

use crate::background::EVENT_QUEUE;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Debug, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub event_type: String,
    /// Unix seconds, per the wire contract.
    pub timestamp: i64,
    pub payload: serde_json::Value,
}

pub async fn receive(
    State(state): State<AppState>,
    Path(event_type): Path<String>,
    headers: HeaderMap,
    Json(envelope): Json<EventEnvelope>,
) -> Result<Json<ApiResponse<()>>, DomainError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| DomainError::MissingField("X-Signature".to_string()))?;

    if envelope.event_type != event_type {
        return Err(DomainError::MissingField("event_type mismatch".to_string()));
    }

    let timestamp = Utc
        .timestamp_opt(envelope.timestamp, 0)
        .single()
        .ok_or_else(|| DomainError::MissingField("timestamp".to_string()))?;

    let event = InboundEvent {
        event_id: envelope.event_id,
        event_type: envelope.event_type,
        timestamp,
        payload: envelope.payload,
        signature: signature.to_string(),
    };

    verify_and_admit(
        state.cache.as_ref(),
        state.settings.hmac_secret.as_bytes(),
        &event,
        Utc::now(),
    )
    .await?;

    // The event maps to a registered event-triggered task by type; queue it
    // for the dispatcher's next tick.
    let task = state
        .scheduled_tasks
        .find_by_type(&event.event_type)
        .await?
        .ok_or(DomainError::NotFound)?;
    state
        .cache
        .enqueue_delayed(EVENT_QUEUE, task.id.to_string(), Utc::now().timestamp())
        .await
        .map_err(|e| DomainError::Internal(e.to_string()))?;

    info!(event_id = %event.event_id, event_type = %event.event_type, "signed event admitted");
    Ok(Json(ApiResponse::ok_empty()))
}
