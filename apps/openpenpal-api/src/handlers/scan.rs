//! The scan endpoint: a courier reports a physical handoff and the state
//! machine advances letter, task, and barcode together.

use axum::extract::{Path, State};
use axum::Json;
use openpenpal_errors::DomainError;
use openpenpal_hierarchy::CourierRepository;
use openpenpal_letters::{ScanOutcome, ScanRequest};
use openpenpal_types::{ApiResponse, OpCode, ScanAction, ScanRecord, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ScanBody {
    pub task_id: TaskId,
    pub action: ScanAction,
    pub operator_op_code: String,
    pub recipient_op_code: String,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub letter_status: openpenpal_types::LetterStatus,
    pub task_status: TaskStatus,
    pub record: ScanRecord,
}

pub async fn submit_scan(
    State(state): State<AppState>,
    user: AuthUser,
    Path(barcode_code): Path<String>,
    Json(body): Json<ScanBody>,
) -> Result<Json<ApiResponse<ScanResponse>>, DomainError> {
    user.require_courier()?;
    let scanner = state
        .couriers
        .get_by_user(user.user_id)
        .await
        .map_err(|_| DomainError::UnauthorizedHierarchy)?;

    let operator_op_code =
        OpCode::parse(&body.operator_op_code).map_err(|e| DomainError::BadOpCode(e.to_string()))?;
    let recipient_op_code =
        OpCode::parse(&body.recipient_op_code).map_err(|e| DomainError::BadOpCode(e.to_string()))?;

    let scanner_id = scanner.id;
    let outcome: ScanOutcome = state
        .scan_processor()
        .process(ScanRequest {
            barcode_code,
            task_id: body.task_id,
            scanner,
            action: body.action,
            operator_op_code,
            recipient_op_code,
            location: body.location,
            lat: body.lat,
            lng: body.lng,
        })
        .await?;

    // Delivery closes the loop: the courier earns the task's reward points.
    if outcome.task.status == TaskStatus::Delivered {
        if let Ok(mut courier) = state.couriers.get(scanner_id).await {
            courier.points += outcome.task.reward_points;
            state.couriers.save(&courier).await.ok();
            info!(courier_id = %courier.id, points = outcome.task.reward_points, "delivery reward credited");
        }
    }

    Ok(Json(ApiResponse::ok(ScanResponse {
        letter_status: outcome.letter.status,
        task_status: outcome.task.status,
        record: outcome.record,
    })))
}
