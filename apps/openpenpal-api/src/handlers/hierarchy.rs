//! Courier hierarchy surface: assignment (direct / auto / cascade), batch
//! assignment, reassignment, history, and the pending-task feed.

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use openpenpal_errors::{BatchOutcome, DomainError};
use openpenpal_hierarchy::{CourierRepository, TaskRepository};
use openpenpal_letters::{LetterRepository, TaskStore};
use openpenpal_types::{
    ApiResponse, AssignmentHistoryRecord, AssignmentType, Courier, CourierId, Task, TaskId,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::state::AppState;

/// Resolves the calling user to an approved courier at level >= 2, the
/// floor for every assignment operation.
async fn require_assigner(state: &AppState, user: &AuthUser) -> Result<Courier, DomainError> {
    user.require_courier()?;
    let courier = state
        .couriers
        .get_by_user(user.user_id)
        .await
        .map_err(|_| DomainError::UnauthorizedHierarchy)?;
    if courier.level.value() < 2 {
        return Err(DomainError::UnauthorizedHierarchy);
    }
    Ok(courier)
}

/// An unreleased letter is not routable, so its task cannot be
/// assigned yet.
async fn ensure_routable(state: &AppState, task_id: TaskId) -> Result<(), DomainError> {
    let task = state.delivery_tasks.get(task_id).await?;
    let letter = state.letters.get(task.letter_id).await?;
    if letter.is_future(Utc::now()) {
        return Err(DomainError::IllegalTransition);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct AssignTaskRequest {
    pub task_id: TaskId,
    pub assignment_type: AssignmentType,
    pub target_courier_id: Option<CourierId>,
}

pub async fn assign_task(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<AssignTaskRequest>,
) -> Result<Json<ApiResponse<Task>>, DomainError> {
    let assigner = require_assigner(&state, &user).await?;
    ensure_routable(&state, req.task_id).await?;
    let engine = state.assignment_engine();

    let task = match req.assignment_type {
        AssignmentType::Direct => {
            let target_id = req
                .target_courier_id
                .ok_or_else(|| DomainError::MissingField("target_courier_id".to_string()))?;
            let target = state.couriers.get(target_id).await?;
            if !engine.authorizes(&assigner, &target) {
                return Err(DomainError::UnauthorizedHierarchy);
            }
            engine.assign_direct(req.task_id, target_id, user.user_id).await?
        }
        AssignmentType::AutoHierarchy => engine.assign_auto_hierarchy(req.task_id, user.user_id).await?,
        AssignmentType::Cascade => engine.assign_cascade(req.task_id, user.user_id).await?,
        AssignmentType::Reassignment => {
            return Err(DomainError::MissingField(
                "use the reassign-task endpoint".to_string(),
            ))
        }
    };

    Ok(Json(ApiResponse::ok(task)))
}

#[derive(Debug, Deserialize)]
pub struct BatchAssignRequest {
    pub task_ids: Vec<TaskId>,
}

/// Per-task outcomes; partial success is never rolled back.
pub async fn batch_assign(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<BatchAssignRequest>,
) -> Result<Json<ApiResponse<Vec<BatchOutcome<Task>>>>, DomainError> {
    require_assigner(&state, &user).await?;

    let mut routable = Vec::with_capacity(req.task_ids.len());
    let mut outcomes = Vec::with_capacity(req.task_ids.len());
    for task_id in req.task_ids {
        match ensure_routable(&state, task_id).await {
            Ok(()) => routable.push(task_id),
            Err(err) => outcomes.push(BatchOutcome::failure(task_id.to_string(), &err)),
        }
    }

    let engine = state.assignment_engine();
    outcomes.extend(engine.assign_batch(routable, user.user_id).await);
    Ok(Json(ApiResponse::ok(outcomes)))
}

#[derive(Debug, Deserialize)]
pub struct ReassignRequest {
    pub task_id: TaskId,
    pub new_courier_id: CourierId,
    pub reason: String,
}

pub async fn reassign_task(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ReassignRequest>,
) -> Result<Json<ApiResponse<Task>>, DomainError> {
    let assigner = require_assigner(&state, &user).await?;
    let engine = state.assignment_engine();

    // Authority over both ends of the move.
    let task = state.courier_tasks.get(req.task_id).await.map_err(DomainError::from)?;
    if let Some(current_id) = task.assigned_courier_id {
        let current = state.couriers.get(current_id).await?;
        if !engine.authorizes(&assigner, &current) {
            return Err(DomainError::UnauthorizedHierarchy);
        }
    }
    let replacement = state.couriers.get(req.new_courier_id).await?;
    if !engine.authorizes(&assigner, &replacement) {
        return Err(DomainError::UnauthorizedHierarchy);
    }

    let task = engine
        .reassign(req.task_id, req.new_courier_id, user.user_id, req.reason)
        .await?;
    Ok(Json(ApiResponse::ok(task)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub courier_id: Option<CourierId>,
}

fn default_page_size() -> u32 {
    20
}

pub async fn assignment_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<AssignmentHistoryRecord>>>, DomainError> {
    user.require_courier()?;

    // Non-admins only see their own attributions.
    let filter = if user.is_admin() {
        query.courier_id
    } else {
        let own = state
            .couriers
            .get_by_user(user.user_id)
            .await
            .map_err(|_| DomainError::UnauthorizedHierarchy)?;
        Some(own.id)
    };

    let page_size = query.page_size.clamp(1, 100) as i64;
    let offset = query.page as i64 * page_size;
    let page = state
        .courier_tasks
        .assignment_history_page(filter, page_size, offset)
        .await?;
    Ok(Json(ApiResponse::ok(page)))
}

#[derive(Debug, Deserialize)]
pub struct CreateSubordinateRequest {
    pub user_id: openpenpal_types::UserId,
    pub zone_code: String,
    pub managed_op_code_prefix: String,
    pub bio: Option<String>,
}

pub async fn create_subordinate(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateSubordinateRequest>,
) -> Result<Json<ApiResponse<Courier>>, DomainError> {
    let creator = require_assigner(&state, &user).await?;
    let created = state
        .roster()
        .create_subordinate(
            &creator,
            openpenpal_hierarchy::SubordinateApplication {
                user_id: req.user_id,
                zone_code: req.zone_code,
                managed_op_code_prefix: req.managed_op_code_prefix,
                bio: req.bio,
            },
        )
        .await?;
    Ok(Json(ApiResponse::ok(created)))
}

#[derive(Debug, Deserialize)]
pub struct ApproveSubordinateRequest {
    pub courier_id: CourierId,
}

pub async fn approve_subordinate(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ApproveSubordinateRequest>,
) -> Result<Json<ApiResponse<Courier>>, DomainError> {
    let actor = require_assigner(&state, &user).await?;
    let approved = state.roster().approve(&actor, req.courier_id).await?;
    Ok(Json(ApiResponse::ok(approved)))
}

#[derive(Debug, Deserialize)]
pub struct TransferSubordinateRequest {
    pub courier_id: CourierId,
    pub new_parent_id: CourierId,
}

pub async fn transfer_subordinate(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<TransferSubordinateRequest>,
) -> Result<Json<ApiResponse<Courier>>, DomainError> {
    let actor = require_assigner(&state, &user).await?;
    let moved = state
        .roster()
        .transfer_subordinate(&actor, req.courier_id, req.new_parent_id)
        .await?;
    Ok(Json(ApiResponse::ok(moved)))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    /// 2-char school code; absent means the national board.
    pub school: Option<String>,
}

/// Reads the materialized rankings; `leaderboard_refresh` rebuilds them on
/// its own cadence.
pub async fn leaderboard(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<ApiResponse<openpenpal_hierarchy::Leaderboard>>, DomainError> {
    user.require_courier()?;
    let boards = state.leaderboards.read().expect("leaderboard lock poisoned");
    let wanted = boards
        .iter()
        .find(|board| match (&board.scope, &query.school) {
            (openpenpal_hierarchy::LeaderboardScope::School { code }, Some(school)) => code == school,
            (openpenpal_hierarchy::LeaderboardScope::National, None) => true,
            _ => false,
        })
        .cloned()
        .ok_or(DomainError::NotFound)?;
    Ok(Json(ApiResponse::ok(wanted)))
}

/// Available tasks within the calling courier's managed scope, ready to be
/// accepted or assigned downward.
pub async fn pending_assignments(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<Task>>>, DomainError> {
    user.require_courier()?;
    let courier = state
        .couriers
        .get_by_user(user.user_id)
        .await
        .map_err(|_| DomainError::UnauthorizedHierarchy)?;

    let available = state.courier_tasks.list_available_routable(Utc::now()).await?;
    let in_scope = available
        .into_iter()
        .filter(|task| openpenpal_hierarchy::can_manage_op_code(&courier, &task.delivery_op_code))
        .collect();
    Ok(Json(ApiResponse::ok(in_scope)))
}
