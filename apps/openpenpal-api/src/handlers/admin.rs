//! Admin view into the task runtime: status, global pause/resume, and
//! per-job execution logs.

use std::sync::atomic::Ordering;

use axum::extract::{Path, State};
use axum::Json;
use openpenpal_errors::DomainError;
use openpenpal_gateway::InstanceHealth;
use openpenpal_scheduler::{ScheduledTaskRepository, Worker};
use openpenpal_types::{ApiResponse, ScheduledTask, ScheduledTaskId, TaskExecution};
use serde::Serialize;
use tracing::info;

use crate::auth::AuthUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SchedulerStatus {
    pub paused: bool,
    pub tasks: Vec<ScheduledTask>,
    pub workers: Vec<Worker>,
    pub gateway: Vec<InstanceHealth>,
}

pub async fn status(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<SchedulerStatus>>, DomainError> {
    user.require_admin()?;
    let tasks = state.scheduled_tasks.list_all().await?;
    let workers = state.workers.lock().expect("worker registry lock poisoned").clone();
    Ok(Json(ApiResponse::ok(SchedulerStatus {
        paused: state.scheduler_paused.load(Ordering::Acquire),
        tasks,
        workers,
        gateway: state.gateway.health_snapshot(),
    })))
}

pub async fn pause(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<()>>, DomainError> {
    user.require_admin()?;
    state.scheduler_paused.store(true, Ordering::Release);
    info!("scheduler paused by admin");
    Ok(Json(ApiResponse::ok_empty()))
}

pub async fn resume(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<()>>, DomainError> {
    user.require_admin()?;
    state.scheduler_paused.store(false, Ordering::Release);
    info!("scheduler resumed by admin");
    Ok(Json(ApiResponse::ok_empty()))
}

/// Cancels a scheduled task. Due entries already sitting in a delayed
/// queue are dropped lazily: the dispatcher refuses to run a non-active
/// task when it pops one.
pub async fn cancel_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<ScheduledTaskId>,
) -> Result<Json<ApiResponse<ScheduledTask>>, DomainError> {
    user.require_admin()?;
    let mut task = state.scheduled_tasks.get(task_id).await?;
    task.status = openpenpal_types::ScheduledTaskStatus::Canceled;
    task.active = false;
    state.scheduled_tasks.save(&task).await?;
    info!(task_type = %task.task_type, "scheduled task canceled by admin");
    Ok(Json(ApiResponse::ok(task)))
}

pub async fn job_logs(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<ScheduledTaskId>,
) -> Result<Json<ApiResponse<Vec<TaskExecution>>>, DomainError> {
    user.require_admin()?;
    // 404 for an unknown job rather than an empty log list.
    state.scheduled_tasks.get(task_id).await?;
    let executions = state.executions.list_for_task(task_id, 100).await?;
    Ok(Json(ApiResponse::ok(executions)))
}
