//! Route table for the `/api/v1` surface, plus `/health` and the
//! reverse-proxy mount for configured upstream services.

use axum::middleware::from_fn_with_state;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use openpenpal_types::ApiResponse;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, auth, events, hierarchy, letters, opcode, proxy, scan};
use crate::middleware::{rate_limit, verify_csrf};
use crate::state::AppState;

async fn health() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::ok("ok"))
}

pub fn build(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/csrf", get(auth::issue_csrf))
        .route("/letters", post(letters::create_letter))
        .route("/letters/:id/generate", post(letters::generate))
        .route("/letters/:id/cancel", post(letters::cancel_letter))
        .route("/letters/:id", get(letters::get_letter))
        .route("/scan/:barcode", post(scan::submit_scan))
        .route("/courier/hierarchy/assign-task", post(hierarchy::assign_task))
        .route("/courier/hierarchy/batch-assign", post(hierarchy::batch_assign))
        .route("/courier/hierarchy/reassign-task", post(hierarchy::reassign_task))
        .route("/courier/hierarchy/assignment-history", get(hierarchy::assignment_history))
        .route("/courier/hierarchy/pending-assignments", get(hierarchy::pending_assignments))
        .route("/courier/hierarchy/subordinates", post(hierarchy::create_subordinate))
        .route("/courier/hierarchy/subordinates/approve", post(hierarchy::approve_subordinate))
        .route("/courier/hierarchy/subordinates/transfer", post(hierarchy::transfer_subordinate))
        .route("/courier/leaderboard", get(hierarchy::leaderboard))
        .route("/opcode/validate", get(opcode::validate))
        .route("/opcode/:code", get(opcode::details))
        .route("/admin/scheduler/status", get(admin::status))
        .route("/admin/scheduler/pause", post(admin::pause))
        .route("/admin/scheduler/resume", post(admin::resume))
        .route("/admin/scheduler/jobs/:id/logs", get(admin::job_logs))
        .route("/admin/scheduler/jobs/:id/cancel", post(admin::cancel_job))
        .route("/events/:event_type", post(events::receive))
        .route("/gw/:service/*path", any(proxy::forward));

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health))
        .layer(from_fn_with_state(state.clone(), verify_csrf))
        .layer(from_fn_with_state(state.clone(), rate_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
