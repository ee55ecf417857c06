//! Composition root: configuration, storage, cache, gateway, background
//! runtime, and the HTTP server.

mod auth;
mod background;
mod handlers;
mod middleware;
mod routes;
mod state;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use anyhow::Context;
use openpenpal_cache::InMemoryCacheStore;
use openpenpal_config::Settings;
use openpenpal_gateway::{
    BackendInstance, HealthChecker, IngressLimiter, RequestPipeline, RetryPolicy, ServiceRegistry,
};
use openpenpal_scheduler::{task_types::ALL_TASK_TYPES, ScheduledTaskRepository};
use openpenpal_store::{
    PgBarcodeRepository, PgCourierRepository, PgExecutionRepository, PgLetterRepository,
    PgOpCodeDirectory, PgScanRecordRepository, PgScheduledTaskRepository, PgTaskRepository,
    PgTaskStore, PgUserRepository,
};
use openpenpal_types::{ScheduleKind, ScheduledTask, ScheduledTaskId, ScheduledTaskStatus};
use tracing::info;

use crate::auth::SessionKeys;
use crate::state::AppState;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
const HEALTH_CHECK_FAILURE_THRESHOLD: u32 = 3;
const DB_MAX_CONNECTIONS: u32 = 16;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    openpenpal_observability::init("openpenpal_api");

    let settings = Settings::from_env().context("configuration")?;
    let pool = openpenpal_store::connect(&settings.database_url, DB_MAX_CONNECTIONS)
        .await
        .context("database")?;

    let gateway = Arc::new(ServiceRegistry::new());
    let mut by_service: HashMap<String, Vec<Arc<BackendInstance>>> = HashMap::new();
    for backend in &settings.gateway_backends {
        by_service
            .entry(backend.service_name.clone())
            .or_default()
            .push(Arc::new(BackendInstance::new(
                &backend.service_name,
                &backend.host,
                backend.weight,
                "/health",
            )));
    }
    for (service, instances) in by_service {
        gateway
            .register(&service, instances, &settings.gateway_algorithm)
            .map_err(|e| anyhow::anyhow!("gateway registration: {e}"))?;
    }

    let pipeline = Arc::new(RequestPipeline::new(
        gateway.clone(),
        RetryPolicy {
            max_retries: settings.gateway_max_retries,
            ..RetryPolicy::default()
        },
        settings.gateway_timeout(),
    ));

    let state = AppState {
        session_keys: SessionKeys::from_secret(settings.hmac_secret.as_bytes()),
        limiter: Arc::new(IngressLimiter::per_minute(settings.rate_limit_per_minute)),
        cache: Arc::new(InMemoryCacheStore::new()),
        users: Arc::new(PgUserRepository::new(pool.clone())),
        couriers: Arc::new(PgCourierRepository::new(pool.clone())),
        courier_tasks: Arc::new(PgTaskRepository::new(pool.clone())),
        directory: Arc::new(PgOpCodeDirectory::new(pool.clone())),
        letters: Arc::new(PgLetterRepository::new(pool.clone())),
        barcodes: Arc::new(PgBarcodeRepository::new(pool.clone())),
        delivery_tasks: Arc::new(PgTaskStore::new(pool.clone())),
        scans: Arc::new(PgScanRecordRepository::new(pool.clone())),
        scheduled_tasks: Arc::new(PgScheduledTaskRepository::new(pool.clone())),
        executions: Arc::new(PgExecutionRepository::new(pool)),
        gateway: gateway.clone(),
        pipeline,
        scheduler_paused: Arc::new(AtomicBool::new(false)),
        workers: Arc::new(Mutex::new(Vec::new())),
        leaderboards: Arc::new(RwLock::new(Vec::new())),
        settings: Arc::new(settings),
    };

    seed_task_registry(&state).await?;
    seed_admin_account(&state).await?;
    background::spawn_all(state.clone());
    if !state.settings.gateway_backends.is_empty() {
        tokio::spawn(
            HealthChecker::new(gateway, HEALTH_CHECK_INTERVAL, HEALTH_CHECK_FAILURE_THRESHOLD).run(),
        );
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], state.settings.port));
    let app = routes::build(state);
    let listener = tokio::net::TcpListener::bind(addr).await.context("bind")?;
    info!(%addr, "openpenpal api listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("serve")?;
    Ok(())
}

/// Bootstrap account for a fresh deployment: created only when
/// `ADMIN_USERNAME`/`ADMIN_PASSWORD` are set and the username is free.
async fn seed_admin_account(state: &AppState) -> anyhow::Result<()> {
    let (Ok(username), Ok(password)) = (
        std::env::var("ADMIN_USERNAME"),
        std::env::var("ADMIN_PASSWORD"),
    ) else {
        return Ok(());
    };
    let existing = state
        .users
        .credential_by_username(&username)
        .await
        .map_err(|e| anyhow::anyhow!("admin bootstrap: {e}"))?;
    if existing.is_none() {
        let user = openpenpal_types::User {
            id: openpenpal_types::UserId::new(),
            username: username.clone(),
            role: openpenpal_types::UserRole::PlatformAdmin,
            deactivated: false,
        };
        state
            .users
            .create(&user, &auth::hash_password(&password), chrono::Utc::now())
            .await
            .map_err(|e| anyhow::anyhow!("admin bootstrap: {e}"))?;
        info!(username, "admin account bootstrapped");
    }
    Ok(())
}

/// Ensures every pre-registered task type has a row, so the cron loop can
/// fire them without manual setup. Existing rows are left untouched.
async fn seed_task_registry(state: &AppState) -> anyhow::Result<()> {
    for def in ALL_TASK_TYPES {
        if state
            .scheduled_tasks
            .find_by_type(def.name)
            .await
            .map_err(|e| anyhow::anyhow!("task registry: {e}"))?
            .is_none()
        {
            let task = ScheduledTask {
                id: ScheduledTaskId::new(),
                name: def.name.replace('_', " "),
                task_type: def.name.to_string(),
                priority: 0,
                schedule: ScheduleKind::Cron {
                    expression: def.cron_expression.to_string(),
                },
                payload: serde_json::Value::Null,
                timeout_seconds: def.timeout_seconds,
                max_retries: def.max_retries,
                retry_count: 0,
                run_count: 0,
                failure_count: 0,
                status: ScheduledTaskStatus::Active,
                active: true,
                start_date: chrono::Utc::now(),
                end_date: None,
                max_runs: None,
                next_run_at: None,
                last_run_at: None,
            };
            state
                .scheduled_tasks
                .save(&task)
                .await
                .map_err(|e| anyhow::anyhow!("task registry: {e}"))?;
            info!(task_type = def.name, "scheduled task seeded");
        }
    }
    Ok(())
}
