//! Postgres adapters for the `openpenpal-scheduler` storage ports. The
//! schedule definition itself is stored as JSONB since it's a small tagged
//! union rather than something queried on directly.

use async_trait::async_trait;
use openpenpal_scheduler::{ExecutionRepository, ScheduledTaskRepository, SchedulerError};
use openpenpal_types::{ScheduleKind, ScheduledTask, ScheduledTaskId, TaskExecution, TaskExecutionId};
use sqlx::{PgPool, Row};

use crate::codec;

fn storage_err(e: sqlx::Error) -> SchedulerError {
    SchedulerError::Storage(e.to_string())
}

pub struct PgScheduledTaskRepository {
    pool: PgPool,
}

impl PgScheduledTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::postgres::PgRow) -> Result<ScheduledTask, SchedulerError> {
        let schedule_json: serde_json::Value = row.try_get("schedule").map_err(storage_err)?;
        let schedule: ScheduleKind = serde_json::from_value(schedule_json)
            .map_err(|e| SchedulerError::Storage(format!("bad schedule json: {e}")))?;
        Ok(ScheduledTask {
            id: ScheduledTaskId(row.try_get("id").map_err(storage_err)?),
            name: row.try_get("name").map_err(storage_err)?,
            task_type: row.try_get("task_type").map_err(storage_err)?,
            priority: row.try_get::<i32, _>("priority").map_err(storage_err)?,
            schedule,
            payload: row.try_get("payload").map_err(storage_err)?,
            timeout_seconds: row.try_get::<i64, _>("timeout_seconds").map_err(storage_err)? as u64,
            max_retries: row.try_get::<i32, _>("max_retries").map_err(storage_err)? as u32,
            retry_count: row.try_get::<i32, _>("retry_count").map_err(storage_err)? as u32,
            run_count: row.try_get::<i32, _>("run_count").map_err(storage_err)? as u32,
            failure_count: row.try_get::<i32, _>("failure_count").map_err(storage_err)? as u32,
            status: codec::scheduled_task_status_from_db(&row.try_get::<String, _>("status").map_err(storage_err)?)
                .ok_or_else(|| SchedulerError::Storage("unknown scheduled task status".to_string()))?,
            active: row.try_get("active").map_err(storage_err)?,
            start_date: row.try_get("start_date").map_err(storage_err)?,
            end_date: row.try_get("end_date").map_err(storage_err)?,
            max_runs: row
                .try_get::<Option<i32>, _>("max_runs")
                .map_err(storage_err)?
                .map(|n| n as u32),
            next_run_at: row.try_get("next_run_at").map_err(storage_err)?,
            last_run_at: row.try_get("last_run_at").map_err(storage_err)?,
        })
    }
}

#[async_trait]
impl ScheduledTaskRepository for PgScheduledTaskRepository {
    async fn get(&self, id: ScheduledTaskId) -> Result<ScheduledTask, SchedulerError> {
        let row = sqlx::query("SELECT * FROM scheduled_tasks WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or(SchedulerError::TaskNotFound)?;
        Self::row_to_task(&row)
    }

    async fn list_active(&self) -> Result<Vec<ScheduledTask>, SchedulerError> {
        let rows = sqlx::query("SELECT * FROM scheduled_tasks WHERE status = 'active'")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn save(&self, task: &ScheduledTask) -> Result<(), SchedulerError> {
        let schedule_json = serde_json::to_value(&task.schedule)
            .map_err(|e| SchedulerError::Storage(format!("bad schedule json: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO scheduled_tasks (
                id, name, task_type, priority, schedule, payload,
                timeout_seconds, max_retries, retry_count, run_count,
                failure_count, status, active, start_date, end_date,
                max_runs, next_run_at, last_run_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                priority = excluded.priority,
                schedule = excluded.schedule,
                payload = excluded.payload,
                timeout_seconds = excluded.timeout_seconds,
                max_retries = excluded.max_retries,
                retry_count = excluded.retry_count,
                run_count = excluded.run_count,
                failure_count = excluded.failure_count,
                status = excluded.status,
                active = excluded.active,
                start_date = excluded.start_date,
                end_date = excluded.end_date,
                max_runs = excluded.max_runs,
                next_run_at = excluded.next_run_at,
                last_run_at = excluded.last_run_at
            "#,
        )
        .bind(task.id.0)
        .bind(&task.name)
        .bind(&task.task_type)
        .bind(task.priority)
        .bind(schedule_json)
        .bind(&task.payload)
        .bind(task.timeout_seconds as i64)
        .bind(task.max_retries as i32)
        .bind(task.retry_count as i32)
        .bind(task.run_count as i32)
        .bind(task.failure_count as i32)
        .bind(codec::scheduled_task_status_to_db(task.status))
        .bind(task.active)
        .bind(task.start_date)
        .bind(task.end_date)
        .bind(task.max_runs.map(|n| n as i32))
        .bind(task.next_run_at)
        .bind(task.last_run_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

pub struct PgExecutionRepository {
    pool: PgPool,
}

impl PgExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PgScheduledTaskRepository {
    /// Finds the (single) registered task of a given type, for event
    /// admission and startup seeding of the pre-registered task set.
    pub async fn find_by_type(&self, task_type: &str) -> Result<Option<ScheduledTask>, SchedulerError> {
        let row = sqlx::query("SELECT * FROM scheduled_tasks WHERE task_type = $1 LIMIT 1")
            .bind(task_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.map(|r| Self::row_to_task(&r)).transpose()
    }

    pub async fn list_all(&self) -> Result<Vec<ScheduledTask>, SchedulerError> {
        let rows = sqlx::query("SELECT * FROM scheduled_tasks ORDER BY task_type")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(Self::row_to_task).collect()
    }
}

#[async_trait]
impl ExecutionRepository for PgExecutionRepository {
    async fn record(&self, execution: TaskExecution) -> Result<(), SchedulerError> {
        sqlx::query(
            r#"
            INSERT INTO task_executions (id, task_id, started_at, finished_at, outcome, duration_ms, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(execution.id.0)
        .bind(execution.task_id.0)
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .bind(codec::execution_outcome_to_db(execution.outcome))
        .bind(execution.duration_ms.map(|ms| ms as i64))
        .bind(&execution.error)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

impl PgExecutionRepository {
    /// Execution records for one task, newest first, for the admin log
    /// surface.
    pub async fn list_for_task(
        &self,
        task_id: ScheduledTaskId,
        limit: i64,
    ) -> Result<Vec<TaskExecution>, SchedulerError> {
        let rows = sqlx::query(
            "SELECT * FROM task_executions WHERE task_id = $1 ORDER BY started_at DESC LIMIT $2",
        )
        .bind(task_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter()
            .map(|row| {
                Ok(TaskExecution {
                    id: TaskExecutionId(row.try_get("id").map_err(storage_err)?),
                    task_id: ScheduledTaskId(row.try_get("task_id").map_err(storage_err)?),
                    started_at: row.try_get("started_at").map_err(storage_err)?,
                    finished_at: row.try_get("finished_at").map_err(storage_err)?,
                    outcome: codec::execution_outcome_from_db(
                        &row.try_get::<String, _>("outcome").map_err(storage_err)?,
                    )
                    .ok_or_else(|| SchedulerError::Storage("unknown execution outcome".to_string()))?,
                    duration_ms: row
                        .try_get::<Option<i64>, _>("duration_ms")
                        .map_err(storage_err)?
                        .map(|ms| ms as u64),
                    error: row.try_get("error").map_err(storage_err)?,
                })
            })
            .collect()
    }
}
