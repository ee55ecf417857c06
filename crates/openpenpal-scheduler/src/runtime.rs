//! Per-task execution: lock, run, release, persist, retry-or-fail.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use openpenpal_cache::CacheStore;
use openpenpal_types::{
    ExecutionOutcome, ScheduleKind, ScheduledTask, ScheduledTaskStatus, TaskExecution,
    TaskExecutionId,
};
use tracing::{info, warn};

use crate::backoff::next_delay;
use crate::error::SchedulerError;
use crate::lock::TaskLock;
use crate::repository::{ExecutionRepository, ScheduledTaskRepository};
use crate::task_types::{next_fire_after, parse_cron};

/// Delayed-queue key that failed runs are re-enqueued on; the owning
/// process's dispatcher drains it.
pub const RETRY_QUEUE: &str = "scheduler:retries";

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, payload: &serde_json::Value) -> Result<(), String>;
}

pub struct Runtime<'a> {
    cache: &'a dyn CacheStore,
    tasks: &'a dyn ScheduledTaskRepository,
    executions: &'a dyn ExecutionRepository,
}

impl<'a> Runtime<'a> {
    pub fn new(
        cache: &'a dyn CacheStore,
        tasks: &'a dyn ScheduledTaskRepository,
        executions: &'a dyn ExecutionRepository,
    ) -> Self {
        Self { cache, tasks, executions }
    }

    /// Runs one tick of `task`. Returns `Skipped` (with no execution row)
    /// if the lock could not be acquired; otherwise always persists an
    /// execution record and the task's updated run accounting.
    pub async fn run_once(
        &self,
        mut task: ScheduledTask,
        handler: &dyn TaskHandler,
    ) -> Result<ExecutionOutcome, SchedulerError> {
        let lock = match TaskLock::acquire(self.cache, &task.id.to_string(), Duration::from_secs(task.timeout_seconds)).await? {
            Some(lock) => lock,
            None => {
                info!(task_id = %task.id, "lock held by another instance, skipping tick");
                return Ok(ExecutionOutcome::Skipped);
            }
        };

        let started_at = Utc::now();
        let run_result = tokio::time::timeout(
            Duration::from_secs(task.timeout_seconds),
            handler.execute(&task.payload),
        )
        .await;

        lock.release().await?;

        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        let (outcome, error) = match run_result {
            Ok(Ok(())) => (ExecutionOutcome::Success, None),
            Ok(Err(message)) => (ExecutionOutcome::Failure, Some(message)),
            Err(_) => (ExecutionOutcome::Timeout, Some("handler exceeded timeout_seconds".to_string())),
        };

        self.executions
            .record(TaskExecution {
                id: TaskExecutionId::new(),
                task_id: task.id,
                started_at,
                finished_at: Some(finished_at),
                outcome,
                duration_ms: Some(duration_ms),
                error: error.clone(),
            })
            .await?;

        task.last_run_at = Some(finished_at);
        task.run_count += 1;
        task.next_run_at = match &task.schedule {
            ScheduleKind::Cron { expression } => {
                next_fire_after(&parse_cron(expression)?, finished_at)
            }
            ScheduleKind::Delayed { .. } | ScheduleKind::EventTriggered => None,
        };
        if task.max_runs.map(|max| task.run_count >= max).unwrap_or(false) {
            task.active = false;
            info!(task_id = %task.id, run_count = task.run_count, "task reached max_runs, deactivated");
        }

        if outcome != ExecutionOutcome::Success {
            self.schedule_retry_or_fail(&mut task, error).await?;
        } else {
            task.retry_count = 0;
        }

        self.tasks.save(&task).await?;
        Ok(outcome)
    }

    async fn schedule_retry_or_fail(&self, task: &mut ScheduledTask, error: Option<String>) -> Result<(), SchedulerError> {
        if task.retry_count < task.max_retries {
            task.retry_count += 1;
            let delay = next_delay(task.retry_count);
            let execute_at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
            self.cache
                .enqueue_delayed(RETRY_QUEUE, task.id.to_string(), execute_at.timestamp())
                .await?;
            warn!(task_id = %task.id, retry_count = task.retry_count, ?error, "task failed, retry enqueued");
        } else {
            task.status = ScheduledTaskStatus::Failed;
            task.failure_count += 1;
            warn!(task_id = %task.id, failure_count = task.failure_count, ?error, "task exhausted retries");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpenpal_cache::InMemoryCacheStore;
    use openpenpal_types::ScheduledTaskId;
    use std::sync::Mutex;

    struct MemTasks(Mutex<Vec<ScheduledTask>>);
    #[async_trait]
    impl ScheduledTaskRepository for MemTasks {
        async fn get(&self, id: ScheduledTaskId) -> Result<ScheduledTask, SchedulerError> {
            self.0.lock().unwrap().iter().find(|t| t.id == id).cloned().ok_or(SchedulerError::TaskNotFound)
        }
        async fn list_active(&self) -> Result<Vec<ScheduledTask>, SchedulerError> {
            Ok(self.0.lock().unwrap().iter().filter(|t| t.status == ScheduledTaskStatus::Active).cloned().collect())
        }
        async fn save(&self, task: &ScheduledTask) -> Result<(), SchedulerError> {
            let mut g = self.0.lock().unwrap();
            if let Some(slot) = g.iter_mut().find(|t| t.id == task.id) {
                *slot = task.clone();
            } else {
                g.push(task.clone());
            }
            Ok(())
        }
    }

    struct MemExecutions(Mutex<Vec<TaskExecution>>);
    #[async_trait]
    impl ExecutionRepository for MemExecutions {
        async fn record(&self, execution: TaskExecution) -> Result<(), SchedulerError> {
            self.0.lock().unwrap().push(execution);
            Ok(())
        }
    }

    struct AlwaysOk;
    #[async_trait]
    impl TaskHandler for AlwaysOk {
        async fn execute(&self, _payload: &serde_json::Value) -> Result<(), String> {
            Ok(())
        }
    }

    struct AlwaysFail;
    #[async_trait]
    impl TaskHandler for AlwaysFail {
        async fn execute(&self, _payload: &serde_json::Value) -> Result<(), String> {
            Err("boom".to_string())
        }
    }

    /// Succeeds only when the payload carries `{"ok": true}`.
    struct PayloadSensitive;
    #[async_trait]
    impl TaskHandler for PayloadSensitive {
        async fn execute(&self, payload: &serde_json::Value) -> Result<(), String> {
            if payload.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
                Ok(())
            } else {
                Err("payload missing ok flag".to_string())
            }
        }
    }

    fn task() -> ScheduledTask {
        ScheduledTask {
            id: ScheduledTaskId::new(),
            name: "future letter unlock".to_string(),
            task_type: "future_letter_unlock".to_string(),
            priority: 0,
            schedule: ScheduleKind::Cron { expression: "0 */10 * * * *".to_string() },
            payload: serde_json::Value::Null,
            timeout_seconds: 5,
            max_retries: 2,
            retry_count: 0,
            run_count: 0,
            failure_count: 0,
            status: ScheduledTaskStatus::Active,
            active: true,
            start_date: Utc::now() - chrono::Duration::days(1),
            end_date: None,
            max_runs: None,
            next_run_at: None,
            last_run_at: None,
        }
    }

    #[tokio::test]
    async fn successful_run_resets_retry_count_and_records_execution() {
        let cache = InMemoryCacheStore::new();
        let tasks = MemTasks(Mutex::new(vec![]));
        let executions = MemExecutions(Mutex::new(vec![]));
        let runtime = Runtime::new(&cache, &tasks, &executions);

        let mut t = task();
        t.retry_count = 1;
        let task_id = t.id;
        let outcome = runtime.run_once(t, &AlwaysOk).await.unwrap();

        assert_eq!(outcome, ExecutionOutcome::Success);
        assert_eq!(executions.0.lock().unwrap().len(), 1);
        let saved = tasks.get(task_id).await.unwrap();
        assert_eq!(saved.retry_count, 0);
        assert_eq!(saved.run_count, 1);
        assert!(saved.next_run_at.is_some(), "cron tasks keep a computed next fire time");
    }

    #[tokio::test]
    async fn failure_under_retry_budget_enqueues_a_retry() {
        let cache = InMemoryCacheStore::new();
        let tasks = MemTasks(Mutex::new(vec![]));
        let executions = MemExecutions(Mutex::new(vec![]));
        let runtime = Runtime::new(&cache, &tasks, &executions);

        let outcome = runtime.run_once(task(), &AlwaysFail).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Failure);

        let due = cache.pop_due(RETRY_QUEUE, (Utc::now() + chrono::Duration::seconds(5)).timestamp(), 10).await.unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn failure_past_retry_budget_marks_task_failed() {
        let cache = InMemoryCacheStore::new();
        let tasks = MemTasks(Mutex::new(vec![]));
        let executions = MemExecutions(Mutex::new(vec![]));
        let runtime = Runtime::new(&cache, &tasks, &executions);

        let mut t = task();
        t.retry_count = t.max_retries;
        let task_id = t.id;
        runtime.run_once(t, &AlwaysFail).await.unwrap();

        let saved = tasks.get(task_id).await.unwrap();
        assert_eq!(saved.status, ScheduledTaskStatus::Failed);
        assert_eq!(saved.failure_count, 1);
    }

    #[tokio::test]
    async fn concurrent_tick_for_same_task_is_skipped() {
        let cache = InMemoryCacheStore::new();
        let tasks = MemTasks(Mutex::new(vec![]));
        let executions = MemExecutions(Mutex::new(vec![]));
        let runtime = Runtime::new(&cache, &tasks, &executions);

        let t = task();
        let key = format!("scheduler:{}", t.id);
        let _held_elsewhere = cache.acquire_lock(&key, Duration::from_secs(30)).await.unwrap().unwrap();

        let outcome = runtime.run_once(t, &AlwaysOk).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Skipped);
        assert!(executions.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn payload_reaches_the_handler() {
        let cache = InMemoryCacheStore::new();
        let tasks = MemTasks(Mutex::new(vec![]));
        let executions = MemExecutions(Mutex::new(vec![]));
        let runtime = Runtime::new(&cache, &tasks, &executions);

        let mut t = task();
        t.payload = serde_json::json!({"ok": true});
        let outcome = runtime.run_once(t, &PayloadSensitive).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Success);

        let mut t = task();
        t.payload = serde_json::json!({});
        let outcome = runtime.run_once(t, &PayloadSensitive).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Failure);
    }

    #[tokio::test]
    async fn reaching_max_runs_deactivates_the_task() {
        let cache = InMemoryCacheStore::new();
        let tasks = MemTasks(Mutex::new(vec![]));
        let executions = MemExecutions(Mutex::new(vec![]));
        let runtime = Runtime::new(&cache, &tasks, &executions);

        let mut t = task();
        t.max_runs = Some(1);
        let task_id = t.id;
        runtime.run_once(t, &AlwaysOk).await.unwrap();

        let saved = tasks.get(task_id).await.unwrap();
        assert!(!saved.active);
        assert!(!saved.is_runnable(Utc::now()));
    }
}
