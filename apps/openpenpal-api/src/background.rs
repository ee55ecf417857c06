//! Background runtime: the cron tick loop, the delayed-queue dispatcher,
//! the worker heartbeat, and the gateway health checker. All of them honor
//! the admin pause switch.

use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use openpenpal_hierarchy::{leaderboard, LeaderboardScope, TaskRepository};
use openpenpal_letters::{promote_due_letters, LetterRepository};
use openpenpal_scheduler::{
    dispatcher::dispatch_due, parse_cron, sweep_inactive, Runtime, ScheduledTaskRepository,
    TaskHandler, Worker, RETRY_QUEUE,
};
use openpenpal_types::{LetterStatus, ScheduleKind, ScheduledTask, TaskStatus, UserId};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Delayed-queue key admitted signed events land on.
pub const EVENT_QUEUE: &str = "scheduler:events:due";

const QUEUE_TICK: Duration = Duration::from_secs(1);
const HEARTBEAT_INTERVAL_SECS: i64 = 30;

pub fn spawn_all(state: AppState) {
    tokio::spawn(cron_loop(state.clone()));
    tokio::spawn(queue_loop(state.clone()));
    tokio::spawn(heartbeat_loop(state));
}

/// One pass per configured tick: fire every active cron/delayed task whose
/// time has come. The distributed lock inside `Runtime::run_once` keeps a
/// second instance's identical pass from double-executing anything.
async fn cron_loop(state: AppState) {
    let mut tick = tokio::time::interval(state.settings.scheduler_tick());
    loop {
        tick.tick().await;
        if state.scheduler_paused.load(Ordering::Acquire) {
            continue;
        }
        let tasks = match state.scheduled_tasks.list_active().await {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(%err, "could not list active scheduled tasks");
                continue;
            }
        };
        let mut due: Vec<ScheduledTask> = tasks
            .into_iter()
            .filter(|task| is_due(task, state.settings.scheduler_tick()))
            .collect();
        // Higher priority fires first within a tick.
        due.sort_by(|a, b| b.priority.cmp(&a.priority));
        for task in due {
            run_task(&state, task).await;
        }
    }
}

fn is_due(task: &ScheduledTask, tick: Duration) -> bool {
    let now = Utc::now();
    if !task.is_runnable(now) {
        return false;
    }
    match &task.schedule {
        ScheduleKind::Cron { expression } => {
            // After a first run the runtime persists the computed next fire
            // time; before that, derive it from the last tick window.
            if let Some(next) = task.next_run_at {
                return next <= now;
            }
            let schedule = match parse_cron(expression) {
                Ok(schedule) => schedule,
                Err(err) => {
                    warn!(task_type = %task.task_type, %err, "unparseable cron expression");
                    return false;
                }
            };
            let horizon = now - ChronoDuration::from_std(tick).unwrap_or(ChronoDuration::minutes(1));
            let last = task.last_run_at.unwrap_or(horizon);
            schedule.after(&last).next().map(|next| next <= now).unwrap_or(false)
        }
        ScheduleKind::Delayed { execute_at } => task.last_run_at.is_none() && *execute_at <= now,
        // Event-triggered tasks only run when an admitted event queues them.
        ScheduleKind::EventTriggered => false,
    }
}

async fn run_task(state: &AppState, task: ScheduledTask) {
    // A task canceled or deactivated after being queued still surfaces
    // here; drop it.
    if !task.is_runnable(Utc::now()) {
        debug!(task_type = %task.task_type, "skipping non-runnable task");
        return;
    }
    let Some(handler) = handler_for(state, &task.task_type) else {
        warn!(task_type = %task.task_type, "no handler registered for task type");
        return;
    };
    let runtime = Runtime::new(
        state.cache.as_ref(),
        state.scheduled_tasks.as_ref(),
        state.executions.as_ref(),
    );
    let task_type = task.task_type.clone();
    match runtime.run_once(task, handler.as_ref()).await {
        Ok(outcome) => debug!(task_type, ?outcome, "scheduled task tick finished"),
        Err(err) => warn!(task_type, %err, "scheduled task tick errored"),
    }
}

/// Drains the retry queue and the signed-event queue every second and
/// re-runs the referenced tasks.
async fn queue_loop(state: AppState) {
    let mut tick = tokio::time::interval(QUEUE_TICK);
    loop {
        tick.tick().await;
        if state.scheduler_paused.load(Ordering::Acquire) {
            continue;
        }
        for queue in [RETRY_QUEUE, EVENT_QUEUE] {
            let result = dispatch_due(state.cache.as_ref(), queue, 16, |member| {
                let state = state.clone();
                async move {
                    let Ok(id) = member.parse::<Uuid>() else {
                        warn!(queue, member, "non-uuid member in delayed queue");
                        return;
                    };
                    match state.scheduled_tasks.get(id.into()).await {
                        Ok(task) => run_task(&state, task).await,
                        Err(err) => warn!(queue, %id, %err, "queued task no longer loadable"),
                    }
                }
            })
            .await;
            if let Err(err) = result {
                warn!(queue, %err, "delayed queue dispatch failed");
            }
        }
    }
}

/// Registers this process in the worker registry and keeps its heartbeat
/// fresh; overdue peers are swept inactive.
async fn heartbeat_loop(state: AppState) {
    let worker_id = format!("worker-{}", Uuid::new_v4());
    {
        let mut workers = state.workers.lock().expect("worker registry lock poisoned");
        workers.push(Worker::register(worker_id.clone(), Utc::now(), HEARTBEAT_INTERVAL_SECS));
    }
    info!(worker_id, "worker registered");

    let mut tick = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS as u64));
    loop {
        tick.tick().await;
        let now = Utc::now();
        let mut workers = state.workers.lock().expect("worker registry lock poisoned");
        if let Some(own) = workers.iter_mut().find(|w| w.id == worker_id) {
            own.heartbeat(now);
        }
        for flipped in sweep_inactive(&mut workers, now) {
            warn!(worker_id = flipped, "worker marked inactive after missed heartbeats");
        }
    }
}

/// Resolves a task type to its handler. Task types that belong to external
/// collaborators (AI reply, campaign close, archival, prompt generation)
/// log their dispatch; the collaborator is invoked behind its own service
/// boundary and is not part of this core.
pub fn handler_for(state: &AppState, task_type: &str) -> Option<Box<dyn TaskHandler>> {
    let state = state.clone();
    Some(match task_type {
        "future_letter_unlock" => Box::new(FutureLetterUnlock(state)),
        "letter_expiration_sweep" => Box::new(LetterExpirationSweep(state)),
        "task_timeout_check" => Box::new(TaskTimeoutCheck(state)),
        "leaderboard_refresh" => Box::new(LeaderboardRefresh(state)),
        "ai_penpal_reply" | "envelope_submission_close" | "weekly_maintenance" | "daily_inspiration" => {
            Box::new(ExternalDispatch(task_type.to_string()))
        }
        _ => return None,
    })
}

struct FutureLetterUnlock(AppState);

#[async_trait]
impl TaskHandler for FutureLetterUnlock {
    async fn execute(&self, _payload: &serde_json::Value) -> Result<(), String> {
        let report = promote_due_letters(self.0.letters.as_ref(), Utc::now())
            .await
            .map_err(|e| e.to_string())?;
        if report.promoted_count > 0 {
            info!(promoted = report.promoted_count, "future letters released");
        }
        Ok(())
    }
}

struct LetterExpirationSweep(AppState);

#[async_trait]
impl TaskHandler for LetterExpirationSweep {
    async fn execute(&self, _payload: &serde_json::Value) -> Result<(), String> {
        let cutoff = Utc::now() - ChronoDuration::days(7);
        let stale = self.0.letters.stale_drafts(cutoff).await.map_err(|e| e.to_string())?;
        let abandoned = stale.len();
        for mut letter in stale {
            letter.status = LetterStatus::Canceled;
            letter.updated_at = Utc::now();
            self.0.letters.save(&letter).await.map_err(|e| e.to_string())?;
        }
        if abandoned > 0 {
            info!(abandoned, "stale drafts canceled");
        }
        Ok(())
    }
}

struct TaskTimeoutCheck(AppState);

#[async_trait]
impl TaskHandler for TaskTimeoutCheck {
    async fn execute(&self, _payload: &serde_json::Value) -> Result<(), String> {
        let cutoff = Utc::now() - ChronoDuration::hours(48);
        let stalled = self
            .0
            .courier_tasks
            .stale_accepted(cutoff)
            .await
            .map_err(|e| e.to_string())?;

        let system = UserId(Uuid::nil());
        for mut task in stalled {
            task.status = TaskStatus::Available;
            task.assigned_courier_id = None;
            task.accepted_at = None;
            self.0.courier_tasks.save(&task).await.map_err(|e| e.to_string())?;

            // Best effort: hand the task straight to the next best courier.
            let engine = self.0.assignment_engine();
            match engine.assign_auto_hierarchy(task.id, system).await {
                Ok(reassigned) => {
                    info!(task_id = %task.id, courier_id = ?reassigned.assigned_courier_id, "timed-out task reassigned");
                }
                Err(err) => {
                    debug!(task_id = %task.id, %err, "timed-out task returned to the pool");
                }
            }
        }
        Ok(())
    }
}

struct LeaderboardRefresh(AppState);

#[async_trait]
impl TaskHandler for LeaderboardRefresh {
    async fn execute(&self, _payload: &serde_json::Value) -> Result<(), String> {
        let couriers = self.0.couriers.list_approved().await.map_err(|e| e.to_string())?;
        let now = Utc::now();

        let mut boards = vec![leaderboard::build(LeaderboardScope::National, &couriers, now)];
        let mut schools: Vec<String> = couriers
            .iter()
            .filter_map(|c| c.managed_op_code_prefix.get(0..2).map(str::to_string))
            .collect();
        schools.sort();
        schools.dedup();
        for code in schools {
            boards.push(leaderboard::build(LeaderboardScope::School { code }, &couriers, now));
        }

        let count = boards.len();
        *self.0.leaderboards.write().expect("leaderboard lock poisoned") = boards;
        info!(boards = count, "leaderboards refreshed");
        Ok(())
    }
}

/// Task types whose work lives in an external collaborator.
struct ExternalDispatch(String);

#[async_trait]
impl TaskHandler for ExternalDispatch {
    async fn execute(&self, payload: &serde_json::Value) -> Result<(), String> {
        info!(task_type = %self.0, %payload, "dispatched to external collaborator");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpenpal_types::ScheduledTaskStatus;

    fn cron_task(expression: &str, last_run_at: Option<chrono::DateTime<Utc>>) -> ScheduledTask {
        ScheduledTask {
            id: openpenpal_types::ScheduledTaskId::new(),
            name: "future letter unlock".to_string(),
            task_type: "future_letter_unlock".to_string(),
            priority: 0,
            schedule: ScheduleKind::Cron { expression: expression.to_string() },
            payload: serde_json::Value::Null,
            timeout_seconds: 60,
            max_retries: 1,
            retry_count: 0,
            run_count: 0,
            failure_count: 0,
            status: ScheduledTaskStatus::Active,
            active: true,
            start_date: Utc::now() - ChronoDuration::days(1),
            end_date: None,
            max_runs: None,
            next_run_at: None,
            last_run_at,
        }
    }

    #[test]
    fn cron_task_is_due_once_its_next_fire_has_passed() {
        // Fires every second; a task last run two minutes ago is overdue.
        let task = cron_task("* * * * * *", Some(Utc::now() - ChronoDuration::minutes(2)));
        assert!(is_due(&task, Duration::from_secs(60)));
    }

    #[test]
    fn cron_task_just_run_is_not_due() {
        // Fires at 03:00 daily; it cannot be due again within the same minute.
        let task = cron_task("0 0 3 * * *", Some(Utc::now()));
        assert!(!is_due(&task, Duration::from_secs(60)));
    }

    #[test]
    fn delayed_task_is_due_only_before_its_first_run() {
        let past = Utc::now() - ChronoDuration::minutes(1);
        let mut task = cron_task("* * * * * *", None);
        task.schedule = ScheduleKind::Delayed { execute_at: past };
        assert!(is_due(&task, Duration::from_secs(60)));
        task.last_run_at = Some(Utc::now());
        assert!(!is_due(&task, Duration::from_secs(60)));
    }

    #[test]
    fn event_triggered_tasks_never_fire_from_the_cron_loop() {
        let mut task = cron_task("* * * * * *", None);
        task.schedule = ScheduleKind::EventTriggered;
        assert!(!is_due(&task, Duration::from_secs(60)));
    }

    #[test]
    fn persisted_next_run_at_takes_precedence() {
        let mut task = cron_task("0 0 3 * * *", Some(Utc::now() - ChronoDuration::days(2)));
        task.next_run_at = Some(Utc::now() + ChronoDuration::hours(1));
        assert!(!is_due(&task, Duration::from_secs(60)));
        task.next_run_at = Some(Utc::now() - ChronoDuration::minutes(1));
        assert!(is_due(&task, Duration::from_secs(60)));
    }

    #[test]
    fn inactive_window_or_spent_run_budget_suppresses_firing() {
        let mut task = cron_task("* * * * * *", Some(Utc::now() - ChronoDuration::minutes(5)));
        task.active = false;
        assert!(!is_due(&task, Duration::from_secs(60)));

        let mut task = cron_task("* * * * * *", Some(Utc::now() - ChronoDuration::minutes(5)));
        task.end_date = Some(Utc::now() - ChronoDuration::hours(1));
        assert!(!is_due(&task, Duration::from_secs(60)));

        let mut task = cron_task("* * * * * *", Some(Utc::now() - ChronoDuration::minutes(5)));
        task.max_runs = Some(10);
        task.run_count = 10;
        assert!(!is_due(&task, Duration::from_secs(60)));
    }
}
