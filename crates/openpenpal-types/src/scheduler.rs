//! Scheduler vocabulary shared between `openpenpal-scheduler` and
//! `openpenpal-store`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ScheduledTaskId, TaskExecutionId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleKind {
    Cron { expression: String },
    Delayed { execute_at: DateTime<Utc> },
    EventTriggered,
}

/// Definition-level status. Per-run states (running, completed, skipped)
/// live on `TaskExecution`; a definition is either runnable, canceled by an
/// admin, or failed past its retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledTaskStatus {
    Active,
    Canceled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: ScheduledTaskId,
    /// Human-readable label shown on the admin surface.
    pub name: String,
    /// Handler key; stable identifier.
    pub task_type: String,
    /// Higher runs first when one tick fires several due tasks.
    pub priority: i32,
    pub schedule: ScheduleKind,
    pub payload: serde_json::Value,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_count: u32,
    pub run_count: u32,
    pub failure_count: u32,
    pub status: ScheduledTaskStatus,
    /// Admin kill switch, independent of `status`; an inactive task keeps
    /// its definition but never fires.
    pub active: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    /// Stop firing after this many runs.
    pub max_runs: Option<u32>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl ScheduledTask {
    /// Window and budget gates that apply regardless of the schedule kind.
    pub fn is_runnable(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.status == ScheduledTaskStatus::Active
            && self.start_date <= now
            && self.end_date.map(|end| now <= end).unwrap_or(true)
            && self.max_runs.map(|max| self.run_count < max).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success,
    Failure,
    Skipped,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub id: TaskExecutionId,
    pub task_id: ScheduledTaskId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: ExecutionOutcome,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn task() -> ScheduledTask {
        let now = Utc::now();
        ScheduledTask {
            id: ScheduledTaskId::new(),
            name: "future letter unlock".to_string(),
            task_type: "future_letter_unlock".to_string(),
            priority: 0,
            schedule: ScheduleKind::Cron { expression: "0 */10 * * * *".to_string() },
            payload: serde_json::Value::Null,
            timeout_seconds: 60,
            max_retries: 3,
            retry_count: 0,
            run_count: 0,
            failure_count: 0,
            status: ScheduledTaskStatus::Active,
            active: true,
            start_date: now - Duration::days(1),
            end_date: None,
            max_runs: None,
            next_run_at: None,
            last_run_at: None,
        }
    }

    #[test]
    fn inactive_or_canceled_task_is_not_runnable() {
        let now = Utc::now();
        let mut t = task();
        assert!(t.is_runnable(now));
        t.active = false;
        assert!(!t.is_runnable(now));
        t.active = true;
        t.status = ScheduledTaskStatus::Canceled;
        assert!(!t.is_runnable(now));
    }

    #[test]
    fn date_window_gates_runnability() {
        let now = Utc::now();
        let mut t = task();
        t.start_date = now + Duration::hours(1);
        assert!(!t.is_runnable(now));
        t.start_date = now - Duration::hours(2);
        t.end_date = Some(now - Duration::hours(1));
        assert!(!t.is_runnable(now));
    }

    #[test]
    fn max_runs_caps_runnability() {
        let now = Utc::now();
        let mut t = task();
        t.max_runs = Some(3);
        t.run_count = 2;
        assert!(t.is_runnable(now));
        t.run_count = 3;
        assert!(!t.is_runnable(now));
    }
}
