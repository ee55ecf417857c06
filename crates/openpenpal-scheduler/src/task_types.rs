//! Pre-registered platform task types. Names are stable identifiers used as
//! `ScheduledTask.task_type`; cron expressions use the 6-field `cron` crate
//! format (seconds first).

use std::str::FromStr;

use crate::error::SchedulerError;

pub struct TaskTypeDef {
    pub name: &'static str,
    pub cron_expression: &'static str,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

pub const FUTURE_LETTER_UNLOCK: TaskTypeDef = TaskTypeDef {
    name: "future_letter_unlock",
    cron_expression: "0 */10 * * * *",
    timeout_seconds: 60,
    max_retries: 3,
};

pub const AI_PENPAL_REPLY: TaskTypeDef = TaskTypeDef {
    name: "ai_penpal_reply",
    cron_expression: "0 0 */2 * * *",
    timeout_seconds: 300,
    max_retries: 2,
};

pub const LETTER_EXPIRATION_SWEEP: TaskTypeDef = TaskTypeDef {
    name: "letter_expiration_sweep",
    cron_expression: "0 0 3 * * *",
    timeout_seconds: 120,
    max_retries: 1,
};

pub const TASK_TIMEOUT_CHECK: TaskTypeDef = TaskTypeDef {
    name: "task_timeout_check",
    cron_expression: "0 0 * * * *",
    timeout_seconds: 120,
    max_retries: 1,
};

pub const ENVELOPE_SUBMISSION_CLOSE: TaskTypeDef = TaskTypeDef {
    name: "envelope_submission_close",
    cron_expression: "0 30 0 * * *",
    timeout_seconds: 120,
    max_retries: 1,
};

pub const WEEKLY_MAINTENANCE: TaskTypeDef = TaskTypeDef {
    name: "weekly_maintenance",
    cron_expression: "0 0 3 * * Sun",
    timeout_seconds: 600,
    max_retries: 0,
};

pub const DAILY_INSPIRATION: TaskTypeDef = TaskTypeDef {
    name: "daily_inspiration",
    cron_expression: "0 0 8 * * *",
    timeout_seconds: 60,
    max_retries: 2,
};

/// Rebuilds the courier leaderboards; rankings are materialized, never
/// computed inside a request handler.
pub const LEADERBOARD_REFRESH: TaskTypeDef = TaskTypeDef {
    name: "leaderboard_refresh",
    cron_expression: "0 15 * * * *",
    timeout_seconds: 120,
    max_retries: 1,
};

pub const ALL_TASK_TYPES: &[TaskTypeDef] = &[
    FUTURE_LETTER_UNLOCK,
    AI_PENPAL_REPLY,
    LETTER_EXPIRATION_SWEEP,
    TASK_TIMEOUT_CHECK,
    ENVELOPE_SUBMISSION_CLOSE,
    WEEKLY_MAINTENANCE,
    DAILY_INSPIRATION,
    LEADERBOARD_REFRESH,
];

/// Parses and validates a cron expression, surfacing this crate's error
/// type instead of the `cron` crate's.
pub fn parse_cron(expression: &str) -> Result<cron::Schedule, SchedulerError> {
    cron::Schedule::from_str(expression).map_err(|e| SchedulerError::BadCronExpression(e.to_string()))
}

/// Next fire time strictly after `after`, per the dispatcher tick.
pub fn next_fire_after(
    schedule: &cron::Schedule,
    after: chrono::DateTime<chrono::Utc>,
) -> Option<chrono::DateTime<chrono::Utc>> {
    schedule.after(&after).next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pre_registered_cron_expression_parses() {
        for def in ALL_TASK_TYPES {
            assert!(parse_cron(def.cron_expression).is_ok(), "{} failed to parse", def.name);
        }
    }

    #[test]
    fn bad_cron_expression_is_rejected() {
        assert!(parse_cron("not a cron expression").is_err());
    }

    #[test]
    fn future_letter_unlock_fires_at_least_every_ten_minutes() {
        let schedule = parse_cron(FUTURE_LETTER_UNLOCK.cron_expression).unwrap();
        let now = chrono::Utc::now();
        let next = next_fire_after(&schedule, now).unwrap();
        assert!((next - now).num_minutes() <= 10);
    }
}
