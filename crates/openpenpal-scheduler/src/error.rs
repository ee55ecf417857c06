use openpenpal_cache::CacheError;
use openpenpal_errors::DomainError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("distributed lock could not be acquired")]
    LockNotAcquired,
    #[error("event has already been processed")]
    ReplayedEvent,
    #[error("event timestamp is outside the acceptable skew window")]
    StaleEvent,
    #[error("event signature verification failed")]
    BadSignature,
    #[error("task execution exceeded its timeout")]
    Timeout,
    #[error("scheduled task not found")]
    TaskNotFound,
    #[error("invalid cron expression: {0}")]
    BadCronExpression(String),
    #[error("cache backend error: {0}")]
    Cache(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<CacheError> for SchedulerError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Backend(msg) => SchedulerError::Cache(msg),
        }
    }
}

impl From<SchedulerError> for DomainError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::LockNotAcquired => DomainError::LockNotAcquired,
            SchedulerError::ReplayedEvent => DomainError::ReplayedEvent,
            SchedulerError::StaleEvent => DomainError::StaleEvent,
            SchedulerError::BadSignature => DomainError::Unauthenticated,
            SchedulerError::Timeout => DomainError::TaskTimeout,
            SchedulerError::TaskNotFound => DomainError::NotFound,
            SchedulerError::BadCronExpression(detail) => DomainError::MissingField(detail),
            SchedulerError::Cache(msg) | SchedulerError::Storage(msg) => DomainError::Internal(msg),
        }
    }
}
