use async_trait::async_trait;
use openpenpal_types::{ScheduledTask, ScheduledTaskId, TaskExecution};

use crate::error::SchedulerError;

#[async_trait]
pub trait ScheduledTaskRepository: Send + Sync {
    async fn get(&self, id: ScheduledTaskId) -> Result<ScheduledTask, SchedulerError>;
    async fn list_active(&self) -> Result<Vec<ScheduledTask>, SchedulerError>;
    async fn save(&self, task: &ScheduledTask) -> Result<(), SchedulerError>;
}

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn record(&self, execution: TaskExecution) -> Result<(), SchedulerError>;
}
