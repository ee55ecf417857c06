//! Storage ports. `openpenpal-store` provides the sqlx-backed implementation;
//! this crate never depends on a concrete database driver.

use async_trait::async_trait;
use openpenpal_types::{AssignmentHistoryRecord, Courier, CourierId, Task, TaskId, TaskStatus, UserId};

use crate::error::HierarchyError;

#[async_trait]
pub trait CourierRepository: Send + Sync {
    async fn get(&self, id: CourierId) -> Result<Courier, HierarchyError>;
    async fn get_by_user(&self, user_id: UserId) -> Result<Courier, HierarchyError>;
    async fn children_of(&self, parent_id: CourierId) -> Result<Vec<Courier>, HierarchyError>;
    async fn candidates_for_prefix(&self, op_code_prefix: &str) -> Result<Vec<Courier>, HierarchyError>;
    async fn active_task_count(&self, courier_id: CourierId) -> Result<u32, HierarchyError>;
    async fn save(&self, courier: &Courier) -> Result<(), HierarchyError>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn get(&self, id: TaskId) -> Result<Task, HierarchyError>;
    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, HierarchyError>;
    async fn save(&self, task: &Task) -> Result<(), HierarchyError>;
    async fn record_assignment(&self, record: AssignmentHistoryRecord) -> Result<(), HierarchyError>;
}

/// Resolves an OP Code prefix to a coordinate, for the distance term of the
/// scoring formula. `openpenpal-store` backs this with a zone table;
/// `openpenpal-hierarchy` only needs the trait.
#[async_trait]
pub trait OpCodeDirectory: Send + Sync {
    async fn coordinates_of(&self, op_code_prefix: &str) -> Result<Option<(f64, f64)>, HierarchyError>;
}
