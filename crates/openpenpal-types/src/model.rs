//! Pure data entities shared across the hierarchy, letters, scheduler, and
//! store crates. No business logic lives here; see `openpenpal-hierarchy`,
//! `openpenpal-letters`, and `openpenpal-scheduler` for the operations that
//! act on these shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::courier::{AssignmentType, CourierLevel, CourierStatus, UserRole, ZoneType};
use crate::ids::{AssignmentHistoryId, CourierId, LetterId, ScanRecordId, TaskId, UserId};
use crate::letter::{
    BarcodeStatus, LetterStatus, LetterVisibility, ScanAction, ScanValidationResult, TaskPriority,
    TaskStatus,
};
use crate::op_code::OpCode;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub role: UserRole,
    pub deactivated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: CourierId,
    pub user_id: UserId,
    pub level: CourierLevel,
    pub zone_type: ZoneType,
    pub zone_code: String,
    pub managed_op_code_prefix: String,
    pub parent_id: Option<CourierId>,
    pub status: CourierStatus,
    pub rating: f64,
    pub points: i64,
    pub created_by_id: UserId,
    /// Free-text self-description used by `experienceScore` in the scoring
    /// function; length is the only signal it reads.
    pub bio: Option<String>,
}

impl Courier {
    /// A courier accepts tasks only when approved and rated at least 3.0.
    pub fn can_accept_tasks(&self) -> bool {
        self.status == CourierStatus::Approved && self.rating >= 3.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Letter {
    pub id: LetterId,
    pub author_id: UserId,
    pub title: String,
    pub content: String,
    pub visibility: LetterVisibility,
    pub status: LetterStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub recipient_op_code: Option<OpCode>,
    pub style: Option<String>,
    pub reply_to: Option<LetterId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Letter {
    /// A letter with `scheduled_at` in the future is not visible to a
    /// recipient and not routable until released.
    pub fn is_future(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.map(|at| at > now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Barcode {
    pub code: String,
    pub batch_id: Uuid,
    pub letter_id: Option<LetterId>,
    pub status: BarcodeStatus,
    pub recipient_op_code: Option<OpCode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub letter_id: LetterId,
    pub pickup_op_code: OpCode,
    pub delivery_op_code: OpCode,
    pub assigned_courier_id: Option<CourierId>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub reward_points: i64,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentHistoryRecord {
    pub id: AssignmentHistoryId,
    pub task_id: TaskId,
    pub assigned_courier_id: CourierId,
    pub assigned_by_id: UserId,
    pub assignment_type: AssignmentType,
    pub previous_courier_id: Option<CourierId>,
    pub reassignment_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: ScanRecordId,
    /// `None` for validation failures so early (e.g. unknown barcode) that
    /// no task or letter could be resolved.
    pub task_id: Option<TaskId>,
    pub courier_id: CourierId,
    pub letter_id: Option<LetterId>,
    pub action: ScanAction,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub barcode_code: String,
    pub operator_op_code: OpCode,
    pub recipient_op_code: OpCode,
    pub scanner_level: CourierLevel,
    pub validation_result: ScanValidationResult,
    pub timestamp: DateTime<Utc>,
}
