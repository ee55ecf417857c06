//! Shared value types for the OpenPenPal operational core: OP Codes, courier
//! levels and zones, letter/barcode/task status vocabulary, and the HTTP
//! response envelope.

pub mod courier;
pub mod ids;
pub mod letter;
pub mod model;
pub mod op_code;
pub mod response;
pub mod scheduler;

pub use courier::{AssignmentType, CourierLevel, CourierStatus, InvalidCourierLevel, UserRole, ZoneType};
pub use ids::{
    AssignmentHistoryId, BarcodeBatchId, CourierId, LetterId, ScanRecordId, ScheduledTaskId,
    TaskExecutionId, TaskId, UserId,
};
pub use letter::{
    BarcodeStatus, LetterStatus, LetterVisibility, ScanAction, ScanValidationResult, TaskPriority,
    TaskStatus,
};
pub use model::{
    AssignmentHistoryRecord, Barcode, Courier, Letter, ScanRecord, Task, User,
};
pub use op_code::{OpCode, OpCodeError, OpCodePrefix, OpCodePrivacy};
pub use response::ApiResponse;
pub use scheduler::{ExecutionOutcome, ScheduleKind, ScheduledTask, ScheduledTaskStatus, TaskExecution};
