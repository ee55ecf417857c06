//! Letter lifecycle, barcode binding, and the scan validation state machine
//!. Depends on `openpenpal-hierarchy` only for its permission checks;
//! storage is a port, same as the hierarchy crate.

pub mod error;
pub mod promotion;
pub mod reply;
pub mod repository;
pub mod scan;
pub mod state_machine;

pub use error::LetterError;
pub use promotion::{promote_due_letters, PromotionReport};
pub use reply::{compose_reply, ReplyDraft};
pub use repository::{BarcodeRepository, LetterRepository, ScanRecordRepository, TaskStore};
pub use scan::{ScanOutcome, ScanProcessor, ScanRequest};
