//! Postgres repository adapters. Every type here implements a storage port
//! defined in `openpenpal-hierarchy`, `openpenpal-letters`, or
//! `openpenpal-scheduler`; those crates stay free of any database driver.

mod codec;
pub mod hierarchy;
pub mod letters;
pub mod pool;
pub mod scheduler;
pub mod users;

pub use hierarchy::{PgCourierRepository, PgOpCodeDirectory, PgTaskRepository};
pub use letters::{PgBarcodeRepository, PgLetterRepository, PgScanRecordRepository, PgTaskStore};
pub use pool::{connect, StoreConnectError};
pub use scheduler::{PgExecutionRepository, PgScheduledTaskRepository};
pub use users::{PgUserRepository, UserCredential};
