use async_trait::async_trait;
use openpenpal_types::{Barcode, Letter, LetterId, ScanRecord, Task, TaskId};

use crate::error::LetterError;

#[async_trait]
pub trait LetterRepository: Send + Sync {
    async fn get(&self, id: LetterId) -> Result<Letter, LetterError>;
    async fn save(&self, letter: &Letter) -> Result<(), LetterError>;
    async fn due_for_promotion(&self, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<Letter>, LetterError>;
}

#[async_trait]
pub trait BarcodeRepository: Send + Sync {
    async fn get(&self, code: &str) -> Result<Barcode, LetterError>;
    async fn save(&self, barcode: &Barcode) -> Result<(), LetterError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, id: TaskId) -> Result<Task, LetterError>;
    async fn save(&self, task: &Task) -> Result<(), LetterError>;
}

#[async_trait]
pub trait ScanRecordRepository: Send + Sync {
    async fn append(&self, record: ScanRecord) -> Result<(), LetterError>;
}
