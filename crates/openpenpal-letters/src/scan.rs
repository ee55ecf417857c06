//! Scan validation and the atomic letter+task+barcode advance it drives
//!. Validation always runs before any state mutation; a failed
//! validation still appends a scan record with `validation_result=failed`.

use chrono::Utc;
use openpenpal_hierarchy::can_manage_op_code;
use openpenpal_types::{
    Barcode, BarcodeStatus, Courier, Letter, LetterId, OpCode, ScanAction, ScanRecord, ScanRecordId,
    ScanValidationResult, Task, TaskId,
};

use crate::error::LetterError;
use crate::repository::{BarcodeRepository, LetterRepository, ScanRecordRepository, TaskStore};
use crate::state_machine::{
    barcode_status_for_scan, is_scan_action_legal, letter_status_for_scan, task_status_for_scan,
};

/// Raw input captured by the scanning device or app, before validation.
pub struct ScanRequest {
    pub barcode_code: String,
    pub task_id: TaskId,
    pub scanner: Courier,
    pub action: ScanAction,
    pub operator_op_code: OpCode,
    pub recipient_op_code: OpCode,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Minimum scanner level for the action, escalating with the
/// geographic span of the hop it is validating.
fn min_scanner_level(action: ScanAction, cross_area: bool, cross_school: bool) -> u8 {
    match action {
        ScanAction::Delivered => 1,
        _ if cross_school => 3,
        _ if cross_area => 2,
        _ => 1,
    }
}

#[derive(Debug)]
pub struct ScanOutcome {
    pub letter: Letter,
    pub task: Task,
    pub barcode: Barcode,
    pub record: ScanRecord,
}

pub struct ScanProcessor<'a> {
    letters: &'a dyn LetterRepository,
    barcodes: &'a dyn BarcodeRepository,
    tasks: &'a dyn TaskStore,
    scans: &'a dyn ScanRecordRepository,
}

/// What was resolved before a validation step failed, carried into the
/// failed scan record so the audit trail is as complete as possible.
#[derive(Default)]
struct PartialResolution {
    task_id: Option<TaskId>,
    letter_id: Option<LetterId>,
}

impl<'a> ScanProcessor<'a> {
    pub fn new(
        letters: &'a dyn LetterRepository,
        barcodes: &'a dyn BarcodeRepository,
        tasks: &'a dyn TaskStore,
        scans: &'a dyn ScanRecordRepository,
    ) -> Self {
        Self { letters, barcodes, tasks, scans }
    }

    /// Runs the validation checks; on success, advances barcode, task,
    /// and letter status together and appends a successful scan record. On
    /// any failure, appends a failed scan record instead and leaves every
    /// other piece of state untouched.
    pub async fn process(&self, req: ScanRequest) -> Result<ScanOutcome, LetterError> {
        match self.validate_and_apply(&req).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let resolution = PartialResolution {
                    task_id: Some(req.task_id),
                    letter_id: None,
                };
                self.append_record(&req, ScanValidationResult::Failed, resolution).await?;
                Err(err)
            }
        }
    }

    async fn validate_and_apply(&self, req: &ScanRequest) -> Result<ScanOutcome, LetterError> {
        // 1. Barcode exists and is not expired.
        let barcode = self.barcodes.get(&req.barcode_code).await?;
        if barcode.status == BarcodeStatus::Expired {
            return Err(LetterError::BarcodeNotFound);
        }

        let letter_id = barcode.letter_id.ok_or(LetterError::BarcodeNotFound)?;
        let letter = self.letters.get(letter_id).await?;
        let mut task = self.tasks.get(req.task_id).await?;
        if task.letter_id != letter_id {
            return Err(LetterError::TaskNotFound);
        }

        // 2. Scanner permission must cover the operator OP Code.
        if !can_manage_op_code(&req.scanner, &req.operator_op_code) {
            return Err(LetterError::OutOfScope);
        }

        // 3. Recipient OP Code match for `delivered`; managed-prefix check
        // for collected/in_transit is covered by check 2.
        if req.action == ScanAction::Delivered {
            let recipient = letter.recipient_op_code.ok_or(LetterError::RecipientMismatch)?;
            if recipient != req.recipient_op_code {
                return Err(LetterError::RecipientMismatch);
            }
        }

        // 4. Action legal for the task's current status.
        if !is_scan_action_legal(task.status, req.action) {
            return Err(LetterError::IllegalTransition);
        }

        // 5. Scanner level floor, escalating for cross-area/cross-school hops.
        let cross_area = !task.pickup_op_code.same_area(&task.delivery_op_code);
        let cross_school = !task.pickup_op_code.same_school(&task.delivery_op_code);
        let required_level = min_scanner_level(req.action, cross_area, cross_school);
        if req.scanner.level.value() < required_level {
            return Err(LetterError::InsufficientScannerLevel);
        }

        let mut letter = letter;
        let mut barcode = barcode;

        task.status = task_status_for_scan(req.action);
        letter.status = letter_status_for_scan(req.action);
        letter.updated_at = Utc::now();
        barcode.status = barcode_status_for_scan(req.action);

        if req.action == ScanAction::Delivered {
            task.completed_at = Some(Utc::now());
        }

        self.tasks.save(&task).await?;
        self.letters.save(&letter).await?;
        self.barcodes.save(&barcode).await?;

        let resolution = PartialResolution {
            task_id: Some(task.id),
            letter_id: Some(letter.id),
        };
        let record = self
            .append_record(req, ScanValidationResult::Success, resolution)
            .await?;

        Ok(ScanOutcome { letter, task, barcode, record })
    }

    async fn append_record(
        &self,
        req: &ScanRequest,
        result: ScanValidationResult,
        resolution: PartialResolution,
    ) -> Result<ScanRecord, LetterError> {
        let record = ScanRecord {
            id: ScanRecordId::new(),
            task_id: resolution.task_id,
            courier_id: req.scanner.id,
            letter_id: resolution.letter_id,
            action: req.action,
            location: req.location.clone(),
            lat: req.lat,
            lng: req.lng,
            barcode_code: req.barcode_code.clone(),
            operator_op_code: req.operator_op_code,
            recipient_op_code: req.recipient_op_code,
            scanner_level: req.scanner.level,
            validation_result: result,
            timestamp: Utc::now(),
        };
        self.scans.append(record.clone()).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use openpenpal_types::{
        CourierId, CourierLevel, CourierStatus, LetterStatus, LetterVisibility, TaskPriority, TaskStatus,
        UserId,
    };
    use std::sync::Mutex;
    use uuid::Uuid;

    struct MemLetters(Mutex<Vec<Letter>>);
    #[async_trait]
    impl LetterRepository for MemLetters {
        async fn get(&self, id: LetterId) -> Result<Letter, LetterError> {
            self.0.lock().unwrap().iter().find(|l| l.id == id).cloned().ok_or(LetterError::LetterNotFound)
        }
        async fn save(&self, letter: &Letter) -> Result<(), LetterError> {
            let mut g = self.0.lock().unwrap();
            if let Some(slot) = g.iter_mut().find(|l| l.id == letter.id) {
                *slot = letter.clone();
            }
            Ok(())
        }
        async fn due_for_promotion(&self, _now: chrono::DateTime<chrono::Utc>) -> Result<Vec<Letter>, LetterError> {
            Ok(vec![])
        }
    }

    struct MemBarcodes(Mutex<Vec<Barcode>>);
    #[async_trait]
    impl BarcodeRepository for MemBarcodes {
        async fn get(&self, code: &str) -> Result<Barcode, LetterError> {
            self.0.lock().unwrap().iter().find(|b| b.code == code).cloned().ok_or(LetterError::BarcodeNotFound)
        }
        async fn save(&self, barcode: &Barcode) -> Result<(), LetterError> {
            let mut g = self.0.lock().unwrap();
            if let Some(slot) = g.iter_mut().find(|b| b.code == barcode.code) {
                *slot = barcode.clone();
            }
            Ok(())
        }
    }

    struct MemTasks(Mutex<Vec<Task>>);
    #[async_trait]
    impl TaskStore for MemTasks {
        async fn get(&self, id: TaskId) -> Result<Task, LetterError> {
            self.0.lock().unwrap().iter().find(|t| t.id == id).cloned().ok_or(LetterError::TaskNotFound)
        }
        async fn save(&self, task: &Task) -> Result<(), LetterError> {
            let mut g = self.0.lock().unwrap();
            if let Some(slot) = g.iter_mut().find(|t| t.id == task.id) {
                *slot = task.clone();
            }
            Ok(())
        }
    }

    struct MemScans(Mutex<Vec<ScanRecord>>);
    #[async_trait]
    impl ScanRecordRepository for MemScans {
        async fn append(&self, record: ScanRecord) -> Result<(), LetterError> {
            self.0.lock().unwrap().push(record);
            Ok(())
        }
    }

    fn scanner(level: u8, prefix: &str) -> Courier {
        let level = CourierLevel::new(level).unwrap();
        Courier {
            id: CourierId::new(),
            user_id: UserId::new(),
            level,
            zone_type: level.zone_type(),
            zone_code: prefix.to_string(),
            managed_op_code_prefix: prefix.to_string(),
            parent_id: None,
            status: CourierStatus::Approved,
            rating: 4.5,
            points: 0,
            created_by_id: UserId::new(),
            bio: None,
        }
    }

    fn fixture() -> (Letter, Task, Barcode) {
        let letter_id = LetterId::new();
        let task_id = TaskId::new();
        let recipient = OpCode::parse("PK5F3D").unwrap();
        let letter = Letter {
            id: letter_id,
            author_id: UserId::new(),
            title: "hi".to_string(),
            content: "hello".to_string(),
            visibility: LetterVisibility::Private,
            status: LetterStatus::Generated,
            scheduled_at: None,
            recipient_op_code: Some(recipient),
            style: None,
            reply_to: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let task = Task {
            id: task_id,
            letter_id,
            pickup_op_code: OpCode::parse("PK5F01").unwrap(),
            delivery_op_code: recipient,
            assigned_courier_id: None,
            status: TaskStatus::Accepted,
            priority: TaskPriority::Normal,
            reward_points: 5,
            created_at: Utc::now(),
            accepted_at: Some(Utc::now()),
            completed_at: None,
        };
        let barcode = Barcode {
            code: "BC000001".to_string(),
            batch_id: Uuid::new_v4(),
            letter_id: Some(letter_id),
            status: BarcodeStatus::Bound,
            recipient_op_code: Some(recipient),
        };
        (letter, task, barcode)
    }

    #[tokio::test]
    async fn successful_collected_scan_advances_task_and_letter() {
        let (letter, task, barcode) = fixture();
        let task_id = task.id;
        let letters = MemLetters(Mutex::new(vec![letter]));
        let barcodes = MemBarcodes(Mutex::new(vec![barcode]));
        let tasks = MemTasks(Mutex::new(vec![task]));
        let scans = MemScans(Mutex::new(vec![]));
        let processor = ScanProcessor::new(&letters, &barcodes, &tasks, &scans);

        let courier = scanner(1, "PK5F01");
        let req = ScanRequest {
            barcode_code: "BC000001".to_string(),
            task_id,
            scanner: courier,
            action: ScanAction::Collected,
            operator_op_code: OpCode::parse("PK5F01").unwrap(),
            recipient_op_code: OpCode::parse("PK5F3D").unwrap(),
            location: None,
            lat: None,
            lng: None,
        };

        let outcome = processor.process(req).await.unwrap();
        assert_eq!(outcome.task.status, TaskStatus::Collected);
        assert_eq!(outcome.letter.status, LetterStatus::Collected);
        assert_eq!(outcome.record.validation_result, ScanValidationResult::Success);
        assert_eq!(scans.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn illegal_action_for_current_status_is_rejected_and_recorded() {
        let (letter, task, barcode) = fixture();
        let task_id = task.id;
        let letters = MemLetters(Mutex::new(vec![letter]));
        let barcodes = MemBarcodes(Mutex::new(vec![barcode]));
        let tasks = MemTasks(Mutex::new(vec![task]));
        let scans = MemScans(Mutex::new(vec![]));
        let processor = ScanProcessor::new(&letters, &barcodes, &tasks, &scans);

        let courier = scanner(1, "PK5F01");
        let req = ScanRequest {
            barcode_code: "BC000001".to_string(),
            task_id,
            scanner: courier,
            action: ScanAction::Delivered,
            operator_op_code: OpCode::parse("PK5F01").unwrap(),
            recipient_op_code: OpCode::parse("PK5F3D").unwrap(),
            location: None,
            lat: None,
            lng: None,
        };

        let result = processor.process(req).await;
        assert_eq!(result.unwrap_err(), LetterError::IllegalTransition);
        let recorded = scans.0.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].validation_result, ScanValidationResult::Failed);
    }

    #[tokio::test]
    async fn recipient_mismatch_is_rejected() {
        let (letter, mut task, barcode) = fixture();
        task.status = TaskStatus::InTransit;
        let task_id = task.id;
        let letters = MemLetters(Mutex::new(vec![letter]));
        let barcodes = MemBarcodes(Mutex::new(vec![barcode]));
        let tasks = MemTasks(Mutex::new(vec![task]));
        let scans = MemScans(Mutex::new(vec![]));
        let processor = ScanProcessor::new(&letters, &barcodes, &tasks, &scans);

        let courier = scanner(1, "PK5F3D");
        let req = ScanRequest {
            barcode_code: "BC000001".to_string(),
            task_id,
            scanner: courier,
            action: ScanAction::Delivered,
            operator_op_code: OpCode::parse("PK5F3D").unwrap(),
            recipient_op_code: OpCode::parse("QH0099").unwrap(),
            location: None,
            lat: None,
            lng: None,
        };

        let result = processor.process(req).await;
        assert_eq!(result.unwrap_err(), LetterError::RecipientMismatch);
    }
}
