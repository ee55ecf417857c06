//! Pure status transition tables for letters, tasks, and barcodes.
//! No I/O here; callers own persistence and locking.

use openpenpal_types::{BarcodeStatus, LetterStatus, ScanAction, TaskStatus};

/// `DRAFT|GENERATED ──author cancels──▶ CANCELED`, and the forward path
/// `DRAFT ──submit──▶ GENERATED`. All other letter transitions are driven
/// by `scan_action` advancing the paired task.
pub fn can_submit(current: LetterStatus) -> bool {
    current == LetterStatus::Draft
}

pub fn can_cancel(current: LetterStatus) -> bool {
    matches!(current, LetterStatus::Draft | LetterStatus::Generated)
}

pub fn can_mark_read(current: LetterStatus) -> bool {
    current == LetterStatus::Delivered
}

/// The letter status a scan action drives the paired letter to, mirroring
/// the task status change. Returns `None` if the action carries no letter
/// side effect (there are none today, but the scan table is intentionally
/// open to that possibility).
pub fn letter_status_for_scan(action: ScanAction) -> LetterStatus {
    match action {
        ScanAction::Collected => LetterStatus::Collected,
        ScanAction::InTransit => LetterStatus::InTransit,
        ScanAction::Delivered => LetterStatus::Delivered,
        ScanAction::Failed => LetterStatus::Failed,
    }
}

/// Task status mirrors the scan action directly.
pub fn task_status_for_scan(action: ScanAction) -> TaskStatus {
    match action {
        ScanAction::Collected => TaskStatus::Collected,
        ScanAction::InTransit => TaskStatus::InTransit,
        ScanAction::Delivered => TaskStatus::Delivered,
        ScanAction::Failed => TaskStatus::Failed,
    }
}

/// The action-to-target-status legality table, keyed off the task's
/// current status (the task is the thing a courier is actually scanning
/// against; the letter follows).
pub fn is_scan_action_legal(current_task_status: TaskStatus, action: ScanAction) -> bool {
    match (current_task_status, action) {
        (TaskStatus::Accepted, ScanAction::Collected) => true,
        (TaskStatus::Collected, ScanAction::InTransit) => true,
        (TaskStatus::InTransit, ScanAction::Delivered) => true,
        (_, ScanAction::Failed) => current_task_status.is_active(),
        _ => false,
    }
}

pub fn barcode_status_for_scan(action: ScanAction) -> BarcodeStatus {
    match action {
        ScanAction::Collected => BarcodeStatus::Bound,
        ScanAction::InTransit => BarcodeStatus::InTransit,
        ScanAction::Delivered => BarcodeStatus::Delivered,
        ScanAction::Failed => BarcodeStatus::Expired,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_can_submit_and_cancel() {
        assert!(can_submit(LetterStatus::Draft));
        assert!(can_cancel(LetterStatus::Draft));
        assert!(can_cancel(LetterStatus::Generated));
        assert!(!can_cancel(LetterStatus::Collected));
    }

    #[test]
    fn scan_action_table_matches_spec_order() {
        assert!(is_scan_action_legal(TaskStatus::Accepted, ScanAction::Collected));
        assert!(is_scan_action_legal(TaskStatus::Collected, ScanAction::InTransit));
        assert!(is_scan_action_legal(TaskStatus::InTransit, ScanAction::Delivered));
        assert!(!is_scan_action_legal(TaskStatus::Accepted, ScanAction::Delivered));
        assert!(!is_scan_action_legal(TaskStatus::Available, ScanAction::Collected));
    }

    #[test]
    fn failed_is_legal_from_any_active_status() {
        assert!(is_scan_action_legal(TaskStatus::Accepted, ScanAction::Failed));
        assert!(is_scan_action_legal(TaskStatus::Collected, ScanAction::Failed));
        assert!(is_scan_action_legal(TaskStatus::InTransit, ScanAction::Failed));
        assert!(!is_scan_action_legal(TaskStatus::Delivered, ScanAction::Failed));
        assert!(!is_scan_action_legal(TaskStatus::Available, ScanAction::Failed));
    }
}
