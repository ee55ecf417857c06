//! Text encodings for the wire enums defined in `openpenpal-types`. Kept
//! separate from serde so a row's `status` column reads the same string a
//! client would see over the API, independent of any future JSON framing
//! change.

use openpenpal_types::{
    AssignmentType, BarcodeStatus, CourierStatus, ExecutionOutcome, LetterStatus,
    LetterVisibility, ScanAction, ScanValidationResult, ScheduledTaskStatus, TaskPriority,
    TaskStatus, UserRole, ZoneType,
};

pub fn zone_type_to_db(v: ZoneType) -> &'static str {
    match v {
        ZoneType::Building => "building",
        ZoneType::Area => "area",
        ZoneType::School => "school",
        ZoneType::City => "city",
    }
}

pub fn zone_type_from_db(s: &str) -> Option<ZoneType> {
    Some(match s {
        "building" => ZoneType::Building,
        "area" => ZoneType::Area,
        "school" => ZoneType::School,
        "city" => ZoneType::City,
        _ => return None,
    })
}

pub fn courier_status_to_db(v: CourierStatus) -> &'static str {
    match v {
        CourierStatus::Pending => "pending",
        CourierStatus::Approved => "approved",
        CourierStatus::Suspended => "suspended",
        CourierStatus::Rejected => "rejected",
    }
}

pub fn courier_status_from_db(s: &str) -> Option<CourierStatus> {
    Some(match s {
        "pending" => CourierStatus::Pending,
        "approved" => CourierStatus::Approved,
        "suspended" => CourierStatus::Suspended,
        "rejected" => CourierStatus::Rejected,
        _ => return None,
    })
}

pub fn assignment_type_to_db(v: AssignmentType) -> &'static str {
    match v {
        AssignmentType::Direct => "direct",
        AssignmentType::Cascade => "cascade",
        AssignmentType::AutoHierarchy => "auto_hierarchy",
        AssignmentType::Reassignment => "reassignment",
    }
}

pub fn assignment_type_from_db(s: &str) -> Option<AssignmentType> {
    Some(match s {
        "direct" => AssignmentType::Direct,
        "cascade" => AssignmentType::Cascade,
        "auto_hierarchy" => AssignmentType::AutoHierarchy,
        "reassignment" => AssignmentType::Reassignment,
        _ => return None,
    })
}

pub fn task_status_to_db(v: TaskStatus) -> &'static str {
    match v {
        TaskStatus::Available => "AVAILABLE",
        TaskStatus::Accepted => "ACCEPTED",
        TaskStatus::Collected => "COLLECTED",
        TaskStatus::InTransit => "IN_TRANSIT",
        TaskStatus::Delivered => "DELIVERED",
        TaskStatus::Failed => "FAILED",
        TaskStatus::Canceled => "CANCELED",
    }
}

pub fn task_status_from_db(s: &str) -> Option<TaskStatus> {
    Some(match s {
        "AVAILABLE" => TaskStatus::Available,
        "ACCEPTED" => TaskStatus::Accepted,
        "COLLECTED" => TaskStatus::Collected,
        "IN_TRANSIT" => TaskStatus::InTransit,
        "DELIVERED" => TaskStatus::Delivered,
        "FAILED" => TaskStatus::Failed,
        "CANCELED" => TaskStatus::Canceled,
        _ => return None,
    })
}

pub fn task_priority_to_db(v: TaskPriority) -> &'static str {
    match v {
        TaskPriority::Normal => "normal",
        TaskPriority::Urgent => "urgent",
        TaskPriority::Express => "express",
    }
}

pub fn task_priority_from_db(s: &str) -> Option<TaskPriority> {
    Some(match s {
        "normal" => TaskPriority::Normal,
        "urgent" => TaskPriority::Urgent,
        "express" => TaskPriority::Express,
        _ => return None,
    })
}

pub fn letter_status_to_db(v: LetterStatus) -> &'static str {
    match v {
        LetterStatus::Draft => "draft",
        LetterStatus::Generated => "generated",
        LetterStatus::Collected => "collected",
        LetterStatus::InTransit => "in_transit",
        LetterStatus::Delivered => "delivered",
        LetterStatus::Read => "read",
        LetterStatus::Failed => "failed",
        LetterStatus::Canceled => "canceled",
    }
}

pub fn letter_status_from_db(s: &str) -> Option<LetterStatus> {
    Some(match s {
        "draft" => LetterStatus::Draft,
        "generated" => LetterStatus::Generated,
        "collected" => LetterStatus::Collected,
        "in_transit" => LetterStatus::InTransit,
        "delivered" => LetterStatus::Delivered,
        "read" => LetterStatus::Read,
        "failed" => LetterStatus::Failed,
        "canceled" => LetterStatus::Canceled,
        _ => return None,
    })
}

pub fn letter_visibility_to_db(v: LetterVisibility) -> &'static str {
    match v {
        LetterVisibility::Public => "public",
        LetterVisibility::School => "school",
        LetterVisibility::Private => "private",
    }
}

pub fn letter_visibility_from_db(s: &str) -> Option<LetterVisibility> {
    Some(match s {
        "public" => LetterVisibility::Public,
        "school" => LetterVisibility::School,
        "private" => LetterVisibility::Private,
        _ => return None,
    })
}

pub fn barcode_status_to_db(v: BarcodeStatus) -> &'static str {
    match v {
        BarcodeStatus::Unactivated => "UNACTIVATED",
        BarcodeStatus::Bound => "BOUND",
        BarcodeStatus::InTransit => "IN_TRANSIT",
        BarcodeStatus::Delivered => "DELIVERED",
        BarcodeStatus::Expired => "EXPIRED",
    }
}

pub fn barcode_status_from_db(s: &str) -> Option<BarcodeStatus> {
    Some(match s {
        "UNACTIVATED" => BarcodeStatus::Unactivated,
        "BOUND" => BarcodeStatus::Bound,
        "IN_TRANSIT" => BarcodeStatus::InTransit,
        "DELIVERED" => BarcodeStatus::Delivered,
        "EXPIRED" => BarcodeStatus::Expired,
        _ => return None,
    })
}

pub fn scan_action_to_db(v: ScanAction) -> &'static str {
    match v {
        ScanAction::Collected => "collected",
        ScanAction::InTransit => "in_transit",
        ScanAction::Delivered => "delivered",
        ScanAction::Failed => "failed",
    }
}

pub fn scan_action_from_db(s: &str) -> Option<ScanAction> {
    Some(match s {
        "collected" => ScanAction::Collected,
        "in_transit" => ScanAction::InTransit,
        "delivered" => ScanAction::Delivered,
        "failed" => ScanAction::Failed,
        _ => return None,
    })
}

pub fn scan_validation_result_to_db(v: ScanValidationResult) -> &'static str {
    match v {
        ScanValidationResult::Success => "success",
        ScanValidationResult::Failed => "failed",
    }
}

pub fn scan_validation_result_from_db(s: &str) -> Option<ScanValidationResult> {
    Some(match s {
        "success" => ScanValidationResult::Success,
        "failed" => ScanValidationResult::Failed,
        _ => return None,
    })
}

pub fn scheduled_task_status_to_db(v: ScheduledTaskStatus) -> &'static str {
    match v {
        ScheduledTaskStatus::Active => "active",
        ScheduledTaskStatus::Canceled => "canceled",
        ScheduledTaskStatus::Failed => "failed",
    }
}

pub fn scheduled_task_status_from_db(s: &str) -> Option<ScheduledTaskStatus> {
    Some(match s {
        "active" => ScheduledTaskStatus::Active,
        "canceled" => ScheduledTaskStatus::Canceled,
        "failed" => ScheduledTaskStatus::Failed,
        _ => return None,
    })
}

pub fn execution_outcome_to_db(v: ExecutionOutcome) -> &'static str {
    match v {
        ExecutionOutcome::Success => "success",
        ExecutionOutcome::Failure => "failure",
        ExecutionOutcome::Skipped => "skipped",
        ExecutionOutcome::Timeout => "timeout",
    }
}

pub fn execution_outcome_from_db(s: &str) -> Option<ExecutionOutcome> {
    Some(match s {
        "success" => ExecutionOutcome::Success,
        "failure" => ExecutionOutcome::Failure,
        "skipped" => ExecutionOutcome::Skipped,
        "timeout" => ExecutionOutcome::Timeout,
        _ => return None,
    })
}

pub fn user_role_to_db(v: UserRole) -> &'static str {
    match v {
        UserRole::User => "user",
        UserRole::CourierL1 => "courier_l1",
        UserRole::CourierL2 => "courier_l2",
        UserRole::CourierL3 => "courier_l3",
        UserRole::CourierL4 => "courier_l4",
        UserRole::SchoolAdmin => "school_admin",
        UserRole::PlatformAdmin => "platform_admin",
        UserRole::SuperAdmin => "super_admin",
    }
}

pub fn user_role_from_db(s: &str) -> Option<UserRole> {
    Some(match s {
        "user" => UserRole::User,
        "courier_l1" => UserRole::CourierL1,
        "courier_l2" => UserRole::CourierL2,
        "courier_l3" => UserRole::CourierL3,
        "courier_l4" => UserRole::CourierL4,
        "school_admin" => UserRole::SchoolAdmin,
        "platform_admin" => UserRole::PlatformAdmin,
        "super_admin" => UserRole::SuperAdmin,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_round_trips_through_its_db_text() {
        for status in [
            TaskStatus::Available,
            TaskStatus::Accepted,
            TaskStatus::Collected,
            TaskStatus::InTransit,
            TaskStatus::Delivered,
            TaskStatus::Failed,
            TaskStatus::Canceled,
        ] {
            let encoded = task_status_to_db(status);
            assert_eq!(task_status_from_db(encoded), Some(status));
        }
    }

    #[test]
    fn letter_status_round_trips_through_its_db_text() {
        for status in [
            LetterStatus::Draft,
            LetterStatus::Generated,
            LetterStatus::Collected,
            LetterStatus::InTransit,
            LetterStatus::Delivered,
            LetterStatus::Read,
            LetterStatus::Failed,
            LetterStatus::Canceled,
        ] {
            let encoded = letter_status_to_db(status);
            assert_eq!(letter_status_from_db(encoded), Some(status));
        }
    }

    #[test]
    fn unknown_db_text_is_rejected() {
        assert_eq!(courier_status_from_db("not-a-status"), None);
        assert_eq!(zone_type_from_db("not-a-zone"), None);
    }
}
