//! Letter, barcode, and task status vocabulary. The transition logic itself
//! lives in `openpenpal-letters`; this crate only defines the wire-visible
//! enums so every crate agrees on their shape and serde form.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LetterStatus {
    Draft,
    Generated,
    Collected,
    InTransit,
    Delivered,
    Read,
    Failed,
    Canceled,
}

impl LetterStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Read | Self::Failed | Self::Canceled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LetterVisibility {
    Public,
    School,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarcodeStatus {
    Unactivated,
    Bound,
    InTransit,
    Delivered,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Available,
    Accepted,
    Collected,
    InTransit,
    Delivered,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Accepted | Self::Collected | Self::InTransit)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Canceled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Normal,
    Urgent,
    Express,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanAction {
    Collected,
    InTransit,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanValidationResult {
    Success,
    Failed,
}
