use openpenpal_errors::DomainError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LetterError {
    #[error("letter not found")]
    LetterNotFound,
    #[error("barcode not found or expired")]
    BarcodeNotFound,
    #[error("barcode is already bound to another letter")]
    BarcodeAlreadyBound,
    #[error("task not found")]
    TaskNotFound,
    #[error("illegal status transition")]
    IllegalTransition,
    #[error("OP Code is malformed: {0}")]
    BadOpCode(String),
    #[error("scanner lacks permission over the target OP Code")]
    OutOfScope,
    #[error("recipient OP Code on the scan does not match the letter")]
    RecipientMismatch,
    #[error("scanner level is below the minimum required for this action")]
    InsufficientScannerLevel,
    #[error("reply must reference an existing letter")]
    InvalidReplyTarget,
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<LetterError> for DomainError {
    fn from(err: LetterError) -> Self {
        match err {
            LetterError::LetterNotFound | LetterError::TaskNotFound => DomainError::NotFound,
            LetterError::BarcodeNotFound => DomainError::BadBarcode("not found or expired".to_string()),
            LetterError::BarcodeAlreadyBound => DomainError::BadBarcode("already bound".to_string()),
            LetterError::IllegalTransition => DomainError::IllegalTransition,
            LetterError::BadOpCode(detail) => DomainError::BadOpCode(detail),
            LetterError::OutOfScope => DomainError::OpCodeOutOfScope,
            LetterError::RecipientMismatch => DomainError::IllegalTransition,
            LetterError::InsufficientScannerLevel => DomainError::UnauthorizedHierarchy,
            LetterError::InvalidReplyTarget => DomainError::NotFound,
            LetterError::Storage(msg) => DomainError::Internal(msg),
        }
    }
}
