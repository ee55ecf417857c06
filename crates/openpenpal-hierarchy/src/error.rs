use openpenpal_errors::DomainError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("caller has no hierarchy authority over the target courier")]
    UnauthorizedHierarchy,
    #[error("target OP Code is outside the caller's managed scope")]
    OpCodeOutOfScope,
    #[error("no eligible courier was found")]
    NoEligibleCourier,
    #[error("task is not in a reassignable state")]
    TaskNotReassignable,
    #[error("reassignment reason must not be empty")]
    MissingReassignmentReason,
    #[error("courier not found")]
    CourierNotFound,
    #[error("task not found")]
    TaskNotFound,
    #[error("creating a subordinate requires an approved courier at level >= 2")]
    IneligibleCreator,
    #[error("transfer would create a cycle in the courier tree")]
    WouldCreateCycle,
    #[error("resource was concurrently modified")]
    ConcurrentModification,
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<HierarchyError> for DomainError {
    fn from(err: HierarchyError) -> Self {
        match err {
            HierarchyError::UnauthorizedHierarchy | HierarchyError::IneligibleCreator => {
                DomainError::UnauthorizedHierarchy
            }
            HierarchyError::OpCodeOutOfScope => DomainError::OpCodeOutOfScope,
            HierarchyError::NoEligibleCourier => DomainError::NoEligibleCourier,
            HierarchyError::TaskNotReassignable => DomainError::TaskNotReassignable,
            HierarchyError::MissingReassignmentReason => {
                DomainError::MissingField("reassignment_reason".to_string())
            }
            HierarchyError::CourierNotFound | HierarchyError::TaskNotFound => {
                DomainError::NotFound
            }
            HierarchyError::WouldCreateCycle => DomainError::UnauthorizedHierarchy,
            HierarchyError::ConcurrentModification => DomainError::ConcurrentModification,
            HierarchyError::Storage(msg) => DomainError::Internal(msg),
        }
    }
}
