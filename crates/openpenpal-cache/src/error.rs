use openpenpal_errors::DomainError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<CacheError> for DomainError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Backend(msg) => DomainError::Internal(msg),
        }
    }
}
