use openpenpal_errors::DomainError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("no healthy backend instance is available for {0}")]
    NoHealthyInstance(String),
    #[error("upstream call timed out")]
    UpstreamTimeout,
    #[error("retries exhausted without a successful response")]
    RetriesExhausted,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("CSRF token missing or mismatched")]
    CsrfMismatch,
    #[error("unknown load balancing algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<GatewayError> for DomainError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NoHealthyInstance(_) => DomainError::ServiceUnavailable,
            GatewayError::UpstreamTimeout => DomainError::UpstreamTimeout,
            GatewayError::RetriesExhausted => DomainError::RetriesExhausted,
            GatewayError::RateLimited => DomainError::RateLimited,
            GatewayError::CsrfMismatch => DomainError::CsrfMismatch,
            GatewayError::UnknownAlgorithm(name) => DomainError::Internal(name),
            GatewayError::Transport(msg) => DomainError::Internal(msg),
        }
    }
}
