use thiserror::Error;

use plantops_core::ServiceError;

pub use plantops_core::error::error_code;

/// Failure of a scan resolution.
#[derive(Error, Debug)]
pub enum QrError {
    /// Unknown token, or a string that failed the format check.
    #[error("token not found")]
    NotFound,

    /// The precedence engine produced no destination. A defect.
    #[error("resolution produced no destination for token {0}")]
    ResolutionInconsistency(String),

    /// The audit entry and scan-count update could not be committed.
    #[error("audit write failed: {0}")]
    AuditWriteFailure(String),

    /// Storage or collaborator failure before the audit stage.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl QrError {
    pub fn error_code(&self) -> &'static str {
        match self {
            QrError::NotFound => error_code::NOT_FOUND,
            QrError::ResolutionInconsistency(_) => error_code::RESOLUTION_INCONSISTENCY,
            QrError::AuditWriteFailure(_) => error_code::AUDIT_WRITE_FAILURE,
            QrError::Service(_) => error_code::INTERNAL,
        }
    }
}
