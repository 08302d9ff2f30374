use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Stable error codes for PlantOps services.
///
/// API clients read `code` from the JSON body; log pipelines and operator
/// dashboards filter on the `code` field of tracing events. The scan codes
/// never reach a scanner: the `/q` route answers with a uniform page and
/// only the logs carry the code.
pub mod error_code {
    // API responses
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const INTERNAL: &str = "INTERNAL";

    // Scan resolution (logs only)
    /// Failed the token format check. Answered exactly like `NOT_FOUND`.
    pub const MALFORMED_INPUT: &str = "MALFORMED_INPUT";
    /// REVOKED or EXPIRED token. A defined outcome, not a failure.
    pub const TERMINAL_TOKEN: &str = "TERMINAL_TOKEN";
    pub const RESOLUTION_INCONSISTENCY: &str = "RESOLUTION_INCONSISTENCY";
    pub const AUDIT_WRITE_FAILURE: &str = "AUDIT_WRITE_FAILURE";
}

/// Error returned by service operations and JSON endpoints.
///
/// Renders as `{"code": ..., "message": ...}` with the matching HTTP status.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    /// Unique key taken, or a state change that lost a compare-and-swap race.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    /// No credentials, or credentials that do not verify.
    #[error("{0}")]
    Unauthorized(String),

    /// Verified caller without the required permission.
    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Storage(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'static str,
    message: &'a str,
}

impl ServiceError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, error_code::NOT_FOUND),
            Self::Conflict(_) => (StatusCode::CONFLICT, error_code::ALREADY_EXISTS),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, error_code::VALIDATION_FAILED),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, error_code::UNAUTHENTICATED),
            Self::PermissionDenied(_) => (StatusCode::FORBIDDEN, error_code::PERMISSION_DENIED),
            Self::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, error_code::STORAGE_ERROR),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, error_code::INTERNAL),
        }
    }

    pub fn error_code(&self) -> &'static str {
        self.parts().1
    }

    pub fn status_code(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = self.to_string();
        let body = ErrorBody {
            code,
            message: &message,
        };
        (status, axum::Json(body)).into_response()
    }
}
