//! Response bodies.
//!
//! Successful runs answer with the function's own JSON value or with raw
//! file bytes, so the only structured bodies are the error body and the
//! health probe.

use serde::{Deserialize, Serialize};

use super::error::{ErrorKind, ScriptrunError};

/// JSON body sent with every non-2xx response.
///
/// # Example
///
/// ```
/// use scriptrun_common::{ErrorBody, ErrorKind, ScriptrunError};
///
/// let body = ErrorBody::from_error(&ScriptrunError::ScriptNotFound("nope".into()));
/// assert_eq!(body.kind, ErrorKind::ScriptNotFound);
/// assert_eq!(body.detail, "Script 'nope' not found");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    /// Human-readable message
    pub detail: String,
    /// Error category
    pub kind: ErrorKind,
}

impl ErrorBody {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        ErrorBody { detail: detail.into(), kind }
    }

    pub fn from_error(err: &ScriptrunError) -> Self {
        ErrorBody::new(err.kind(), err.to_string())
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn ok() -> Self {
        HealthStatus { status: "ok".to_string() }
    }
}
