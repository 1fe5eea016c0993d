//! Error taxonomy shared by every transport.
//!
//! Each variant carries a stable `kind` string so transport adapters can
//! render `{error: {kind, message}}` without knowing which component failed.

use thiserror::Error;

/// Errors produced by the memory engine and command dispatcher.
#[derive(Debug, Error)]
pub enum EngramError {
    /// Malformed or out-of-range arguments (empty content, alpha outside
    /// [0,1], negative hop count). Raised before any mutation happens.
    #[error("{0}")]
    Validation(String),

    /// A referenced memory or edge endpoint does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The dispatcher received an operation name it does not know.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The embedding provider or the vector store is unavailable or failed.
    /// Never retried here — the current operation aborts entirely.
    #[error("{0}")]
    Dependency(String),
}

impl EngramError {
    /// Stable machine-readable kind for client-facing error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::UnsupportedOperation(_) => "unsupported_operation",
            Self::Dependency(_) => "dependency_error",
        }
    }

    /// Render as a JSON error payload for transports.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}

impl From<rusqlite::Error> for EngramError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Dependency(format!("vector store error: {e}"))
    }
}

impl From<serde_json::Error> for EngramError {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation(format!("invalid arguments: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, EngramError>;
