//! # Audit Error Types
//!
//! Errors stay inside this crate's background machinery. Callers of
//! [`crate::AuditSink::record`] never see them; the dispatcher logs them and
//! retries.

use thiserror::Error;

use cinder_db::DbError;

/// Result type alias for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

#[derive(Debug, Error)]
pub enum AuditError {
    /// The transport rejected or could not reach its destination.
    #[error("Audit transport '{transport}' failed: {message}")]
    Transport { transport: String, message: String },

    /// The local durable buffer could not be read or written.
    #[error("Audit buffer error: {0}")]
    Buffer(#[from] DbError),

    #[error("Audit serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The dispatcher is no longer running.
    #[error("Audit dispatcher stopped")]
    DispatcherStopped,
}

impl AuditError {
    pub fn transport(transport: impl Into<String>, message: impl Into<String>) -> Self {
        AuditError::Transport {
            transport: transport.into(),
            message: message.into(),
        }
    }
}
