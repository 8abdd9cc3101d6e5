//! # Audit Transports
//!
//! Where delivered audit entries go. The dispatcher hands each batch to one
//! transport and treats any error as "nothing in this batch was delivered".
//!
//! ```text
//! ┌──────────────────┐     deliver(&[AuditLogEntry])     ┌──────────────────┐
//! │ AuditDispatcher  │ ─────────────────────────────────►│ AuditTransport   │
//! │                  │ ◄──────────── Ok / Err ────────── │  LoggingTransport│
//! └──────────────────┘                                   │  NullTransport   │
//!                                                        │  (remote, ...)   │
//!                                                        └──────────────────┘
//! ```

use async_trait::async_trait;
use tracing::info;

use cinder_core::audit::AuditLogEntry;

use crate::error::AuditResult;

/// Destination for audit entries.
///
/// Implementations must be idempotent on `entry.id`: after an ambiguous
/// failure the same entries are delivered again.
#[async_trait]
pub trait AuditTransport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn deliver(&self, batch: &[AuditLogEntry]) -> AuditResult<()>;
}

/// Writes each entry to `tracing` under the `cinder::audit` target.
#[derive(Debug, Default, Clone)]
pub struct LoggingTransport;

#[async_trait]
impl AuditTransport for LoggingTransport {
    fn name(&self) -> &str {
        "logging"
    }

    async fn deliver(&self, batch: &[AuditLogEntry]) -> AuditResult<()> {
        for entry in batch {
            let details = serde_json::to_string(&entry.details)?;
            info!(
                target: "cinder::audit",
                id = %entry.id,
                occurred_at = %entry.occurred_at,
                actor = %entry.actor_id,
                action = %entry.action,
                entity_type = %entry.entity_type,
                entity_id = ?entry.entity_id,
                severity = entry.severity.as_str(),
                details = %details,
                "audit"
            );
        }
        Ok(())
    }
}

/// Accepts and discards everything. Entries remain in the local log.
#[derive(Debug, Default, Clone)]
pub struct NullTransport;

#[async_trait]
impl AuditTransport for NullTransport {
    fn name(&self) -> &str {
        "null"
    }

    async fn deliver(&self, _batch: &[AuditLogEntry]) -> AuditResult<()> {
        Ok(())
    }
}
