//! # Audit Sink
//!
//! The write side of auditing as seen by checkout and the compliance
//! services.
//!
//! ## Recording Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sink.record(entry).await                                              │
//! │       │                                                                 │
//! │       ├── append to audit_log ── ok ──► notify dispatcher              │
//! │       │                                                                 │
//! │       └── append failed ──► error! + push onto in-memory fallback      │
//! │                              queue; dispatcher retries the append      │
//! │                              on its next tick (flush_fallback)         │
//! │                                                                         │
//! │  record() returns () in every case. A sale is never blocked or         │
//! │  reversed by auditing.                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info};

use cinder_core::audit::AuditLogEntry;
use cinder_db::{AuditLogRepository, Database};

/// Cheap to clone; all clones share the buffer and the wake-up signal.
#[derive(Debug, Clone)]
pub struct AuditSink {
    repo: AuditLogRepository,
    fallback: Arc<Mutex<VecDeque<AuditLogEntry>>>,
    wake: Arc<Notify>,
}

impl AuditSink {
    pub fn new(db: &Database) -> Self {
        AuditSink {
            repo: db.audit_log(),
            fallback: Arc::new(Mutex::new(VecDeque::new())),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Durably records an entry. Never fails.
    pub async fn record(&self, entry: AuditLogEntry) {
        match self.repo.append(&entry).await {
            Ok(()) => {
                debug!(id = %entry.id, action = %entry.action, "Audit entry buffered");
                self.wake.notify_one();
            }
            Err(e) => {
                error!(
                    ?e,
                    id = %entry.id,
                    action = %entry.action,
                    severity = entry.severity.as_str(),
                    "Audit append failed; holding entry in memory"
                );
                self.fallback.lock().await.push_back(entry);
            }
        }
    }

    /// Retries appending entries held in memory, oldest first.
    ///
    /// Stops at the first failure so ordering is kept. Returns how many
    /// entries reached the durable buffer.
    pub async fn flush_fallback(&self) -> usize {
        let mut queue = self.fallback.lock().await;
        let mut flushed = 0;

        while let Some(entry) = queue.front() {
            if let Err(e) = self.repo.append(entry).await {
                error!(?e, remaining = queue.len(), "Audit fallback flush failed");
                break;
            }
            queue.pop_front();
            flushed += 1;
        }

        if flushed > 0 {
            info!(flushed, "Flushed in-memory audit entries to the local log");
            self.wake.notify_one();
        }
        flushed
    }

    /// Entries currently held only in memory.
    pub async fn fallback_len(&self) -> usize {
        self.fallback.lock().await.len()
    }

    pub(crate) fn repository(&self) -> &AuditLogRepository {
        &self.repo
    }

    pub(crate) fn wake_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::AuditSink;
    use cinder_core::audit::{AuditAction, AuditLogEntry};
    use cinder_db::{Database, DbConfig};

    fn entry(id: &str) -> AuditLogEntry {
        AuditLogEntry::new(id.into(), Utc::now(), "cashier-1", AuditAction::AgeVerificationFailed, "age_verification")
    }

    #[tokio::test]
    async fn test_record_appends_to_local_log() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sink = AuditSink::new(&db);

        sink.record(entry("a1")).await;

        assert_eq!(db.audit_log().count_pending().await.unwrap(), 1);
        assert_eq!(sink.fallback_len().await, 0);
    }

    #[tokio::test]
    async fn test_failed_append_is_held_and_flushed_later() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sink = AuditSink::new(&db);

        sqlx::query(
            "CREATE TRIGGER audit_offline BEFORE INSERT ON audit_log BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        sink.record(entry("a1")).await;
        sink.record(entry("a2")).await;
        assert_eq!(sink.fallback_len().await, 2);
        assert_eq!(sink.flush_fallback().await, 0);

        sqlx::query("DROP TRIGGER audit_offline").execute(db.pool()).await.unwrap();

        assert_eq!(sink.flush_fallback().await, 2);
        assert_eq!(sink.fallback_len().await, 0);
        let pending = db.audit_log().pending(10).await.unwrap();
        assert_eq!(pending.iter().map(|p| p.entry.id.as_str()).collect::<Vec<_>>(), ["a1", "a2"]);
    }
}
