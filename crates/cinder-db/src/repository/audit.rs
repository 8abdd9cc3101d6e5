//! # Audit Log Repository
//!
//! The `audit_log` table is both the permanent audit trail and the durable
//! delivery buffer for the audit dispatcher.
//!
//! ## Row Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  append()            delivered_at NULL, abandoned_at NULL   (pending)   │
//! │     │                                                                   │
//! │     ├── transport ok ──► mark_delivered()  delivered_at = now           │
//! │     │                                                                   │
//! │     ├── transport err ─► record_failure()  attempts += 1, last_error    │
//! │     │                        │                                          │
//! │     │                        └── low/medium past the limit:             │
//! │     │                            abandon()  abandoned_at = now          │
//! │     │                                                                   │
//! │  Entry content never changes and rows are never deleted.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use cinder_core::audit::{AuditAction, AuditLogEntry, Severity};

const ENTRY_COLUMNS: &str =
    "id, occurred_at, actor_id, action, entity_type, entity_id, severity, details";

/// A not-yet-delivered entry with its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PendingAuditEntry {
    #[sqlx(flatten)]
    pub entry: AuditLogEntry,
    pub attempts: i64,
    pub last_error: Option<String>,
}

/// Filters for read-only audit retrieval. Unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub actor_id: Option<String>,
    pub action: Option<AuditAction>,
    pub severity: Option<Severity>,
    /// Entries at or above this severity.
    pub min_severity: Option<Severity>,
    pub limit: Option<u32>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

const DEFAULT_QUERY_LIMIT: u32 = 1000;

#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    pool: SqlitePool,
}

impl AuditLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AuditLogRepository { pool }
    }

    /// Appends an entry. Idempotent on `id`, so a retried append after an
    /// ambiguous failure never duplicates the entry.
    pub async fn append(&self, entry: &AuditLogEntry) -> DbResult<()> {
        debug!(
            id = %entry.id,
            action = %entry.action,
            severity = entry.severity.as_str(),
            "Appending audit entry"
        );

        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, occurred_at, actor_id, action, entity_type, entity_id, severity, details
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&entry.id)
        .bind(entry.occurred_at)
        .bind(&entry.actor_id)
        .bind(entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(entry.severity)
        .bind(Json(&entry.details))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<AuditLogEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM audit_log WHERE id = ?1");
        let entry = sqlx::query_as::<_, AuditLogEntry>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    /// Oldest undelivered, unabandoned entries.
    pub async fn pending(&self, limit: u32) -> DbResult<Vec<PendingAuditEntry>> {
        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS}, attempts, last_error
            FROM audit_log
            WHERE delivered_at IS NULL AND abandoned_at IS NULL
            ORDER BY occurred_at ASC, id ASC
            LIMIT ?1
            "#
        );
        let entries = sqlx::query_as::<_, PendingAuditEntry>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    pub async fn mark_delivered(&self, ids: &[String], at: DateTime<Utc>) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE audit_log SET delivered_at = ");
        builder.push_bind(at);
        builder.push(", last_attempt_at = ");
        builder.push_bind(at);
        builder.push(" WHERE delivered_at IS NULL AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Records a failed delivery; returns the new attempt count.
    pub async fn record_failure(&self, id: &str, error: &str, at: DateTime<Utc>) -> DbResult<i64> {
        let attempts: i64 = sqlx::query_scalar(
            r#"
            UPDATE audit_log
            SET attempts = attempts + 1, last_error = ?2, last_attempt_at = ?3
            WHERE id = ?1
            RETURNING attempts
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        Ok(attempts)
    }

    /// Stops delivery attempts for an entry. The entry stays in the log.
    pub async fn abandon(&self, id: &str, at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE audit_log SET abandoned_at = ?2 WHERE id = ?1 AND delivered_at IS NULL")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM audit_log WHERE delivered_at IS NULL AND abandoned_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Filtered retrieval for reporting and export, oldest first.
    pub async fn query(&self, filter: &AuditQuery) -> DbResult<Vec<AuditLogEntry>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {ENTRY_COLUMNS} FROM audit_log WHERE 1 = 1"));

        if let Some(from) = filter.from {
            builder.push(" AND occurred_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            builder.push(" AND occurred_at <= ").push_bind(to);
        }
        if let Some(actor_id) = &filter.actor_id {
            builder.push(" AND actor_id = ").push_bind(actor_id.clone());
        }
        if let Some(action) = filter.action {
            builder.push(" AND action = ").push_bind(action);
        }
        if let Some(severity) = filter.severity {
            builder.push(" AND severity = ").push_bind(severity);
        }
        if let Some(min) = filter.min_severity {
            builder.push(" AND severity IN (");
            let mut separated = builder.separated(", ");
            for severity in [Severity::Low, Severity::Medium, Severity::High, Severity::Critical] {
                if severity >= min {
                    separated.push_bind(severity);
                }
            }
            separated.push_unseparated(")");
        }

        builder
            .push(" ORDER BY occurred_at ASC, id ASC LIMIT ")
            .push_bind(filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT));

        let entries = builder
            .build_query_as::<AuditLogEntry>()
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }
}
