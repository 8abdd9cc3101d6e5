//! # Age Verification Repository
//!
//! Append-only storage for verification attempts and overrides.
//!
//! ```text
//! age_verifications
//! ┌──────┬──────────────────┬───────────────┐
//! │ id   │ outcome          │ supersedes_id │
//! ├──────┼──────────────────┼───────────────┤
//! │ v1   │ failed           │ NULL          │ ← kept forever
//! │ v2   │ override_applied │ v1            │ ← at most one per failed record
//! └──────┴──────────────────┴───────────────┘
//! ```

use sqlx::types::Json;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use cinder_core::age::AgeVerificationRecord;

const VERIFICATION_COLUMNS: &str = r#"
    id, store_id, cashier_id, customer_id, method, id_type, id_number_masked,
    date_of_birth, id_expiration_date, calculated_age, minimum_age, evaluated_on, outcome,
    reason_for_denial, requires_manager_override, warnings,
    supersedes_id, manager_id, override_reason, created_at
"#;

#[derive(Debug, Clone)]
pub struct VerificationRepository {
    pool: SqlitePool,
}

impl VerificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        VerificationRepository { pool }
    }

    /// Stores a record. Records are never updated afterwards.
    pub async fn insert(&self, record: &AgeVerificationRecord) -> DbResult<()> {
        debug!(
            id = %record.id,
            outcome = ?record.outcome,
            supersedes = ?record.supersedes_id,
            "Inserting age verification record"
        );

        sqlx::query(
            r#"
            INSERT INTO age_verifications (
                id, store_id, cashier_id, customer_id, method, id_type, id_number_masked,
                date_of_birth, id_expiration_date, calculated_age, minimum_age, evaluated_on, outcome,
                reason_for_denial, requires_manager_override, warnings,
                supersedes_id, manager_id, override_reason, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            "#,
        )
        .bind(&record.id)
        .bind(&record.store_id)
        .bind(&record.cashier_id)
        .bind(&record.customer_id)
        .bind(record.method)
        .bind(record.id_type)
        .bind(&record.id_number_masked)
        .bind(record.date_of_birth)
        .bind(record.id_expiration_date)
        .bind(record.calculated_age)
        .bind(record.minimum_age)
        .bind(record.evaluated_on)
        .bind(record.outcome)
        .bind(&record.reason_for_denial)
        .bind(record.requires_manager_override)
        .bind(Json(&record.warnings))
        .bind(&record.supersedes_id)
        .bind(&record.manager_id)
        .bind(&record.override_reason)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } if field.contains("supersedes_id") => {
                DbError::UniqueViolation {
                    field,
                    value: record.supersedes_id.clone().unwrap_or_default(),
                }
            }
            other => other,
        })?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<AgeVerificationRecord>> {
        let sql = format!("SELECT {VERIFICATION_COLUMNS} FROM age_verifications WHERE id = ?1");
        let record = sqlx::query_as::<_, AgeVerificationRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// The override record superseding `failed_id`, if one was applied.
    pub async fn find_override_for(&self, failed_id: &str) -> DbResult<Option<AgeVerificationRecord>> {
        let sql = format!(
            "SELECT {VERIFICATION_COLUMNS} FROM age_verifications WHERE supersedes_id = ?1"
        );
        let record = sqlx::query_as::<_, AgeVerificationRecord>(&sql)
            .bind(failed_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM age_verifications")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
