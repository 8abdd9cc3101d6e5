//! # Age Verification Service
//!
//! Persists adjudications and manager overrides, and answers the
//! orchestrator's question "does this verification authorise a sale now?".
//!
//! ## Records
//! ```text
//! verify()          ──► record A  outcome=passed | failed        (immutable)
//! apply_override(A) ──► record B  outcome=override_applied       (immutable)
//!                                 supersedes_id = A
//!
//! A stays in storage after B exists. At most one B per A (unique index).
//! ```
//!
//! ## Audit Severity
//! | Event                         | Action                  | Severity |
//! |-------------------------------|-------------------------|----------|
//! | evaluation passed             | AgeVerificationPassed   | medium   |
//! | evaluation failed             | AgeVerificationFailed   | high     |
//! | override refused              | ComplianceViolation     | high     |
//! | override applied              | ManagerOverride         | critical |

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use cinder_audit::AuditSink;
use cinder_core::age::{
    AgePolicy, AgeVerificationRecord, IdDocument, VerificationAttempt, VerificationMethod,
    VerificationOutcome,
};
use cinder_core::audit::AuditAction;
use cinder_core::validation::{validate_actor_id, validate_reason};
use cinder_core::CoreError;
use cinder_db::{Database, VerificationRepository};

use crate::audit_entry;
use crate::error::{CheckoutError, CheckoutResult};

const ENTITY: &str = "age_verification";

/// An identity document presented at the register.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VerificationRequest {
    pub store_id: String,
    pub cashier_id: String,
    pub customer_id: Option<String>,
    pub method: VerificationMethod,
    pub document: IdDocument,
}

/// Manager sign-off for a failed verification.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OverrideRequest {
    pub verification_id: String,
    pub manager_id: String,
    /// Cashier operating the register when the override was given.
    pub cashier_id: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct AgeVerificationService {
    verifications: VerificationRepository,
    audit: AuditSink,
    policy: AgePolicy,
    ttl: chrono::Duration,
}

impl AgeVerificationService {
    pub fn new(db: &Database, audit: AuditSink, policy: AgePolicy, ttl: chrono::Duration) -> Self {
        Self {
            verifications: db.verifications(),
            audit,
            policy,
            ttl,
        }
    }

    pub fn policy(&self) -> &AgePolicy {
        &self.policy
    }

    /// Adjudicates a document as of today (UTC).
    pub async fn verify(&self, request: VerificationRequest) -> CheckoutResult<AgeVerificationRecord> {
        self.verify_on(request, Utc::now().date_naive()).await
    }

    pub async fn verify_on(
        &self,
        request: VerificationRequest,
        today: NaiveDate,
    ) -> CheckoutResult<AgeVerificationRecord> {
        validate_actor_id("store_id", &request.store_id)?;
        validate_actor_id("cashier_id", &request.cashier_id)?;

        let mut attempt = VerificationAttempt::new(request.method);
        attempt.capture(request.document)?;
        attempt.evaluate(&self.policy, today)?;

        let record = AgeVerificationRecord::evaluated(
            Uuid::new_v4().to_string(),
            &request.store_id,
            &request.cashier_id,
            request.customer_id.as_deref(),
            &attempt,
            Utc::now(),
        )?;
        self.verifications.insert(&record).await?;

        let details = json!({
            "outcome": record.outcome,
            "calculated_age": record.calculated_age,
            "minimum_age": record.minimum_age,
            "id_type": record.id_type,
            "id_number": record.id_number_masked,
            "reason": record.reason_for_denial,
            "requires_manager_override": record.requires_manager_override,
            "warnings": record.warnings,
        });

        if record.is_verified() {
            info!(verification_id = %record.id, age = record.calculated_age, "Age verification passed");
            self.audit
                .record(
                    audit_entry(&record.cashier_id, AuditAction::AgeVerificationPassed, ENTITY)
                        .entity(&record.id)
                        .details(details),
                )
                .await;
        } else {
            warn!(
                verification_id = %record.id,
                age = record.calculated_age,
                reason = ?record.reason_for_denial,
                override_offered = record.requires_manager_override,
                "Age verification failed"
            );
            self.audit
                .record(
                    audit_entry(&record.cashier_id, AuditAction::AgeVerificationFailed, ENTITY)
                        .entity(&record.id)
                        .details(details),
                )
                .await;
        }

        Ok(record)
    }

    /// Supersedes a failed record with an override record.
    ///
    /// ## Errors
    /// - `VerificationNotFound`: unknown id
    /// - `InvalidVerificationState`: not a failed record, or already overridden
    /// - `OverrideNotPermitted`: under 18, or an expired id where policy forbids
    ///   it. Also audited as a compliance violation.
    pub async fn apply_override(&self, request: OverrideRequest) -> CheckoutResult<AgeVerificationRecord> {
        validate_actor_id("cashier_id", &request.cashier_id)?;
        validate_actor_id("manager_id", &request.manager_id)?;
        validate_reason(&request.reason)?;

        let failed = self
            .verifications
            .get_by_id(&request.verification_id)
            .await?
            .ok_or_else(|| CheckoutError::VerificationNotFound(request.verification_id.clone()))?;

        if self.verifications.find_override_for(&failed.id).await?.is_some() {
            return Err(already_overridden(&failed.id));
        }

        let mut attempt = failed.to_failed_attempt()?;
        if let Err(err) = attempt.request_override() {
            if let CoreError::OverrideNotPermitted { reason } = &err {
                warn!(verification_id = %failed.id, manager_id = %request.manager_id, %reason, "Override refused");
                self.audit
                    .record(
                        audit_entry(&request.manager_id, AuditAction::ComplianceViolation, ENTITY)
                            .entity(&failed.id)
                            .details(json!({
                                "violation": "override_not_permitted",
                                "reason": reason,
                                "calculated_age": failed.calculated_age,
                                "cashier_id": request.cashier_id,
                                "override_reason": request.reason,
                            })),
                    )
                    .await;
            }
            return Err(err.into());
        }
        attempt.apply_override(&request.manager_id, &request.reason)?;

        let manager = attempt
            .manager_override()
            .ok_or_else(|| CheckoutError::InvalidVerificationState("override was not captured".into()))?;

        let record = AgeVerificationRecord::override_of(
            &failed,
            Uuid::new_v4().to_string(),
            &request.cashier_id,
            manager,
            Utc::now(),
        );

        self.verifications.insert(&record).await.map_err(|e| {
            if e.is_unique_violation_on("supersedes_id") {
                already_overridden(&failed.id)
            } else {
                CheckoutError::from(e)
            }
        })?;

        info!(
            verification_id = %record.id,
            supersedes = %failed.id,
            manager_id = %manager.manager_id,
            "Manager override applied"
        );
        self.audit
            .record(
                audit_entry(&manager.manager_id, AuditAction::ManagerOverride, ENTITY)
                    .entity(&record.id)
                    .details(json!({
                        "supersedes_id": failed.id,
                        "cashier_id": record.cashier_id,
                        "reason": manager.reason,
                        "calculated_age": failed.calculated_age,
                        "original_denial": failed.reason_for_denial,
                    })),
            )
            .await;

        Ok(record)
    }

    /// Resolves the record that authorises a restricted sale at `now`.
    ///
    /// A failed record resolves to its override, if any. Unknown, stale and
    /// other-store records do not authorise anything.
    pub async fn authorising_record(
        &self,
        verification_id: &str,
        store_id: &str,
        now: DateTime<Utc>,
    ) -> CheckoutResult<AgeVerificationRecord> {
        let record = match self.verifications.get_by_id(verification_id).await? {
            Some(record) if record.store_id == store_id => record,
            Some(_) => {
                warn!(verification_id, store_id, "Verification belongs to another store");
                return Err(CheckoutError::AgeVerificationRequired);
            }
            None => {
                warn!(verification_id, "Unknown verification id supplied at checkout");
                return Err(CheckoutError::AgeVerificationRequired);
            }
        };

        let effective = match record.outcome {
            VerificationOutcome::Passed | VerificationOutcome::OverrideApplied => record,
            VerificationOutcome::Failed => match self.verifications.find_override_for(&record.id).await? {
                Some(override_record) => override_record,
                None => {
                    return Err(CheckoutError::AgeVerificationFailed {
                        reason: record
                            .reason_for_denial
                            .unwrap_or_else(|| "verification failed".to_string()),
                    })
                }
            },
        };

        if !effective.is_fresh(now, self.ttl) {
            warn!(verification_id = %effective.id, "Verification has expired for checkout");
            return Err(CheckoutError::AgeVerificationRequired);
        }

        Ok(effective)
    }
}

fn already_overridden(id: &str) -> CheckoutError {
    CheckoutError::InvalidVerificationState(format!("verification {id} has already been overridden"))
}

// =============================================================================
// Unit Tests
// =============================================================================
