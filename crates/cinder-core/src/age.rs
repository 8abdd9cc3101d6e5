//! # Age Verification Adjudicator
//!
//! Decides whether an identity document proves the customer may buy
//! age-restricted goods, and tracks each attempt through its lifecycle.
//!
//! ## Attempt Lifecycle
//! ```text
//! ┌──────────────────┐  capture()   ┌──────────────┐  evaluate()
//! │  MethodSelected  │─────────────►│ DataCaptured │───────────┐
//! │ (manual/scanner) │              └──────────────┘           │
//! └──────────────────┘                              ┌──────────┴─────────┐
//!                                                   ▼                    ▼
//!                                          ┌──────────────┐     ┌──────────────┐
//!                                          │   Passed ■   │     │    Failed    │
//!                                          └──────────────┘     └──────┬───────┘
//!                                                     request_override()│
//!                                                                       ▼
//!                                                          ┌────────────────────┐
//!                                                          │ OverrideRequested  │
//!                                                          └─────────┬──────────┘
//!                                                      apply_override()│
//!                                                                      ▼
//!                                                          ┌────────────────────┐
//!                                                          │ OverrideApplied ■  │
//!                                                          └────────────────────┘
//! ■ = terminal. A new attempt is required to evaluate again.
//! ```
//!
//! ## Override Floor
//! An override is never offered below [`OVERRIDE_AGE_FLOOR`]. The floor is a
//! constant, not part of [`AgePolicy`], so no configuration can lower it.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::validation::{validate_actor_id, validate_reason};

/// No manager override below this age, under any policy.
pub const OVERRIDE_AGE_FLOOR: i32 = 18;

/// Default jurisdiction minimum age for tobacco and vapor products.
pub const DEFAULT_MINIMUM_AGE: i32 = 21;

// =============================================================================
// Inputs
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdType {
    DriversLicense,
    StateId,
    Passport,
    MilitaryId,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationMethod {
    ManualEntry,
    ScannerRead,
}

/// Data read from an identity document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IdDocument {
    pub id_type: IdType,
    pub id_number: String,
    #[ts(as = "String")]
    pub date_of_birth: NaiveDate,
    #[ts(as = "String")]
    pub expiration_date: NaiveDate,
}

/// Jurisdiction policy for adjudication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgePolicy {
    pub minimum_age: i32,
    /// Whether an adult presenting an expired id may be overridden.
    pub allow_expired_id_override: bool,
    /// Warn when the id expires within this many days.
    pub expiry_warning_days: i64,
}

impl Default for AgePolicy {
    fn default() -> Self {
        Self {
            minimum_age: DEFAULT_MINIMUM_AGE,
            allow_expired_id_override: true,
            expiry_warning_days: 30,
        }
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Age in whole years on `today`. A birthday today counts as having turned
/// that age; a 29 February birthday is reached on 1 March in common years.
///
/// ```rust
/// use chrono::NaiveDate;
/// use cinder_core::age::calculate_age;
///
/// let dob = NaiveDate::from_ymd_opt(2004, 6, 15).unwrap();
/// assert_eq!(calculate_age(dob, NaiveDate::from_ymd_opt(2025, 6, 14).unwrap()), 20);
/// assert_eq!(calculate_age(dob, NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()), 21);
/// ```
pub fn calculate_age(date_of_birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    age
}

/// Why a document did not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialReason {
    BirthDateInFuture,
    IdExpired,
    UnderMinimumAge { minimum_age: i32 },
}

impl DenialReason {
    pub fn message(&self) -> String {
        match self {
            DenialReason::BirthDateInFuture => "Date of birth is in the future".to_string(),
            DenialReason::IdExpired => "ID is expired".to_string(),
            DenialReason::UnderMinimumAge { minimum_age } => {
                format!("Customer is under {minimum_age}")
            }
        }
    }
}

/// Result of [`evaluate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AgeEvaluation {
    pub is_verified: bool,
    pub calculated_age: i32,
    pub minimum_age: i32,
    /// The date everything above was judged against.
    #[ts(as = "String")]
    pub evaluated_on: NaiveDate,
    pub id_expired: bool,
    /// Most actionable reason; an expired id is reported before age.
    pub denial: Option<DenialReason>,
    pub reason_for_denial: Option<String>,
    pub requires_manager_override: bool,
    pub warnings: Vec<String>,
}

/// Adjudicates one document on `today`.
///
/// Fails when the id is expired OR the customer is under the minimum age.
/// An override is offered only when the customer is at least
/// [`OVERRIDE_AGE_FLOOR`], and for an expired id only if the policy allows it.
pub fn evaluate(document: &IdDocument, policy: &AgePolicy, today: NaiveDate) -> AgeEvaluation {
    let calculated_age = calculate_age(document.date_of_birth, today);
    let birth_in_future = document.date_of_birth > today;
    // An id is valid through its expiration date.
    let id_expired = document.expiration_date < today;
    let under_age = calculated_age < policy.minimum_age;

    let denial = if birth_in_future {
        Some(DenialReason::BirthDateInFuture)
    } else if id_expired {
        Some(DenialReason::IdExpired)
    } else if under_age {
        Some(DenialReason::UnderMinimumAge {
            minimum_age: policy.minimum_age,
        })
    } else {
        None
    };
    let is_verified = denial.is_none();

    let requires_manager_override = !is_verified
        && !birth_in_future
        && calculated_age >= OVERRIDE_AGE_FLOOR
        && (!id_expired || policy.allow_expired_id_override);

    let mut warnings = Vec::new();
    if !id_expired {
        let days_left = (document.expiration_date - today).num_days();
        if days_left <= policy.expiry_warning_days {
            warnings.push(format!("ID expires in {days_left} days"));
        }
    }
    let birthday_today = !birth_in_future
        && (today.month(), today.day())
            == (document.date_of_birth.month(), document.date_of_birth.day());
    if birthday_today && calculated_age == policy.minimum_age {
        warnings.push(format!("Customer turned {} today", policy.minimum_age));
    }

    AgeEvaluation {
        is_verified,
        calculated_age,
        minimum_age: policy.minimum_age,
        evaluated_on: today,
        id_expired,
        reason_for_denial: denial.map(|d| d.message()),
        denial,
        requires_manager_override,
        warnings,
    }
}

// =============================================================================
// Attempt State Machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptState {
    MethodSelected,
    DataCaptured,
    Passed,
    Failed,
    OverrideRequested,
    OverrideApplied,
}

impl AttemptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptState::MethodSelected => "method_selected",
            AttemptState::DataCaptured => "data_captured",
            AttemptState::Passed => "passed",
            AttemptState::Failed => "failed",
            AttemptState::OverrideRequested => "override_requested",
            AttemptState::OverrideApplied => "override_applied",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Passed | AttemptState::OverrideApplied)
    }
}

/// Manager sign-off captured on override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ManagerOverride {
    pub manager_id: String,
    pub reason: String,
}

/// One verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationAttempt {
    method: VerificationMethod,
    state: AttemptState,
    document: Option<IdDocument>,
    evaluation: Option<AgeEvaluation>,
    manager_override: Option<ManagerOverride>,
}

impl VerificationAttempt {
    pub fn new(method: VerificationMethod) -> Self {
        Self {
            method,
            state: AttemptState::MethodSelected,
            document: None,
            evaluation: None,
            manager_override: None,
        }
    }

    pub fn method(&self) -> VerificationMethod {
        self.method
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn document(&self) -> Option<&IdDocument> {
        self.document.as_ref()
    }

    pub fn evaluation(&self) -> Option<&AgeEvaluation> {
        self.evaluation.as_ref()
    }

    pub fn manager_override(&self) -> Option<&ManagerOverride> {
        self.manager_override.as_ref()
    }

    /// True once the attempt allows a restricted sale.
    pub fn is_effectively_verified(&self) -> bool {
        self.state.is_terminal()
    }

    fn transition(&mut self, expected: AttemptState, to: AttemptState) -> CoreResult<()> {
        if self.state != expected {
            return Err(CoreError::InvalidVerificationTransition {
                from: self.state.as_str(),
                to: to.as_str(),
            });
        }
        self.state = to;
        Ok(())
    }

    /// Records the document read by manual entry or the scanner.
    pub fn capture(&mut self, document: IdDocument) -> CoreResult<()> {
        if document.id_number.trim().is_empty() {
            return Err(crate::error::ValidationError::Required {
                field: "id_number".to_string(),
            }
            .into());
        }
        self.transition(AttemptState::MethodSelected, AttemptState::DataCaptured)?;
        self.document = Some(document);
        Ok(())
    }

    /// Adjudicates the captured document.
    pub fn evaluate(&mut self, policy: &AgePolicy, today: NaiveDate) -> CoreResult<&AgeEvaluation> {
        let document = match (&self.state, &self.document) {
            (AttemptState::DataCaptured, Some(document)) => document,
            _ => {
                return Err(CoreError::InvalidVerificationTransition {
                    from: self.state.as_str(),
                    to: "evaluated",
                })
            }
        };

        let evaluation = evaluate(document, policy, today);
        self.state = if evaluation.is_verified {
            AttemptState::Passed
        } else {
            AttemptState::Failed
        };
        let evaluation: &AgeEvaluation = self.evaluation.insert(evaluation);
        Ok(evaluation)
    }

    /// Moves a failed attempt to `OverrideRequested` if the evaluation offered one.
    pub fn request_override(&mut self) -> CoreResult<()> {
        let eligible = self
            .evaluation
            .as_ref()
            .map(|e| e.requires_manager_override)
            .unwrap_or(false);

        if self.state == AttemptState::Failed && !eligible {
            let reason = match self.evaluation.as_ref() {
                Some(e) if e.calculated_age < OVERRIDE_AGE_FLOOR => {
                    format!("customer is under {OVERRIDE_AGE_FLOOR}")
                }
                Some(e) if e.id_expired => "expired ID overrides are disabled".to_string(),
                _ => "evaluation does not allow an override".to_string(),
            };
            return Err(CoreError::OverrideNotPermitted { reason });
        }

        self.transition(AttemptState::Failed, AttemptState::OverrideRequested)
    }

    /// Applies the manager's sign-off. The failed evaluation is kept.
    pub fn apply_override(&mut self, manager_id: &str, reason: &str) -> CoreResult<()> {
        validate_actor_id("manager_id", manager_id)?;
        validate_reason(reason)?;
        self.transition(AttemptState::OverrideRequested, AttemptState::OverrideApplied)?;
        self.manager_override = Some(ManagerOverride {
            manager_id: manager_id.trim().to_string(),
            reason: reason.trim().to_string(),
        });
        Ok(())
    }
}

// =============================================================================
// Persisted Record
// =============================================================================

/// Stored outcome of a verification record.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationOutcome {
    Passed,
    Failed,
    OverrideApplied,
}

/// Immutable record of one verification attempt or one override.
///
/// An override is a second record whose `supersedes_id` points at the failed
/// one; the failed record itself is never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AgeVerificationRecord {
    pub id: String,
    pub store_id: String,
    pub cashier_id: String,
    pub customer_id: Option<String>,
    pub method: VerificationMethod,
    pub id_type: IdType,
    /// Last four characters only, e.g. `****1234`.
    pub id_number_masked: String,
    #[ts(as = "String")]
    pub date_of_birth: NaiveDate,
    #[ts(as = "String")]
    pub id_expiration_date: NaiveDate,
    pub calculated_age: i32,
    pub minimum_age: i32,
    #[ts(as = "String")]
    pub evaluated_on: NaiveDate,
    pub outcome: VerificationOutcome,
    pub reason_for_denial: Option<String>,
    pub requires_manager_override: bool,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub warnings: Vec<String>,
    pub supersedes_id: Option<String>,
    pub manager_id: Option<String>,
    pub override_reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl AgeVerificationRecord {
    /// Record for an evaluated attempt.
    pub fn evaluated(
        id: String,
        store_id: &str,
        cashier_id: &str,
        customer_id: Option<&str>,
        attempt: &VerificationAttempt,
        created_at: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let (document, evaluation) = match (attempt.document(), attempt.evaluation()) {
            (Some(d), Some(e)) => (d, e),
            _ => {
                return Err(CoreError::InvalidVerificationTransition {
                    from: attempt.state().as_str(),
                    to: "recorded",
                })
            }
        };

        Ok(Self {
            id,
            store_id: store_id.to_string(),
            cashier_id: cashier_id.to_string(),
            customer_id: customer_id.map(str::to_string),
            method: attempt.method(),
            id_type: document.id_type,
            id_number_masked: mask_id_number(&document.id_number),
            date_of_birth: document.date_of_birth,
            id_expiration_date: document.expiration_date,
            calculated_age: evaluation.calculated_age,
            minimum_age: evaluation.minimum_age,
            evaluated_on: evaluation.evaluated_on,
            outcome: if evaluation.is_verified {
                VerificationOutcome::Passed
            } else {
                VerificationOutcome::Failed
            },
            reason_for_denial: evaluation.reason_for_denial.clone(),
            requires_manager_override: evaluation.requires_manager_override,
            warnings: evaluation.warnings.clone(),
            supersedes_id: None,
            manager_id: None,
            override_reason: None,
            created_at,
        })
    }

    /// Override record superseding `failed`.
    pub fn override_of(
        failed: &AgeVerificationRecord,
        id: String,
        cashier_id: &str,
        manager: &ManagerOverride,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            store_id: failed.store_id.clone(),
            cashier_id: cashier_id.to_string(),
            customer_id: failed.customer_id.clone(),
            method: failed.method,
            id_type: failed.id_type,
            id_number_masked: failed.id_number_masked.clone(),
            date_of_birth: failed.date_of_birth,
            id_expiration_date: failed.id_expiration_date,
            calculated_age: failed.calculated_age,
            minimum_age: failed.minimum_age,
            evaluated_on: failed.evaluated_on,
            outcome: VerificationOutcome::OverrideApplied,
            reason_for_denial: failed.reason_for_denial.clone(),
            requires_manager_override: false,
            warnings: failed.warnings.clone(),
            supersedes_id: Some(failed.id.clone()),
            manager_id: Some(manager.manager_id.clone()),
            override_reason: Some(manager.reason.clone()),
            created_at,
        }
    }

    pub fn is_verified(&self) -> bool {
        !matches!(self.outcome, VerificationOutcome::Failed)
    }

    /// Rebuilds the attempt as of this record, so an override can be driven
    /// through the same state machine.
    pub fn to_failed_attempt(&self) -> CoreResult<VerificationAttempt> {
        if self.outcome != VerificationOutcome::Failed {
            return Err(CoreError::InvalidVerificationTransition {
                from: match self.outcome {
                    VerificationOutcome::Passed => AttemptState::Passed.as_str(),
                    _ => AttemptState::OverrideApplied.as_str(),
                },
                to: AttemptState::OverrideRequested.as_str(),
            });
        }

        Ok(VerificationAttempt {
            method: self.method,
            state: AttemptState::Failed,
            document: None,
            evaluation: Some(AgeEvaluation {
                is_verified: false,
                calculated_age: self.calculated_age,
                minimum_age: self.minimum_age,
                evaluated_on: self.evaluated_on,
                id_expired: self.id_expiration_date < self.evaluated_on,
                denial: None,
                reason_for_denial: self.reason_for_denial.clone(),
                requires_manager_override: self.requires_manager_override,
                warnings: self.warnings.clone(),
            }),
            manager_override: None,
        })
    }

    /// Whether the record is young enough to authorise a sale at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.created_at) <= ttl
    }
}

/// Masks all but the last four characters.
///
/// ```rust
/// use cinder_core::age::mask_id_number;
///
/// assert_eq!(mask_id_number("D1234567"), "****4567");
/// assert_eq!(mask_id_number("123"), "****");
/// ```
pub fn mask_id_number(id_number: &str) -> String {
    let chars: Vec<char> = id_number.trim().chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2025, 6, 15)
    }

    fn document(dob: NaiveDate, expires: NaiveDate) -> IdDocument {
        IdDocument {
            id_type: IdType::DriversLicense,
            id_number: "D12345678".to_string(),
            date_of_birth: dob,
            expiration_date: expires,
        }
    }

    #[test]
    fn test_calculate_age_birthday_boundary() {
        let dob = date(2004, 6, 15);
        assert_eq!(calculate_age(dob, date(2025, 6, 14)), 20);
        assert_eq!(calculate_age(dob, date(2025, 6, 15)), 21);
    }

    #[test]
    fn test_leap_day_birthday() {
        let dob = date(2004, 2, 29);
        assert_eq!(calculate_age(dob, date(2025, 2, 28)), 20);
        assert_eq!(calculate_age(dob, date(2025, 3, 1)), 21);
    }

    #[test]
    fn test_adult_with_valid_id_passes() {
        let result = evaluate(&document(date(1990, 1, 1), date(2028, 1, 1)), &AgePolicy::default(), today());
        assert!(result.is_verified);
        assert_eq!(result.calculated_age, 35);
        assert!(!result.requires_manager_override);
        assert!(result.reason_for_denial.is_none());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_age_twenty_offers_override() {
        let result = evaluate(&document(date(2005, 1, 1), date(2028, 1, 1)), &AgePolicy::default(), today());
        assert!(!result.is_verified);
        assert_eq!(result.calculated_age, 20);
        assert!(result.requires_manager_override);
        assert_eq!(result.denial, Some(DenialReason::UnderMinimumAge { minimum_age: 21 }));
    }

    #[test]
    fn test_under_floor_never_offers_override() {
        let result = evaluate(&document(date(2008, 1, 1), date(2028, 1, 1)), &AgePolicy::default(), today());
        assert!(!result.is_verified);
        assert_eq!(result.calculated_age, 17);
        assert!(!result.requires_manager_override);
    }

    #[test]
    fn test_expired_reported_before_age() {
        let result = evaluate(&document(date(2005, 1, 1), date(2025, 1, 1)), &AgePolicy::default(), today());
        assert!(!result.is_verified);
        assert_eq!(result.denial, Some(DenialReason::IdExpired));
        assert_eq!(result.reason_for_denial.as_deref(), Some("ID is expired"));
    }

    #[test]
    fn test_expired_adult_override_follows_policy() {
        let doc = document(date(1980, 1, 1), date(2025, 1, 1));
        let permissive = evaluate(&doc, &AgePolicy::default(), today());
        assert!(!permissive.is_verified);
        assert!(permissive.requires_manager_override);

        let strict = AgePolicy {
            allow_expired_id_override: false,
            ..AgePolicy::default()
        };
        assert!(!evaluate(&doc, &strict, today()).requires_manager_override);
    }

    #[test]
    fn test_id_valid_on_expiration_day() {
        let result = evaluate(&document(date(1990, 1, 1), today()), &AgePolicy::default(), today());
        assert!(result.is_verified);
        assert_eq!(result.warnings, vec!["ID expires in 0 days".to_string()]);
    }

    #[test]
    fn test_birthday_today_warning() {
        let result = evaluate(&document(date(2004, 6, 15), date(2028, 1, 1)), &AgePolicy::default(), today());
        assert!(result.is_verified);
        assert!(result.warnings.iter().any(|w| w.contains("turned 21 today")));
    }

    #[test]
    fn test_attempt_pass_is_terminal() {
        let mut attempt = VerificationAttempt::new(VerificationMethod::ScannerRead);
        attempt.capture(document(date(1990, 1, 1), date(2028, 1, 1))).unwrap();
        assert!(attempt.evaluate(&AgePolicy::default(), today()).unwrap().is_verified);
        assert_eq!(attempt.state(), AttemptState::Passed);
        assert!(attempt.is_effectively_verified());

        let err = attempt.evaluate(&AgePolicy::default(), today()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidVerificationTransition { .. }));
        assert!(attempt.request_override().is_err());
    }

    #[test]
    fn test_attempt_override_flow() {
        let mut attempt = VerificationAttempt::new(VerificationMethod::ManualEntry);
        attempt.capture(document(date(2005, 1, 1), date(2028, 1, 1))).unwrap();
        attempt.evaluate(&AgePolicy::default(), today()).unwrap();
        assert_eq!(attempt.state(), AttemptState::Failed);

        assert!(attempt.apply_override("mgr-1", "second ID").is_err());
        attempt.request_override().unwrap();
        assert!(attempt.apply_override("mgr-1", "  ").is_err());
        attempt.apply_override("mgr-1", "Customer presented passport").unwrap();

        assert_eq!(attempt.state(), AttemptState::OverrideApplied);
        assert!(attempt.is_effectively_verified());
        assert!(!attempt.evaluation().unwrap().is_verified);
        assert_eq!(attempt.manager_override().unwrap().manager_id, "mgr-1");
    }

    #[test]
    fn test_override_refused_under_floor() {
        let mut attempt = VerificationAttempt::new(VerificationMethod::ManualEntry);
        attempt.capture(document(date(2009, 1, 1), date(2028, 1, 1))).unwrap();
        attempt.evaluate(&AgePolicy::default(), today()).unwrap();
        let err = attempt.request_override().unwrap_err();
        assert!(matches!(err, CoreError::OverrideNotPermitted { .. }));
        assert_eq!(attempt.state(), AttemptState::Failed);
    }

    #[test]
    fn test_capture_out_of_order() {
        let mut attempt = VerificationAttempt::new(VerificationMethod::ManualEntry);
        let doc = document(date(1990, 1, 1), date(2028, 1, 1));
        attempt.capture(doc.clone()).unwrap();
        assert!(attempt.capture(doc).is_err());
    }

    #[test]
    fn test_records_and_override_link() {
        let mut attempt = VerificationAttempt::new(VerificationMethod::ManualEntry);
        attempt.capture(document(date(2005, 1, 1), date(2028, 1, 1))).unwrap();
        attempt.evaluate(&AgePolicy::default(), today()).unwrap();

        let now = Utc::now();
        let failed = AgeVerificationRecord::evaluated("v1".into(), "store-1", "cashier-1", None, &attempt, now).unwrap();
        assert_eq!(failed.outcome, VerificationOutcome::Failed);
        assert_eq!(failed.id_number_masked, "****5678");
        assert!(!failed.is_verified());

        let mut replay = failed.to_failed_attempt().unwrap();
        replay.request_override().unwrap();
        replay.apply_override("mgr-1", "Known regular").unwrap();

        let manager = replay.manager_override().unwrap();
        let override_record = AgeVerificationRecord::override_of(&failed, "v2".into(), "cashier-1", manager, now);
        assert!(override_record.is_verified());
        assert_eq!(override_record.supersedes_id.as_deref(), Some("v1"));
        assert_eq!(override_record.override_reason.as_deref(), Some("Known regular"));
    }

    #[test]
    fn test_replayed_attempt_judges_expiry_on_the_evaluation_date() {
        // Valid through the 15th, persisted just after midnight on the 16th.
        let mut attempt = VerificationAttempt::new(VerificationMethod::ManualEntry);
        attempt.capture(document(date(2005, 1, 1), today())).unwrap();
        attempt.evaluate(&AgePolicy::default(), today()).unwrap();
        assert!(!attempt.evaluation().unwrap().id_expired);

        let created = DateTime::parse_from_rfc3339("2025-06-16T00:05:00Z").unwrap().with_timezone(&Utc);
        let failed = AgeVerificationRecord::evaluated("v1".into(), "s", "c", None, &attempt, created).unwrap();
        assert_eq!(failed.evaluated_on, today());

        let replay = failed.to_failed_attempt().unwrap();
        let evaluation = replay.evaluation().unwrap();
        assert!(!evaluation.id_expired);
        assert_eq!(evaluation.evaluated_on, today());
        assert_eq!(evaluation.requires_manager_override, failed.requires_manager_override);
    }

    #[test]
    fn test_freshness() {
        let mut attempt = VerificationAttempt::new(VerificationMethod::ManualEntry);
        attempt.capture(document(date(1990, 1, 1), date(2028, 1, 1))).unwrap();
        attempt.evaluate(&AgePolicy::default(), today()).unwrap();
        let created = Utc::now();
        let record = AgeVerificationRecord::evaluated("v1".into(), "s", "c", None, &attempt, created).unwrap();
        let ttl = chrono::Duration::seconds(900);
        assert!(record.is_fresh(created + chrono::Duration::seconds(899), ttl));
        assert!(!record.is_fresh(created + chrono::Duration::seconds(901), ttl));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 512, .. ProptestConfig::default() })]

        #[test]
        fn prop_no_override_under_floor(
            dob_offset_days in 0i64..(40 * 366),
            expiry_offset_days in -3_000i64..3_000,
            minimum_age in 18i32..30,
            allow_expired in any::<bool>(),
        ) {
            let today = today();
            let dob = today - chrono::Duration::days(dob_offset_days);
            let expires = today + chrono::Duration::days(expiry_offset_days);
            let policy = AgePolicy { minimum_age, allow_expired_id_override: allow_expired, expiry_warning_days: 30 };
            let result = evaluate(&document(dob, expires), &policy, today);
            if result.calculated_age < OVERRIDE_AGE_FLOOR {
                prop_assert!(!result.requires_manager_override);
                prop_assert!(!result.is_verified);
            }
        }
    }
}
