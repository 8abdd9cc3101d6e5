//! # Audit Entry Model
//!
//! What gets written to the audit log, and how severe it is.
//!
//! Compliance actions carry a severity floor: a caller may raise an entry's
//! severity but never lower a compliance action below its floor.
//!
//! | Action                  | Floor    |
//! |-------------------------|----------|
//! | TransactionCreated      | Low      |
//! | CustomerRegistered      | Low      |
//! | LoyaltyAdjusted         | Medium   |
//! | InventoryAdjusted       | Medium   |
//! | AgeVerificationPassed   | Medium   |
//! | CheckoutRejected        | Medium   |
//! | AgeVerificationFailed   | High     |
//! | ComplianceViolation     | High     |
//! | ManagerOverride         | Critical |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// High and Critical entries are never abandoned by delivery.
    pub fn is_compliance_grade(&self) -> bool {
        *self >= Severity::High
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    TransactionCreated,
    AgeVerificationPassed,
    AgeVerificationFailed,
    ManagerOverride,
    ComplianceViolation,
    CheckoutRejected,
    LoyaltyAdjusted,
    InventoryAdjusted,
    CustomerRegistered,
}

impl AuditAction {
    /// Lowest severity this action may be recorded at.
    pub fn minimum_severity(&self) -> Severity {
        match self {
            AuditAction::TransactionCreated | AuditAction::CustomerRegistered => Severity::Low,
            AuditAction::LoyaltyAdjusted
            | AuditAction::InventoryAdjusted
            | AuditAction::AgeVerificationPassed
            | AuditAction::CheckoutRejected => Severity::Medium,
            AuditAction::AgeVerificationFailed | AuditAction::ComplianceViolation => {
                Severity::High
            }
            AuditAction::ManagerOverride => Severity::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::TransactionCreated => "transaction_created",
            AuditAction::AgeVerificationPassed => "age_verification_passed",
            AuditAction::AgeVerificationFailed => "age_verification_failed",
            AuditAction::ManagerOverride => "manager_override",
            AuditAction::ComplianceViolation => "compliance_violation",
            AuditAction::CheckoutRejected => "checkout_rejected",
            AuditAction::LoyaltyAdjusted => "loyalty_adjusted",
            AuditAction::InventoryAdjusted => "inventory_adjusted",
            AuditAction::CustomerRegistered => "customer_registered",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AuditLogEntry {
    pub id: String,
    #[ts(as = "String")]
    pub occurred_at: DateTime<Utc>,
    /// Cashier, manager or `system`.
    pub actor_id: String,
    pub action: AuditAction,
    /// `transaction`, `product`, `customer`, `age_verification`.
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub severity: Severity,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    #[ts(type = "Record<string, unknown>")]
    pub details: serde_json::Value,
}

impl AuditLogEntry {
    /// Starts an entry at the action's minimum severity.
    pub fn new(
        id: String,
        occurred_at: DateTime<Utc>,
        actor_id: impl Into<String>,
        action: AuditAction,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            id,
            occurred_at,
            actor_id: actor_id.into(),
            action,
            entity_type: entity_type.into(),
            entity_id: None,
            severity: action.minimum_severity(),
            details: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Raises the severity; never lowers it below the action's floor.
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity.max(self.action.minimum_severity());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(action: AuditAction) -> AuditLogEntry {
        AuditLogEntry::new("a1".into(), Utc::now(), "cashier-1", action, "transaction")
    }

    #[test]
    fn test_compliance_actions_are_high_or_above() {
        for action in [
            AuditAction::AgeVerificationFailed,
            AuditAction::ManagerOverride,
            AuditAction::ComplianceViolation,
        ] {
            assert!(entry(action).severity.is_compliance_grade());
        }
        assert_eq!(entry(AuditAction::ManagerOverride).severity, Severity::Critical);
    }

    #[test]
    fn test_severity_cannot_drop_below_floor() {
        let e = entry(AuditAction::AgeVerificationFailed).severity(Severity::Low);
        assert_eq!(e.severity, Severity::High);

        let e = entry(AuditAction::TransactionCreated).severity(Severity::Medium);
        assert_eq!(e.severity, Severity::Medium);
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert!(!Severity::Medium.is_compliance_grade());
    }
}
