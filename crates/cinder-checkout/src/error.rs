//! # Checkout Error Type
//!
//! Every failure a checkout or compliance operation can surface to the
//! inbound boundary.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CoreError (business rule) ──┐                                          │
//! │  ValidationError ────────────┼──► CheckoutError ──► code(): ErrorCode   │
//! │  DbError (persistence) ──────┤                      is_retryable()      │
//! │  ConfigError ────────────────┘                                          │
//! │                                                                         │
//! │  Rejections before the commit leave no trace in the database except    │
//! │  an audit entry. Failures during the commit roll back completely.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Boundary Serialization
//! ```json
//! { "code": "INSUFFICIENT_CASH", "message": "Insufficient cash: total $21.75, tendered $20.00" }
//! ```

use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

use cinder_core::{CoreError, Money, ValidationError};
use cinder_db::DbError;

use crate::config::ConfigError;

/// Result type alias for checkout operations.
pub type CheckoutResult<T> = Result<T, CheckoutError>;

#[derive(Debug, Error)]
pub enum CheckoutError {
    // =========================================================================
    // Cart & Catalogue
    // =========================================================================
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    #[error("Cart is empty")]
    EmptyCart,

    // =========================================================================
    // Compliance
    // =========================================================================
    #[error("Age verification required for restricted products")]
    AgeVerificationRequired,

    #[error("Age verification failed: {reason}")]
    AgeVerificationFailed { reason: String },

    #[error("Age verification not found: {0}")]
    VerificationNotFound(String),

    #[error("Manager override not permitted: {reason}")]
    OverrideNotPermitted { reason: String },

    #[error("Invalid verification state: {0}")]
    InvalidVerificationState(String),

    // =========================================================================
    // Tender & Loyalty
    // =========================================================================
    #[error("Insufficient cash: total {total}, tendered {tendered}")]
    InsufficientCash { total: Money, tendered: Money },

    #[error("Payment declined: {reason}")]
    PaymentDeclined { reason: String },

    #[error("Insufficient points: requested {requested}, available {available}")]
    InsufficientPoints { requested: i64, available: i64 },

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    // =========================================================================
    // Infrastructure
    // =========================================================================
    /// Stock changed between the read and the conditional decrement.
    #[error("Stock changed concurrently for product {product_id}")]
    ConcurrentStockConflict { product_id: String },

    #[error("Persistence failure: {message}")]
    PersistenceFailure { message: String, transient: bool },

    #[error("Checkout timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Machine-readable codes for the inbound boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ProductNotFound,
    InsufficientStock,
    EmptyCart,
    AgeVerificationRequired,
    AgeVerificationFailed,
    VerificationNotFound,
    OverrideNotPermitted,
    InvalidVerificationState,
    InsufficientCash,
    PaymentDeclined,
    InsufficientPoints,
    CustomerNotFound,
    ConcurrentStockConflict,
    PersistenceFailure,
    Timeout,
    ValidationError,
    ConfigError,
}

/// What the boundary sends when an operation fails.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl CheckoutError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CheckoutError::ProductNotFound(_) => ErrorCode::ProductNotFound,
            CheckoutError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            CheckoutError::EmptyCart => ErrorCode::EmptyCart,
            CheckoutError::AgeVerificationRequired => ErrorCode::AgeVerificationRequired,
            CheckoutError::AgeVerificationFailed { .. } => ErrorCode::AgeVerificationFailed,
            CheckoutError::VerificationNotFound(_) => ErrorCode::VerificationNotFound,
            CheckoutError::OverrideNotPermitted { .. } => ErrorCode::OverrideNotPermitted,
            CheckoutError::InvalidVerificationState(_) => ErrorCode::InvalidVerificationState,
            CheckoutError::InsufficientCash { .. } => ErrorCode::InsufficientCash,
            CheckoutError::PaymentDeclined { .. } => ErrorCode::PaymentDeclined,
            CheckoutError::InsufficientPoints { .. } => ErrorCode::InsufficientPoints,
            CheckoutError::CustomerNotFound(_) => ErrorCode::CustomerNotFound,
            CheckoutError::ConcurrentStockConflict { .. } => ErrorCode::ConcurrentStockConflict,
            CheckoutError::PersistenceFailure { .. } => ErrorCode::PersistenceFailure,
            CheckoutError::Timeout { .. } => ErrorCode::Timeout,
            CheckoutError::Validation(_) => ErrorCode::ValidationError,
            CheckoutError::Config(_) => ErrorCode::ConfigError,
        }
    }

    /// Whether the same request may succeed if simply sent again.
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutError::ConcurrentStockConflict { .. } | CheckoutError::Timeout { .. } => true,
            CheckoutError::PersistenceFailure { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Rejections that must leave a high-severity audit trail.
    pub fn is_compliance_failure(&self) -> bool {
        matches!(
            self,
            CheckoutError::AgeVerificationRequired
                | CheckoutError::AgeVerificationFailed { .. }
                | CheckoutError::OverrideNotPermitted { .. }
        )
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CheckoutError::Validation(message.into())
    }
}

impl From<CoreError> for CheckoutError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(id) => CheckoutError::ProductNotFound(id),
            CoreError::InsufficientStock {
                sku,
                available,
                requested,
            } => CheckoutError::InsufficientStock {
                sku,
                available,
                requested,
            },
            CoreError::EmptyCart => CheckoutError::EmptyCart,
            CoreError::AgeVerificationRequired => CheckoutError::AgeVerificationRequired,
            CoreError::AgeVerificationFailed { reason } => CheckoutError::AgeVerificationFailed { reason },
            CoreError::VerificationNotFound(id) => CheckoutError::VerificationNotFound(id),
            CoreError::OverrideNotPermitted { reason } => CheckoutError::OverrideNotPermitted { reason },
            e @ CoreError::InvalidVerificationTransition { .. } => {
                CheckoutError::InvalidVerificationState(e.to_string())
            }
            CoreError::InsufficientCash { total, tendered } => {
                CheckoutError::InsufficientCash { total, tendered }
            }
            CoreError::InsufficientPoints { requested, available } => {
                CheckoutError::InsufficientPoints { requested, available }
            }
            CoreError::CustomerNotFound(id) => CheckoutError::CustomerNotFound(id),
            e @ (CoreError::CartTooLarge { .. }
            | CoreError::NegativeAmount { .. }
            | CoreError::AmountOverflow { .. }) => {
                CheckoutError::Validation(e.to_string())
            }
            CoreError::Validation(e) => CheckoutError::Validation(e.to_string()),
        }
    }
}

impl From<ValidationError> for CheckoutError {
    fn from(err: ValidationError) -> Self {
        CheckoutError::Validation(err.to_string())
    }
}

impl From<DbError> for CheckoutError {
    fn from(err: DbError) -> Self {
        CheckoutError::PersistenceFailure {
            transient: err.is_transient(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_serialize_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::AgeVerificationRequired).unwrap();
        assert_eq!(json, "\"AGE_VERIFICATION_REQUIRED\"");

        let response = CheckoutError::EmptyCart.to_response();
        assert_eq!(response.code, ErrorCode::EmptyCart);
        assert_eq!(response.message, "Cart is empty");
        assert!(!response.retryable);
    }

    #[test]
    fn test_retryability() {
        assert!(CheckoutError::ConcurrentStockConflict { product_id: "p".into() }.is_retryable());
        assert!(CheckoutError::Timeout { after_ms: 10 }.is_retryable());
        assert!(CheckoutError::from(DbError::Busy("locked".into())).is_retryable());
        assert!(!CheckoutError::from(DbError::ConstraintViolation { message: "x".into() }).is_retryable());
        assert!(!CheckoutError::AgeVerificationRequired.is_retryable());
    }

    #[test]
    fn test_core_errors_keep_their_kind() {
        let err: CheckoutError = CoreError::InsufficientPoints { requested: 500, available: 300 }.into();
        assert_eq!(err.code(), ErrorCode::InsufficientPoints);

        let err: CheckoutError = CoreError::CartTooLarge { max: 100 }.into();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err: CheckoutError = CoreError::AmountOverflow { field: "subtotal".into() }.into();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(!err.is_retryable());

        assert!(CheckoutError::AgeVerificationFailed { reason: "under 21".into() }.is_compliance_failure());
        assert!(!CheckoutError::EmptyCart.is_compliance_failure());
    }
}
