//! # Error Types
//!
//! Domain-specific error types for cinder-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  cinder-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations (stock, age, cash)    │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  cinder-db errors                                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  cinder-checkout errors                                                 │
//! │  └── CheckoutError    - What the inbound boundary sees (with a code)   │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → CheckoutError → caller            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
///
/// Every variant is raised before any mutation happens, so the caller can
/// surface it verbatim and the register state is unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Product id is unknown or the product has been deactivated.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Insufficient stock to complete sale.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout (qty: 5)
    ///      │
    ///      ▼
    /// Check stock: on_hand=3
    ///      │
    ///      ▼
    /// InsufficientStock { sku: "DISPO-MINT", available: 3, requested: 5 }
    /// ```
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// Checkout was attempted with no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// Cart contains an age-restricted product but no completed verification.
    #[error("Age verification required for restricted products")]
    AgeVerificationRequired,

    /// The referenced verification failed and was not overridden.
    #[error("Age verification failed: {reason}")]
    AgeVerificationFailed { reason: String },

    /// Verification record id is unknown.
    #[error("Age verification not found: {0}")]
    VerificationNotFound(String),

    /// Verification attempt state machine was driven out of order.
    #[error("Invalid verification transition: {from} -> {to}")]
    InvalidVerificationTransition {
        from: &'static str,
        to: &'static str,
    },

    /// Manager override was requested where policy forbids it.
    #[error("Manager override not permitted: {reason}")]
    OverrideNotPermitted { reason: String },

    /// Cash tendered does not cover the total.
    #[error("Insufficient cash: total {total}, tendered {tendered}")]
    InsufficientCash { total: Money, tendered: Money },

    /// Redemption exceeds the customer's balance.
    #[error("Insufficient points: requested {requested}, available {available}")]
    InsufficientPoints { requested: i64, available: i64 },

    /// Customer id is unknown.
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// A monetary input that must not be negative was negative.
    #[error("{field} must not be negative (got {amount})")]
    NegativeAmount { field: String, amount: Money },

    /// A computed amount does not fit in the money representation.
    #[error("{field} is too large to represent")]
    AmountOverflow { field: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
