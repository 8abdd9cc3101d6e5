//! # cinder-core: Pure Business Logic for Cinder POS
//!
//! Every compliance rule of an age-restricted retail register lives here as a
//! pure function: tax, age adjudication, loyalty arithmetic and receipts.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Cinder POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 cinder-checkout (orchestration)                 │   │
//! │  │     checkout, age verification service, loyalty service        │   │
//! │  └──────────────┬──────────────────────────────┬───────────────────┘   │
//! │                 │                              │                        │
//! │  ┌──────────────▼──────────────────────────────▼───────────────────┐   │
//! │  │               ★ cinder-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────┐           │   │
//! │  │   │   tax   │  │   age   │  │ loyalty │  │  audit  │           │   │
//! │  │   │ breakdwn│  │ attempt │  │  tiers  │  │ severity│           │   │
//! │  │   └─────────┘  └─────────┘  └─────────┘  └─────────┘           │   │
//! │  │   ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌──────────┐          │   │
//! │  │   │  money  │  │  types  │  │ receipt │  │validation│          │   │
//! │  │   └─────────┘  └─────────┘  └─────────┘  └──────────┘          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               cinder-db / cinder-audit (I/O layers)             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Customer, Transaction, LineItem)
//! - [`money`] - Money type with integer arithmetic
//! - [`tax`] - Tax Engine
//! - [`age`] - Age Verification Adjudicator
//! - [`loyalty`] - Loyalty Ledger
//! - [`audit`] - Audit entry model and severity floors
//! - [`receipt`] - Receipt projection
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use cinder_core::money::Money;
//! use cinder_core::tax::{compute_tax, JurisdictionTable, TaxLineInput};
//!
//! let lines = [TaxLineInput::new(Money::from_cents(3000))];
//! let tax = compute_tax(&lines, None, false, &JurisdictionTable::builtin()).unwrap();
//!
//! // Unknown jurisdiction falls back to 8%
//! assert_eq!(tax.total_amount.cents(), 3240);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod age;
pub mod audit;
pub mod error;
pub mod loyalty;
pub mod money;
pub mod receipt;
pub mod tax;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines in a single checkout.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single line.
///
/// Catches keying errors like 1000 instead of 10.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Highest unit price a product may carry: $1,000,000.00.
///
/// A full cart at this price, taxed at twice the highest allowed rate,
/// stays far inside i64 cents.
pub const MAX_PRICE_CENTS: i64 = 100_000_000;
