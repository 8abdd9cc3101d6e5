//! # Domain Types
//!
//! Core domain types shared by every Cinder POS crate.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │   Transaction   │   │    Customer     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id / sku       │   │  receipt_number │   │  loyalty_points │       │
//! │  │  unit_price     │   │  subtotal/tax   │   │  lifetime pts   │       │
//! │  │  on_hand        │   │  total          │   │  total_spent    │       │
//! │  │  age_restricted │   │  verification   │   │  loyalty_tier   │       │
//! │  └─────────────────┘   └────────┬────────┘   └─────────────────┘       │
//! │                                 │ 1..n                                  │
//! │                        ┌────────┴────────┐                              │
//! │                        │    LineItem     │  snapshot of product at     │
//! │                        │  name/sku/price │  sale time                  │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (sku, barcode, receipt_number) - human-readable

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::loyalty::LoyaltyTier;
use crate::money::Money;
use crate::tax::SpecialTaxCategory;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 800 bps = 8% (New York base sales tax)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Sum of two rates (a special category's sales component plus surcharge).
    #[inline]
    pub const fn plus(&self, other: TaxRate) -> TaxRate {
        TaxRate(self.0.saturating_add(other.0))
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale.
///
/// Products are never deleted while historical transactions reference them;
/// `is_active = false` is the soft-delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Barcode (EAN-13, UPC-A, etc.).
    pub barcode: Option<String>,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    /// Merchandising category ("disposables", "e-liquid", "accessories").
    pub category: Option<String>,

    /// Unit price in cents.
    pub unit_price: Money,

    /// Units on hand. Never negative.
    pub on_hand: i64,

    /// Whether selling this product requires a completed age verification.
    pub age_restricted: bool,

    /// Regulated class subject to a surcharge beyond sales tax.
    pub special_tax_category: Option<SpecialTaxCategory>,

    /// Product is exempt from sales tax.
    pub is_tax_exempt: bool,

    /// Manufacturer lot, when tracked.
    pub lot_number: Option<String>,

    /// Lot expiration, when tracked.
    #[ts(as = "Option<String>")]
    pub expiration_date: Option<NaiveDate>,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Checks if `quantity` units can be taken from stock.
    #[inline]
    pub fn has_stock_for(&self, quantity: i64) -> bool {
        self.on_hand >= quantity
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A registered loyalty customer.
///
/// ## Invariant
/// `loyalty_points == points_lifetime_earned - points_lifetime_redeemed`
/// at all times. Only [`crate::loyalty::LoyaltyMutation`] changes the three
/// counters, and it changes them together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[ts(as = "Option<String>")]
    pub date_of_birth: Option<NaiveDate>,

    /// Current redeemable balance.
    pub loyalty_points: i64,
    pub points_lifetime_earned: i64,
    pub points_lifetime_redeemed: i64,

    /// Cumulative pre-tax spend; the only input to the tier.
    pub total_spent: Money,
    pub transaction_count: i64,
    pub loyalty_tier: LoyaltyTier,
    #[ts(as = "Option<String>")]
    pub last_purchase_date: Option<DateTime<Utc>>,

    /// Customer holds a tax-exemption certificate.
    pub is_tax_exempt: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Returns true when the points balance agrees with the lifetime counters.
    pub fn ledger_balanced(&self) -> bool {
        self.loyalty_points == self.points_lifetime_earned - self.points_lifetime_redeemed
    }

    /// Display name used on receipts.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Physical cash; requires tendered amount and yields change.
    Cash,
    /// Card on an external terminal, authorised through a payment processor.
    Card,
    /// Any other external tender (gift card, mobile wallet).
    Other,
}

impl PaymentMethod {
    /// Cash is settled at the register; every other tender goes to a processor.
    pub fn is_cash(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "CASH"),
            PaymentMethod::Card => write!(f, "CARD"),
            PaymentMethod::Other => write!(f, "OTHER"),
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Distinguishes a sale from compensating records.
///
/// A committed transaction is immutable. Voids and refunds are new records
/// that point at the original through `reverses_transaction_id`.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    #[default]
    Sale,
    Void,
    Refund,
}

/// A committed checkout. Never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Transaction {
    pub id: String,
    pub store_id: String,
    /// Unique within the store.
    pub receipt_number: String,
    pub kind: TransactionKind,
    pub reverses_transaction_id: Option<String>,
    pub cashier_id: String,
    pub customer_id: Option<String>,
    pub jurisdiction: String,

    pub subtotal: Money,
    pub tax_amount: Money,
    pub exempt_amount: Money,
    pub total_amount: Money,

    pub payment_method: PaymentMethod,
    /// Processor authorisation reference for non-cash tenders.
    pub payment_reference: Option<String>,
    pub cash_tendered: Option<Money>,
    pub change_given: Option<Money>,

    pub age_verification_required: bool,
    pub age_verification_completed: bool,
    pub age_verification_id: Option<String>,

    pub loyalty_points_earned: i64,
    pub loyalty_points_redeemed: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Line Item
// =============================================================================

/// A line in a transaction.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LineItem {
    pub id: String,
    pub transaction_id: String,
    /// 1-based position on the receipt.
    pub line_number: i64,
    pub product_id: String,
    /// Name at time of sale (frozen).
    pub name: String,
    /// SKU at time of sale (frozen).
    pub sku: String,
    pub quantity: i64,
    /// Unit price at time of sale (frozen).
    pub unit_price: Money,
    /// unit_price × quantity, before tax.
    pub line_total: Money,
    pub age_verification_applied: bool,
    pub special_tax_category: Option<SpecialTaxCategory>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(800);
        assert_eq!(rate.bps(), 800);
        assert!((rate.percentage() - 8.0).abs() < 0.001);
        assert_eq!(rate.plus(TaxRate::from_bps(2000)).bps(), 2800);
    }

    #[test]
    fn test_payment_method_serializes_screaming() {
        let json = serde_json::to_string(&PaymentMethod::Cash).unwrap();
        assert_eq!(json, "\"CASH\"");
        assert!(PaymentMethod::Cash.is_cash());
        assert!(!PaymentMethod::Card.is_cash());
    }

    #[test]
    fn test_transaction_kind_default() {
        assert_eq!(TransactionKind::default(), TransactionKind::Sale);
    }
}
