//! # Receipt Projection
//!
//! Read-only view of a committed transaction plus store metadata, ready for
//! a printing or e-mail collaborator.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  STORE HEADER                │  name, address lines, phone
//! │  receipt no. / date / cashier│
//! ├──────────────────────────────┤
//! │  ITEMS                       │  qty × name @ price = line total
//! ├──────────────────────────────┤
//! │  Subtotal                    │
//! │  Sales Tax  8.00%            │  one row per breakdown line
//! │  Tobacco Tax 28.00%          │
//! │  TOTAL                       │
//! ├──────────────────────────────┤
//! │  PAYMENT  tendered / change  │
//! │  LOYALTY  earned / balance   │
//! │  footer                      │
//! └──────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::loyalty::LoyaltyTier;
use crate::money::Money;
use crate::tax::TaxBreakdownLine;
use crate::types::{Customer, LineItem, PaymentMethod, Transaction, TransactionKind};

/// Store header data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StoreInfo {
    pub store_id: String,
    pub name: String,
    pub address_lines: Vec<String>,
    pub phone: Option<String>,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiptLine {
    pub quantity: i64,
    pub name: String,
    pub sku: String,
    pub unit_price: Money,
    pub line_total: Money,
    /// Marked on the printout for restricted items.
    pub age_restricted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiptTaxLine {
    pub label: String,
    pub rate_bps: u32,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiptPayment {
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub tendered: Option<Money>,
    pub change: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiptLoyalty {
    pub customer_name: String,
    pub points_earned: i64,
    pub points_redeemed: i64,
    pub points_balance: i64,
    pub tier: LoyaltyTier,
}

/// Structured receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Receipt {
    pub store: StoreInfo,
    pub receipt_number: String,
    pub kind: TransactionKind,
    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,
    pub cashier_id: String,
    pub lines: Vec<ReceiptLine>,
    pub subtotal: Money,
    pub tax_lines: Vec<ReceiptTaxLine>,
    pub tax_total: Money,
    pub exempt_amount: Money,
    pub total: Money,
    pub payment: ReceiptPayment,
    pub age_verified: bool,
    pub loyalty: Option<ReceiptLoyalty>,
}

impl Receipt {
    /// Builds the receipt. `customer` is the post-commit customer, if any.
    ///
    /// Lines are ordered by `line_number` regardless of input order.
    pub fn project(
        store: &StoreInfo,
        transaction: &Transaction,
        line_items: &[LineItem],
        tax_breakdown: &[TaxBreakdownLine],
        customer: Option<&Customer>,
    ) -> Self {
        let mut items: Vec<&LineItem> = line_items.iter().collect();
        items.sort_by_key(|item| item.line_number);

        let lines = items
            .into_iter()
            .map(|item| ReceiptLine {
                quantity: item.quantity,
                name: item.name.clone(),
                sku: item.sku.clone(),
                unit_price: item.unit_price,
                line_total: item.line_total,
                age_restricted: item.age_verification_applied,
            })
            .collect();

        let tax_lines = tax_breakdown
            .iter()
            .map(|line| ReceiptTaxLine {
                label: line.tax_type.label().to_string(),
                rate_bps: line.rate.bps(),
                amount: line.tax_amount,
            })
            .collect();

        let loyalty = customer.map(|c| ReceiptLoyalty {
            customer_name: c.display_name(),
            points_earned: transaction.loyalty_points_earned,
            points_redeemed: transaction.loyalty_points_redeemed,
            points_balance: c.loyalty_points,
            tier: c.loyalty_tier,
        });

        Self {
            store: store.clone(),
            receipt_number: transaction.receipt_number.clone(),
            kind: transaction.kind,
            issued_at: transaction.created_at,
            cashier_id: transaction.cashier_id.clone(),
            lines,
            subtotal: transaction.subtotal,
            tax_lines,
            tax_total: transaction.tax_amount,
            exempt_amount: transaction.exempt_amount,
            total: transaction.total_amount,
            payment: ReceiptPayment {
                method: transaction.payment_method,
                reference: transaction.payment_reference.clone(),
                tendered: transaction.cash_tendered,
                change: transaction.change_given,
            },
            age_verified: transaction.age_verification_completed,
            loyalty,
        }
    }
}
