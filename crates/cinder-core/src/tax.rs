//! # Tax Engine
//!
//! Jurisdiction-aware tax computation with special-category surcharges.
//!
//! ## Computation Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  compute_tax(lines, jurisdiction, customer_exempt, table)               │
//! │                                                                         │
//! │  lines ──► exempt? ──yes──► exempt_amount                               │
//! │              │                                                          │
//! │              no                                                         │
//! │              ▼                                                          │
//! │        taxable_amount ──► × base rate ─────────► SALES_TAX line         │
//! │              │                                                          │
//! │              └─ special category lines, grouped per category:           │
//! │                 Σ amount × (base + surcharge) ──► TOBACCO / VAPOR line  │
//! │                                                                         │
//! │  Each breakdown line is rounded to the cent, then the lines are summed  │
//! │  in a fixed order (sales tax first, then categories in enum order).     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Worked Example (New York, 8% base, 20% tobacco surcharge)
//! ```text
//! 1 × tobacco product @ $15.99
//!   SALES_TAX  800 bps on $15.99  = $1.2792 → $1.28
//!   TOBACCO   2800 bps on $15.99  = $4.4772 → $4.48
//!   ─────────────────────────────────────────────
//!   total tax                              $5.76
//! ```
//!
//! A regulated line therefore carries the store's sales tax once on the whole
//! taxable base and again inside its category line, which is how the
//! category-specific tax is levied and itemised on the receipt.
//!
//! Everything here is a pure function of its inputs: no clock, no I/O, and
//! `BTreeMap` ordering wherever iteration order reaches the output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::TaxRate;

/// Base rate used when a jurisdiction is absent or unknown.
pub const DEFAULT_BASE_RATE: TaxRate = TaxRate::from_bps(800);

// =============================================================================
// Categories
// =============================================================================

/// A regulated product class that carries a tax beyond ordinary sales tax.
///
/// The variant order is the itemisation order on receipts.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SpecialTaxCategory {
    Tobacco,
    Vapor,
}

impl SpecialTaxCategory {
    pub const ALL: [SpecialTaxCategory; 2] = [SpecialTaxCategory::Tobacco, SpecialTaxCategory::Vapor];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialTaxCategory::Tobacco => "tobacco",
            SpecialTaxCategory::Vapor => "vapor",
        }
    }
}

/// Kind of a receipt tax line.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaxType {
    SalesTax,
    Tobacco,
    Vapor,
}

impl TaxType {
    /// Label printed on the receipt.
    pub fn label(&self) -> &'static str {
        match self {
            TaxType::SalesTax => "Sales Tax",
            TaxType::Tobacco => "Tobacco Tax",
            TaxType::Vapor => "Vapor Tax",
        }
    }
}

impl From<SpecialTaxCategory> for TaxType {
    fn from(category: SpecialTaxCategory) -> Self {
        match category {
            SpecialTaxCategory::Tobacco => TaxType::Tobacco,
            SpecialTaxCategory::Vapor => TaxType::Vapor,
        }
    }
}

// =============================================================================
// Jurisdictions
// =============================================================================

/// Rates for one tax authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionRates {
    pub base_rate: TaxRate,
    /// Surcharge per regulated category, on top of `base_rate`.
    #[serde(default)]
    pub special: BTreeMap<SpecialTaxCategory, TaxRate>,
}

impl JurisdictionRates {
    pub fn new(base_rate: TaxRate) -> Self {
        Self {
            base_rate,
            special: BTreeMap::new(),
        }
    }

    pub fn with_surcharge(mut self, category: SpecialTaxCategory, surcharge: TaxRate) -> Self {
        self.special.insert(category, surcharge);
        self
    }

    pub fn surcharge(&self, category: SpecialTaxCategory) -> Option<TaxRate> {
        self.special.get(&category).copied()
    }
}

/// Lookup table keyed by upper-case jurisdiction code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JurisdictionTable {
    entries: BTreeMap<String, JurisdictionRates>,
}

impl JurisdictionTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The jurisdictions every store ships with.
    ///
    /// | Code | Base   | Tobacco | Vapor |
    /// |------|--------|---------|-------|
    /// | NY   | 8.00%  | 20%     | 20%   |
    /// | NJ   | 6.63%  | 30%     | 10%   |
    /// | CA   | 7.25%  | 50%     | 50%   |
    /// | TX   | 6.25%  | -       | -     |
    /// | FL   | 6.00%  | -       | -     |
    pub fn builtin() -> Self {
        use SpecialTaxCategory::{Tobacco, Vapor};

        let mut table = Self::empty();
        table.insert(
            "NY",
            JurisdictionRates::new(TaxRate::from_bps(800))
                .with_surcharge(Tobacco, TaxRate::from_bps(2000))
                .with_surcharge(Vapor, TaxRate::from_bps(2000)),
        );
        table.insert(
            "NJ",
            JurisdictionRates::new(TaxRate::from_bps(663))
                .with_surcharge(Tobacco, TaxRate::from_bps(3000))
                .with_surcharge(Vapor, TaxRate::from_bps(1000)),
        );
        table.insert(
            "CA",
            JurisdictionRates::new(TaxRate::from_bps(725))
                .with_surcharge(Tobacco, TaxRate::from_bps(5000))
                .with_surcharge(Vapor, TaxRate::from_bps(5000)),
        );
        table.insert("TX", JurisdictionRates::new(TaxRate::from_bps(625)));
        table.insert("FL", JurisdictionRates::new(TaxRate::from_bps(600)));
        table
    }

    /// Adds or replaces a jurisdiction.
    pub fn insert(&mut self, code: &str, rates: JurisdictionRates) {
        self.entries.insert(normalize_code(code), rates);
    }

    pub fn get(&self, code: &str) -> Option<&JurisdictionRates> {
        self.entries.get(&normalize_code(code))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Rates for `code`, or the default rate with no surcharges.
    ///
    /// The flag is true when the fallback was used.
    pub fn resolve(&self, code: Option<&str>) -> (JurisdictionRates, bool) {
        match code.and_then(|c| self.get(c)) {
            Some(rates) => (rates.clone(), false),
            None => (JurisdictionRates::new(DEFAULT_BASE_RATE), true),
        }
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

// =============================================================================
// Inputs & Outputs
// =============================================================================

/// One taxable amount (normally a cart line total).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLineInput {
    pub amount: Money,
    /// Merchandising category, informational only.
    pub category: Option<String>,
    pub special_category: Option<SpecialTaxCategory>,
    pub is_exempt: bool,
}

impl TaxLineInput {
    pub fn new(amount: Money) -> Self {
        Self {
            amount,
            category: None,
            special_category: None,
            is_exempt: false,
        }
    }

    pub fn special(mut self, category: SpecialTaxCategory) -> Self {
        self.special_category = Some(category);
        self
    }

    pub fn exempt(mut self) -> Self {
        self.is_exempt = true;
        self
    }
}

/// One itemised tax line on a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TaxBreakdownLine {
    pub tax_type: TaxType,
    pub rate: TaxRate,
    pub taxable_amount: Money,
    pub tax_amount: Money,
}

/// Result of [`compute_tax`].
///
/// ## Reconciliation
/// - `subtotal == taxable_amount + exempt_amount`
/// - `total_tax_amount == Σ breakdown[i].tax_amount`
/// - `total_amount == subtotal + total_tax_amount`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxComputation {
    pub jurisdiction: Option<String>,
    pub subtotal: Money,
    pub taxable_amount: Money,
    pub exempt_amount: Money,
    pub total_tax_amount: Money,
    pub total_amount: Money,
    /// Jurisdiction missing or unknown; `DEFAULT_BASE_RATE` was applied.
    pub used_default_rate: bool,
    pub breakdown: Vec<TaxBreakdownLine>,
}

// =============================================================================
// Engine
// =============================================================================

/// Computes tax for a set of lines.
///
/// ## Rules
/// - `customer_exempt`: no tax, the whole subtotal is exempt, empty breakdown
/// - exempt lines count toward `exempt_amount` and nothing else
/// - the base rate applies to the whole taxable amount
/// - each special category with a surcharge in the jurisdiction adds one
///   line taxed at `base + surcharge` on the sum of that category's amounts
/// - negative amounts are rejected
///
/// ## Example
/// ```rust
/// use cinder_core::money::Money;
/// use cinder_core::tax::{compute_tax, JurisdictionTable, SpecialTaxCategory, TaxLineInput};
///
/// let lines = [TaxLineInput::new(Money::from_cents(1599)).special(SpecialTaxCategory::Tobacco)];
/// let result = compute_tax(&lines, Some("NY"), false, &JurisdictionTable::builtin()).unwrap();
/// assert_eq!(result.total_tax_amount.cents(), 576);
/// assert_eq!(result.total_amount.cents(), 2175);
/// ```
pub fn compute_tax(
    lines: &[TaxLineInput],
    jurisdiction: Option<&str>,
    customer_exempt: bool,
    table: &JurisdictionTable,
) -> CoreResult<TaxComputation> {
    for line in lines {
        if line.amount.is_negative() {
            return Err(CoreError::NegativeAmount {
                field: "line amount".to_string(),
                amount: line.amount,
            });
        }
    }

    let subtotal = Money::checked_sum(lines.iter().map(|l| l.amount)).ok_or_else(|| overflow("subtotal"))?;
    let jurisdiction = jurisdiction
        .map(normalize_code)
        .filter(|code| !code.is_empty());
    let (rates, used_default_rate) = table.resolve(jurisdiction.as_deref());

    if customer_exempt {
        return Ok(TaxComputation {
            jurisdiction,
            subtotal,
            taxable_amount: Money::zero(),
            exempt_amount: subtotal,
            total_tax_amount: Money::zero(),
            total_amount: subtotal,
            used_default_rate,
            breakdown: Vec::new(),
        });
    }

    let mut exempt_amount = Money::zero();
    let mut taxable_amount = Money::zero();
    let mut by_category: BTreeMap<SpecialTaxCategory, Money> = BTreeMap::new();

    for line in lines {
        if line.is_exempt {
            exempt_amount = add(exempt_amount, line.amount, "exempt amount")?;
            continue;
        }
        taxable_amount = add(taxable_amount, line.amount, "taxable amount")?;
        if let Some(category) = line.special_category {
            let sum = by_category.entry(category).or_default();
            *sum = add(*sum, line.amount, "category amount")?;
        }
    }

    let mut breakdown = Vec::with_capacity(1 + by_category.len());

    if taxable_amount.is_positive() && !rates.base_rate.is_zero() {
        breakdown.push(TaxBreakdownLine {
            tax_type: TaxType::SalesTax,
            rate: rates.base_rate,
            taxable_amount,
            tax_amount: taxable_amount
                .calculate_tax(rates.base_rate)
                .ok_or_else(|| overflow("sales tax"))?,
        });
    }

    for (category, amount) in by_category {
        let Some(surcharge) = rates.surcharge(category) else {
            continue;
        };
        if amount.is_zero() {
            continue;
        }
        let rate = rates.base_rate.plus(surcharge);
        breakdown.push(TaxBreakdownLine {
            tax_type: category.into(),
            rate,
            taxable_amount: amount,
            tax_amount: amount.calculate_tax(rate).ok_or_else(|| overflow("surcharge"))?,
        });
    }

    let total_tax_amount =
        Money::checked_sum(breakdown.iter().map(|l| l.tax_amount)).ok_or_else(|| overflow("total tax"))?;
    let total_amount = add(subtotal, total_tax_amount, "total amount")?;

    Ok(TaxComputation {
        jurisdiction,
        subtotal,
        taxable_amount,
        exempt_amount,
        total_tax_amount,
        total_amount,
        used_default_rate,
        breakdown,
    })
}

fn add(a: Money, b: Money, field: &str) -> CoreResult<Money> {
    a.checked_add(b).ok_or_else(|| overflow(field))
}

fn overflow(field: &str) -> CoreError {
    CoreError::AmountOverflow {
        field: field.to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table() -> JurisdictionTable {
        JurisdictionTable::builtin()
    }

    #[test]
    fn test_ny_tobacco_line() {
        let lines = [TaxLineInput::new(Money::from_cents(1599)).special(SpecialTaxCategory::Tobacco)];
        let result = compute_tax(&lines, Some("NY"), false, &table()).unwrap();

        assert_eq!(result.subtotal.cents(), 1599);
        assert_eq!(result.breakdown.len(), 2);
        assert_eq!(result.breakdown[0].tax_type, TaxType::SalesTax);
        assert_eq!(result.breakdown[0].tax_amount.cents(), 128);
        assert_eq!(result.breakdown[1].tax_type, TaxType::Tobacco);
        assert_eq!(result.breakdown[1].rate.bps(), 2800);
        assert_eq!(result.breakdown[1].tax_amount.cents(), 448);
        assert_eq!(result.total_tax_amount.cents(), 576);
        assert_eq!(result.total_amount.cents(), 2175);
        assert!(!result.used_default_rate);
    }

    #[test]
    fn test_unknown_jurisdiction_uses_default() {
        let lines = [TaxLineInput::new(Money::from_cents(3000))];
        let result = compute_tax(&lines, None, false, &table()).unwrap();
        assert!(result.used_default_rate);
        assert_eq!(result.total_tax_amount.cents(), 240);
        assert_eq!(result.total_amount.cents(), 3240);

        let result = compute_tax(&lines, Some("ZZ"), false, &table()).unwrap();
        assert!(result.used_default_rate);
        assert_eq!(result.jurisdiction.as_deref(), Some("ZZ"));
        assert_eq!(result.total_tax_amount.cents(), 240);
    }

    #[test]
    fn test_default_has_no_surcharge() {
        let lines = [TaxLineInput::new(Money::from_cents(1000)).special(SpecialTaxCategory::Vapor)];
        let result = compute_tax(&lines, Some("ZZ"), false, &table()).unwrap();
        assert_eq!(result.breakdown.len(), 1);
        assert_eq!(result.total_tax_amount.cents(), 80);
    }

    #[test]
    fn test_jurisdiction_code_is_case_insensitive() {
        let lines = [TaxLineInput::new(Money::from_cents(1000))];
        let upper = compute_tax(&lines, Some("NJ"), false, &table()).unwrap();
        let lower = compute_tax(&lines, Some(" nj "), false, &table()).unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.total_tax_amount.cents(), 66);
    }

    #[test]
    fn test_customer_exempt() {
        let lines = [
            TaxLineInput::new(Money::from_cents(1599)).special(SpecialTaxCategory::Tobacco),
            TaxLineInput::new(Money::from_cents(500)),
        ];
        let result = compute_tax(&lines, Some("NY"), true, &table()).unwrap();
        assert!(result.total_tax_amount.is_zero());
        assert_eq!(result.exempt_amount.cents(), 2099);
        assert_eq!(result.total_amount.cents(), 2099);
        assert!(result.breakdown.is_empty());
    }

    #[test]
    fn test_exempt_line_excluded_from_base() {
        let lines = [
            TaxLineInput::new(Money::from_cents(1000)),
            TaxLineInput::new(Money::from_cents(1000))
                .special(SpecialTaxCategory::Tobacco)
                .exempt(),
        ];
        let result = compute_tax(&lines, Some("NY"), false, &table()).unwrap();
        assert_eq!(result.exempt_amount.cents(), 1000);
        assert_eq!(result.taxable_amount.cents(), 1000);
        assert_eq!(result.breakdown.len(), 1);
        assert_eq!(result.total_tax_amount.cents(), 80);
    }

    #[test]
    fn test_categories_grouped_and_ordered() {
        let lines = [
            TaxLineInput::new(Money::from_cents(1000)).special(SpecialTaxCategory::Vapor),
            TaxLineInput::new(Money::from_cents(500)).special(SpecialTaxCategory::Tobacco),
            TaxLineInput::new(Money::from_cents(1000)).special(SpecialTaxCategory::Vapor),
        ];
        let result = compute_tax(&lines, Some("NJ"), false, &table()).unwrap();
        let types: Vec<TaxType> = result.breakdown.iter().map(|l| l.tax_type).collect();
        assert_eq!(types, vec![TaxType::SalesTax, TaxType::Tobacco, TaxType::Vapor]);
        assert_eq!(result.breakdown[2].taxable_amount.cents(), 2000);
    }

    #[test]
    fn test_negative_amount_rejected() {
        let lines = [TaxLineInput::new(Money::from_cents(-100))];
        let err = compute_tax(&lines, Some("NY"), false, &table()).unwrap_err();
        assert!(matches!(err, CoreError::NegativeAmount { .. }));
    }

    #[test]
    fn test_amounts_beyond_i64_are_rejected() {
        // Two lines whose sum does not fit.
        let lines = [
            TaxLineInput::new(Money::from_cents(i64::MAX / 2 + 1)),
            TaxLineInput::new(Money::from_cents(i64::MAX / 2 + 1)),
        ];
        let err = compute_tax(&lines, Some("NY"), false, &table()).unwrap_err();
        assert!(matches!(err, CoreError::AmountOverflow { ref field } if field == "subtotal"), "{err:?}");

        // The subtotal fits but adding the tax does not.
        let lines = [TaxLineInput::new(Money::from_cents(i64::MAX - 10))];
        let err = compute_tax(&lines, Some("NY"), false, &table()).unwrap_err();
        assert!(matches!(err, CoreError::AmountOverflow { ref field } if field == "total amount"), "{err:?}");

        // Exempt customers pay no tax, so the same subtotal is fine.
        let result = compute_tax(&lines, Some("NY"), true, &table()).unwrap();
        assert_eq!(result.total_amount.cents(), i64::MAX - 10);
    }

    #[test]
    fn test_override_entry() {
        let mut table = table();
        table.insert("tx", JurisdictionRates::new(TaxRate::from_bps(700)));
        assert_eq!(table.get("TX").unwrap().base_rate.bps(), 700);
    }

    fn arb_line() -> impl Strategy<Value = TaxLineInput> {
        (
            0i64..500_000,
            prop_oneof![
                Just(None),
                Just(Some(SpecialTaxCategory::Tobacco)),
                Just(Some(SpecialTaxCategory::Vapor)),
            ],
            any::<bool>(),
        )
            .prop_map(|(cents, special, is_exempt)| TaxLineInput {
                amount: Money::from_cents(cents),
                category: None,
                special_category: special,
                is_exempt,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn prop_compute_tax_is_deterministic(
            lines in prop::collection::vec(arb_line(), 0..20),
            jurisdiction in prop_oneof![Just("NY"), Just("NJ"), Just("CA"), Just("TX"), Just("??")],
            customer_exempt in any::<bool>(),
        ) {
            let table = JurisdictionTable::builtin();
            let a = compute_tax(&lines, Some(jurisdiction), customer_exempt, &table).unwrap();
            let b = compute_tax(&lines, Some(jurisdiction), customer_exempt, &table).unwrap();
            prop_assert_eq!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());
        }

        #[test]
        fn prop_totals_reconcile(
            lines in prop::collection::vec(arb_line(), 0..20),
            customer_exempt in any::<bool>(),
        ) {
            let result = compute_tax(&lines, Some("NY"), customer_exempt, &JurisdictionTable::builtin()).unwrap();
            let breakdown_sum = Money::checked_sum(result.breakdown.iter().map(|l| l.tax_amount));
            prop_assert_eq!(Some(result.subtotal), result.taxable_amount.checked_add(result.exempt_amount));
            prop_assert_eq!(Some(result.total_tax_amount), breakdown_sum);
            prop_assert_eq!(Some(result.total_amount), result.subtotal.checked_add(result.total_tax_amount));
        }
    }
}
