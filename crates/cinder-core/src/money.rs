//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    15.99 * 0.08 = 1.2792000000000001  ❌ in binary floating point       │
//! │                                                                         │
//! │  Tax lines printed on a receipt must reconcile to the cent, and the    │
//! │  same cart must produce byte-identical tax output every time.          │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents + Basis Points                             │
//! │    1599 cents × 800 bps = 1_279_200 → /10_000 → 127.92 → 128 cents     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use cinder_core::money::Money;
//!
//! let price = Money::from_cents(1599); // $15.99
//! let line = price.checked_mul(2);      // $31.98
//! assert_eq!(line, Some(Money::from_cents(3198)));
//!
//! // Arithmetic never wraps or panics; overflow is reported as `None`.
//! assert_eq!(Money::from_cents(i64::MAX).checked_add(price), None);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents for USD).
///
/// ## Design Decisions
/// - **i64 (signed)**: compensating records (voids, refunds) carry negative totals
/// - **Single field tuple struct**: zero-cost wrapper over i64
/// - **Serialized as a bare integer**: the wire format is always cents
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Wraps a count of cents.
    ///
    /// ## Example
    /// ```rust
    /// use cinder_core::money::Money;
    ///
    /// let price = Money::from_cents(1599); // $15.99
    /// assert_eq!(price.cents(), 1599);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// `major` dollars and `minor` cents; the sign of `major` applies to both.
    ///
    /// ## Example
    /// ```rust
    /// use cinder_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(25, 0).cents(), 2500);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (dollars) portion, truncated toward zero.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Whole currency units, rounded toward negative infinity.
    ///
    /// Loyalty points are earned per whole unit spent, so $32.40 yields 32
    /// and a negative amount never rounds up to zero.
    ///
    /// ```rust
    /// use cinder_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(3240).floor_units(), 32);
    /// assert_eq!(Money::from_cents(99).floor_units(), 0);
    /// assert_eq!(Money::from_cents(-50).floor_units(), -1);
    /// ```
    #[inline]
    pub const fn floor_units(&self) -> i64 {
        self.0.div_euclid(100)
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Calculates tax at `rate`, rounding half up to the nearest cent.
    /// `None` when the tax itself does not fit in an i64.
    ///
    /// ## Implementation
    /// Integer math in i128: `(amount * bps + 5000) / 10000`.
    /// The +5000 provides rounding (5000/10000 = 0.5).
    ///
    /// ## Example
    /// ```rust
    /// use cinder_core::money::Money;
    /// use cinder_core::types::TaxRate;
    ///
    /// let price = Money::from_cents(1599);
    /// // $15.99 × 8% = $1.2792 → $1.28
    /// assert_eq!(price.calculate_tax(TaxRate::from_bps(800)), Some(Money::from_cents(128)));
    /// // $15.99 × 28% = $4.4772 → $4.48
    /// assert_eq!(price.calculate_tax(TaxRate::from_bps(2800)), Some(Money::from_cents(448)));
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Option<Money> {
        let tax_cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        i64::try_from(tax_cents).ok().map(Money)
    }

    /// Multiplies money by a quantity, `None` on overflow.
    ///
    /// ```rust
    /// use cinder_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(1599);
    /// assert_eq!(unit_price.checked_mul(3).map(|m| m.cents()), Some(4797));
    /// assert_eq!(Money::from_cents(i64::MAX / 2 + 1).checked_mul(2), None);
    /// ```
    #[inline]
    pub fn checked_mul(self, qty: i64) -> Option<Money> {
        self.0.checked_mul(qty).map(Money)
    }

    /// Checked addition, `None` on overflow.
    #[inline]
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Checked subtraction, `None` on overflow.
    #[inline]
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Sums `amounts`, `None` as soon as the running total overflows.
    pub fn checked_sum<I>(amounts: I) -> Option<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows money as `$D.CC` (debugging and log output only).
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
