//! # Loyalty Ledger
//!
//! Point and tier arithmetic over a customer's lifetime aggregates.
//!
//! ## Tiers
//! ```text
//! total_spent   0 ──────── 500 ──────── 2,000 ──────── 5,000 ──────── ∞
//!                 BRONZE        SILVER          GOLD          PLATINUM
//! ```
//!
//! The tier is derived from `total_spent` every time it changes; it is never
//! stepped up or down incrementally.
//!
//! ## Balance Invariant
//! `loyalty_points == points_lifetime_earned - points_lifetime_redeemed`.
//! The only way to change those counters is a [`LoyaltyMutation`], and every
//! mutation moves the balance and exactly one lifetime counter together.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::Customer;
use crate::validation::validate_points;

/// Lower bound of SILVER, in cents.
pub const SILVER_THRESHOLD: Money = Money::from_cents(50_000);
/// Lower bound of GOLD, in cents.
pub const GOLD_THRESHOLD: Money = Money::from_cents(200_000);
/// Lower bound of PLATINUM, in cents.
pub const PLATINUM_THRESHOLD: Money = Money::from_cents(500_000);

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoyaltyTier {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl LoyaltyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoyaltyTier::Bronze => "BRONZE",
            LoyaltyTier::Silver => "SILVER",
            LoyaltyTier::Gold => "GOLD",
            LoyaltyTier::Platinum => "PLATINUM",
        }
    }
}

impl std::fmt::Display for LoyaltyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier for a cumulative spend.
///
/// ```rust
/// use cinder_core::loyalty::{tier_for, LoyaltyTier};
/// use cinder_core::money::Money;
///
/// assert_eq!(tier_for(Money::from_cents(48_000)), LoyaltyTier::Bronze);
/// assert_eq!(tier_for(Money::from_cents(51_000)), LoyaltyTier::Silver);
/// ```
pub fn tier_for(total_spent: Money) -> LoyaltyTier {
    if total_spent >= PLATINUM_THRESHOLD {
        LoyaltyTier::Platinum
    } else if total_spent >= GOLD_THRESHOLD {
        LoyaltyTier::Gold
    } else if total_spent >= SILVER_THRESHOLD {
        LoyaltyTier::Silver
    } else {
        LoyaltyTier::Bronze
    }
}

// =============================================================================
// Accrual & Redemption
// =============================================================================

/// Outcome of a purchase for the attached customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LoyaltyAccrual {
    pub points_earned: i64,
    pub new_total_spent: Money,
    pub previous_tier: LoyaltyTier,
    pub new_tier: LoyaltyTier,
}

impl LoyaltyAccrual {
    pub fn tier_changed(&self) -> bool {
        self.previous_tier != self.new_tier
    }

    /// The mutation to persist, if any points were earned.
    pub fn mutation(&self) -> Option<LoyaltyMutation> {
        (self.points_earned > 0).then_some(LoyaltyMutation::EarnPoints {
            amount: self.points_earned,
        })
    }
}

/// Computes points and the post-purchase tier.
///
/// `points_basis` is the transaction total (one point per whole unit).
/// `spend` is what the purchase adds to `total_spent` (the pre-tax subtotal).
///
/// ```rust
/// # use cinder_core::loyalty::*;
/// # use cinder_core::money::Money;
/// # fn customer_with_spent(c: i64) -> cinder_core::types::Customer {
/// #     let now = chrono::Utc::now();
/// #     cinder_core::types::Customer {
/// #         id: "c".into(), first_name: "A".into(), last_name: "B".into(),
/// #         email: None, phone: None, date_of_birth: None,
/// #         loyalty_points: 0, points_lifetime_earned: 0, points_lifetime_redeemed: 0,
/// #         total_spent: Money::from_cents(c), transaction_count: 0,
/// #         loyalty_tier: tier_for(Money::from_cents(c)), last_purchase_date: None,
/// #         is_tax_exempt: false, created_at: now, updated_at: now,
/// #     }
/// # }
/// let customer = customer_with_spent(48_000);
/// let accrual = accrue_on_purchase(&customer, Money::from_cents(3240), Money::from_cents(3000)).unwrap();
/// assert_eq!(accrual.points_earned, 32);
/// assert_eq!(accrual.new_total_spent.cents(), 51_000);
/// assert_eq!(accrual.new_tier, LoyaltyTier::Silver);
/// ```
pub fn accrue_on_purchase(customer: &Customer, points_basis: Money, spend: Money) -> CoreResult<LoyaltyAccrual> {
    let points_earned = points_basis.floor_units().max(0);
    let new_total_spent = customer
        .total_spent
        .checked_add(spend)
        .ok_or_else(|| CoreError::AmountOverflow {
            field: "total_spent".to_string(),
        })?;

    Ok(LoyaltyAccrual {
        points_earned,
        new_total_spent,
        previous_tier: customer.loyalty_tier,
        new_tier: tier_for(new_total_spent),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LoyaltyRedemption {
    pub points_redeemed: i64,
    pub new_balance: i64,
}

/// Checks a redemption against the balance without changing anything.
pub fn redeem(customer: &Customer, points: i64) -> CoreResult<LoyaltyRedemption> {
    validate_points(points)?;

    if points > customer.loyalty_points {
        return Err(CoreError::InsufficientPoints {
            requested: points,
            available: customer.loyalty_points,
        });
    }

    Ok(LoyaltyRedemption {
        points_redeemed: points,
        new_balance: customer.loyalty_points - points,
    })
}

// =============================================================================
// Mutations
// =============================================================================

/// The closed set of changes to a customer's point counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoyaltyMutation {
    EarnPoints { amount: i64 },
    RedeemPoints { amount: i64 },
}

impl LoyaltyMutation {
    pub fn amount(&self) -> i64 {
        match self {
            LoyaltyMutation::EarnPoints { amount } | LoyaltyMutation::RedeemPoints { amount } => {
                *amount
            }
        }
    }

    /// Signed change to the balance.
    pub fn balance_delta(&self) -> i64 {
        match self {
            LoyaltyMutation::EarnPoints { amount } => *amount,
            LoyaltyMutation::RedeemPoints { amount } => -*amount,
        }
    }

    /// Rejects non-positive amounts and overdrafts against `balance`.
    pub fn check(&self, balance: i64) -> CoreResult<()> {
        validate_points(self.amount())?;
        if let LoyaltyMutation::RedeemPoints { amount } = self {
            if *amount > balance {
                return Err(CoreError::InsufficientPoints {
                    requested: *amount,
                    available: balance,
                });
            }
        }
        Ok(())
    }

    /// Applies the mutation in memory. The database applies the same change
    /// with relative increments; this is the reference for that SQL.
    pub fn apply_to(&self, customer: &mut Customer) -> CoreResult<()> {
        self.check(customer.loyalty_points)?;
        customer.loyalty_points += self.balance_delta();
        match *self {
            LoyaltyMutation::EarnPoints { amount } => customer.points_lifetime_earned += amount,
            LoyaltyMutation::RedeemPoints { amount } => customer.points_lifetime_redeemed += amount,
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
