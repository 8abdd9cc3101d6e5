//! # Unit of Work
//!
//! One SQLite transaction carrying every write a checkout makes. Either all
//! of it commits or none of it does.
//!
//! ## Checkout Write Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    ├── decrement_stock()     per line, conditional on on_hand >= qty   │
//! │    ├── insert_transaction()                                            │
//! │    ├── insert_line_item()    per line                                  │
//! │    ├── insert_tax_lines()                                              │
//! │    ├── apply_loyalty()       relative increments, redeem conditional   │
//! │    ├── record_purchase()     total_spent += subtotal, RETURNING        │
//! │    └── set_tier()                                                      │
//! │  COMMIT ─── or ─── ROLLBACK (explicit, or on drop)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//! The first statement is a write, so the connection takes SQLite's write
//! lock immediately and holds it until commit. A second checkout waits up to
//! `busy_timeout` and then sees the committed stock and balances. All counter
//! updates are relative (`x = x + ?`) and guarded by conditions, never
//! read-modify-write from values loaded earlier.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::customer::CUSTOMER_COLUMNS;
use crate::repository::product::PRODUCT_COLUMNS;
use cinder_core::loyalty::{LoyaltyMutation, LoyaltyTier};
use cinder_core::tax::TaxBreakdownLine;
use cinder_core::{Customer, LineItem, Money, Product, Transaction};

/// An open checkout transaction. Dropping it without [`commit`](Self::commit)
/// rolls everything back.
#[derive(Debug)]
pub struct UnitOfWork {
    tx: sqlx::Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    /// Opens the transaction and takes the write lock before returning.
    pub async fn begin(pool: &SqlitePool) -> DbResult<Self> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| match DbError::from(e) {
                busy @ (DbError::Busy(_) | DbError::PoolExhausted) => busy,
                other => DbError::TransactionFailed(other.to_string()),
            })?;

        // A deferred BEGIN only locks on the first write. Writing nothing up
        // front makes every later read see the state this unit will commit on.
        sqlx::query("UPDATE products SET on_hand = on_hand WHERE 0")
            .execute(&mut *tx)
            .await?;

        Ok(UnitOfWork { tx })
    }

    // =========================================================================
    // Reads (see this transaction's own writes)
    // =========================================================================

    pub async fn get_product(&mut self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(product)
    }

    pub async fn get_customer(&mut self, id: &str) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1");
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(customer)
    }

    pub async fn receipt_number_exists(&mut self, store_id: &str, receipt_number: &str) -> DbResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM transactions WHERE store_id = ?1 AND receipt_number = ?2)",
        )
        .bind(store_id)
        .bind(receipt_number)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Takes `quantity` units from an active product's stock.
    ///
    /// Returns `false` (and changes nothing) when the product is missing,
    /// inactive, or has fewer than `quantity` units on hand.
    pub async fn decrement_stock(&mut self, product_id: &str, quantity: i64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET on_hand = on_hand - ?2, updated_at = ?3
            WHERE id = ?1 AND is_active = 1 AND on_hand >= ?2
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;

        let applied = result.rows_affected() == 1;
        debug!(product_id, quantity, applied, "Stock decrement");
        Ok(applied)
    }

    pub async fn insert_transaction(&mut self, transaction: &Transaction) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, store_id, receipt_number, kind, reverses_transaction_id,
                cashier_id, customer_id, jurisdiction,
                subtotal, tax_amount, exempt_amount, total_amount,
                payment_method, payment_reference, cash_tendered, change_given,
                age_verification_required, age_verification_completed, age_verification_id,
                loyalty_points_earned, loyalty_points_redeemed, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                      ?17, ?18, ?19, ?20, ?21, ?22)
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.store_id)
        .bind(&transaction.receipt_number)
        .bind(transaction.kind)
        .bind(&transaction.reverses_transaction_id)
        .bind(&transaction.cashier_id)
        .bind(&transaction.customer_id)
        .bind(&transaction.jurisdiction)
        .bind(transaction.subtotal)
        .bind(transaction.tax_amount)
        .bind(transaction.exempt_amount)
        .bind(transaction.total_amount)
        .bind(transaction.payment_method)
        .bind(&transaction.payment_reference)
        .bind(transaction.cash_tendered)
        .bind(transaction.change_given)
        .bind(transaction.age_verification_required)
        .bind(transaction.age_verification_completed)
        .bind(&transaction.age_verification_id)
        .bind(transaction.loyalty_points_earned)
        .bind(transaction.loyalty_points_redeemed)
        .bind(transaction.created_at)
        .execute(&mut *self.tx)
        .await?;

        debug!(id = %transaction.id, receipt = %transaction.receipt_number, "Transaction inserted");
        Ok(())
    }

    pub async fn insert_line_item(&mut self, item: &LineItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transaction_items (
                id, transaction_id, line_number, product_id, name, sku, quantity,
                unit_price, line_total, age_verification_applied, special_tax_category, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&item.id)
        .bind(&item.transaction_id)
        .bind(item.line_number)
        .bind(&item.product_id)
        .bind(&item.name)
        .bind(&item.sku)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.line_total)
        .bind(item.age_verification_applied)
        .bind(item.special_tax_category)
        .bind(item.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    /// Stores the tax breakdown in computed order.
    pub async fn insert_tax_lines(&mut self, transaction_id: &str, lines: &[TaxBreakdownLine]) -> DbResult<()> {
        for (position, line) in lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO transaction_tax_lines (
                    transaction_id, position, tax_type, rate, taxable_amount, tax_amount
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(transaction_id)
            .bind(position as i64)
            .bind(line.tax_type)
            .bind(line.rate)
            .bind(line.taxable_amount)
            .bind(line.tax_amount)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    /// Applies an earn or redeem to a customer's point ledger.
    ///
    /// Redemption only applies while the balance covers it. Returns `false`
    /// when the customer is missing or the balance is insufficient.
    pub async fn apply_loyalty(&mut self, customer_id: &str, mutation: &LoyaltyMutation) -> DbResult<bool> {
        let now = Utc::now();
        let result = match mutation {
            LoyaltyMutation::EarnPoints { amount } => {
                sqlx::query(
                    r#"
                    UPDATE customers
                    SET loyalty_points = loyalty_points + ?2,
                        points_lifetime_earned = points_lifetime_earned + ?2,
                        updated_at = ?3
                    WHERE id = ?1
                    "#,
                )
                .bind(customer_id)
                .bind(*amount)
                .bind(now)
                .execute(&mut *self.tx)
                .await?
            }
            LoyaltyMutation::RedeemPoints { amount } => {
                sqlx::query(
                    r#"
                    UPDATE customers
                    SET loyalty_points = loyalty_points - ?2,
                        points_lifetime_redeemed = points_lifetime_redeemed + ?2,
                        updated_at = ?3
                    WHERE id = ?1 AND loyalty_points >= ?2
                    "#,
                )
                .bind(customer_id)
                .bind(*amount)
                .bind(now)
                .execute(&mut *self.tx)
                .await?
            }
        };

        let applied = result.rows_affected() == 1;
        debug!(customer_id, ?mutation, applied, "Loyalty mutation");
        Ok(applied)
    }

    /// Adds `spend` to the customer's lifetime spend and counts the purchase.
    ///
    /// ## Returns
    /// The new `total_spent`, which the tier is derived from.
    pub async fn record_purchase(
        &mut self,
        customer_id: &str,
        spend: Money,
        at: DateTime<Utc>,
    ) -> DbResult<Money> {
        let total_spent: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE customers
            SET total_spent = total_spent + ?2,
                transaction_count = transaction_count + 1,
                last_purchase_date = ?3,
                updated_at = ?3
            WHERE id = ?1
            RETURNING total_spent
            "#,
        )
        .bind(customer_id)
        .bind(spend)
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await?;

        total_spent
            .map(Money::from_cents)
            .ok_or_else(|| DbError::not_found("Customer", customer_id))
    }

    pub async fn set_tier(&mut self, customer_id: &str, tier: LoyaltyTier) -> DbResult<()> {
        let result = sqlx::query("UPDATE customers SET loyalty_tier = ?2 WHERE id = ?1")
            .bind(customer_id)
            .bind(tier)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", customer_id));
        }
        Ok(())
    }

    // =========================================================================
    // Completion
    // =========================================================================

    pub async fn commit(self) -> DbResult<()> {
        self.tx.commit().await.map_err(|e| match DbError::from(e) {
            busy @ DbError::Busy(_) => busy,
            other => DbError::TransactionFailed(other.to_string()),
        })
    }

    pub async fn rollback(self) -> DbResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
