//! # Transaction Repository
//!
//! Read side of committed transactions. Writes happen only inside
//! [`crate::UnitOfWork`], and committed rows are never updated (the schema
//! rejects it); a void or refund is a new row pointing at the original.

use sqlx::SqlitePool;

use crate::error::DbResult;
use cinder_core::tax::TaxBreakdownLine;
use cinder_core::{LineItem, Transaction};

pub(crate) const TRANSACTION_COLUMNS: &str = r#"
    id, store_id, receipt_number, kind, reverses_transaction_id,
    cashier_id, customer_id, jurisdiction,
    subtotal, tax_amount, exempt_amount, total_amount,
    payment_method, payment_reference, cash_tendered, change_given,
    age_verification_required, age_verification_completed, age_verification_id,
    loyalty_points_earned, loyalty_points_redeemed, created_at
"#;

pub(crate) const LINE_ITEM_COLUMNS: &str = r#"
    id, transaction_id, line_number, product_id, name, sku, quantity,
    unit_price, line_total, age_verification_applied, special_tax_category, created_at
"#;

#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Transaction>> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1");
        let transaction = sqlx::query_as::<_, Transaction>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(transaction)
    }

    pub async fn get_by_receipt_number(
        &self,
        store_id: &str,
        receipt_number: &str,
    ) -> DbResult<Option<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE store_id = ?1 AND receipt_number = ?2"
        );
        let transaction = sqlx::query_as::<_, Transaction>(&sql)
            .bind(store_id)
            .bind(receipt_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(transaction)
    }

    /// Line items in receipt order.
    pub async fn line_items(&self, transaction_id: &str) -> DbResult<Vec<LineItem>> {
        let sql = format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM transaction_items WHERE transaction_id = ?1 ORDER BY line_number"
        );
        let items = sqlx::query_as::<_, LineItem>(&sql)
            .bind(transaction_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    /// Tax breakdown in the order it was computed.
    pub async fn tax_lines(&self, transaction_id: &str) -> DbResult<Vec<TaxBreakdownLine>> {
        let lines = sqlx::query_as::<_, TaxBreakdownLine>(
            r#"
            SELECT tax_type, rate, taxable_amount, tax_amount
            FROM transaction_tax_lines
            WHERE transaction_id = ?1
            ORDER BY position
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Transactions for a customer, newest first.
    pub async fn list_for_customer(&self, customer_id: &str, limit: u32) -> DbResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE customer_id = ?1 ORDER BY created_at DESC LIMIT ?2"
        );
        let transactions = sqlx::query_as::<_, Transaction>(&sql)
            .bind(customer_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(transactions)
    }

    /// Compensating records (voids, refunds) that reference `transaction_id`.
    pub async fn reversals_of(&self, transaction_id: &str) -> DbResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE reverses_transaction_id = ?1 ORDER BY created_at"
        );
        let transactions = sqlx::query_as::<_, Transaction>(&sql)
            .bind(transaction_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(transactions)
    }

    pub async fn count_for_store(&self, store_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE store_id = ?1")
            .bind(store_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
