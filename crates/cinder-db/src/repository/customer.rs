//! # Customer Repository
//!
//! Registration and reads. Point and spend counters are only ever changed
//! through [`crate::UnitOfWork`], never here.

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use cinder_core::loyalty::LoyaltyTier;
use cinder_core::{Customer, Money};

pub(crate) const CUSTOMER_COLUMNS: &str = r#"
    id, first_name, last_name, email, phone, date_of_birth,
    loyalty_points, points_lifetime_earned, points_lifetime_redeemed,
    total_spent, transaction_count, loyalty_tier, last_purchase_date,
    is_tax_exempt, created_at, updated_at
"#;

/// Registration data.
#[derive(Debug, Clone, Default)]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub is_tax_exempt: bool,
}

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1");
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(customer)
    }

    pub async fn get_by_email(&self, email: &str) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE email = ?1");
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?;

        Ok(customer)
    }

    /// Registers a customer with an empty ledger at BRONZE.
    pub async fn create(&self, new: NewCustomer) -> DbResult<Customer> {
        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            first_name: new.first_name.trim().to_string(),
            last_name: new.last_name.trim().to_string(),
            email: new.email.map(|e| e.trim().to_lowercase()),
            phone: new.phone,
            date_of_birth: new.date_of_birth,
            loyalty_points: 0,
            points_lifetime_earned: 0,
            points_lifetime_redeemed: 0,
            total_spent: Money::zero(),
            transaction_count: 0,
            loyalty_tier: LoyaltyTier::Bronze,
            last_purchase_date: None,
            is_tax_exempt: new.is_tax_exempt,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %customer.id, "Registering customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, first_name, last_name, email, phone, date_of_birth,
                loyalty_points, points_lifetime_earned, points_lifetime_redeemed,
                total_spent, transaction_count, loyalty_tier, last_purchase_date,
                is_tax_exempt, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(customer.date_of_birth)
        .bind(customer.loyalty_points)
        .bind(customer.points_lifetime_earned)
        .bind(customer.points_lifetime_redeemed)
        .bind(customer.total_spent)
        .bind(customer.transaction_count)
        .bind(customer.loyalty_tier)
        .bind(customer.last_purchase_date)
        .bind(customer.is_tax_exempt)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: customer.email.clone().unwrap_or_default(),
            },
            other => other,
        })?;

        Ok(customer)
    }

    /// Customers whose stored balance disagrees with their lifetime counters.
    ///
    /// The schema forbids this; the query exists for reconciliation reports.
    pub async fn find_unbalanced(&self) -> DbResult<Vec<String>> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT id FROM customers
            WHERE loyalty_points <> points_lifetime_earned - points_lifetime_redeemed
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
