//! # Product Repository
//!
//! Catalogue reads, inventory adjustments and soft deactivation.
//!
//! Checkout never decrements stock through this repository; that happens
//! inside [`crate::UnitOfWork`] so it commits with the transaction record.

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use cinder_core::tax::SpecialTaxCategory;
use cinder_core::validation::validate_price_cents;
use cinder_core::{Money, Product};

pub(crate) const PRODUCT_COLUMNS: &str = r#"
    id, sku, barcode, name, category, unit_price, on_hand,
    age_restricted, special_tax_category, is_tax_exempt,
    lot_number, expiration_date, is_active, created_at, updated_at
"#;

/// Fields for a new catalogue entry.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub category: Option<String>,
    pub unit_price: Money,
    pub on_hand: i64,
    pub age_restricted: bool,
    pub special_tax_category: Option<SpecialTaxCategory>,
    pub is_tax_exempt: bool,
    pub lot_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
}

impl NewProduct {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, unit_price: Money, on_hand: i64) -> Self {
        Self {
            sku: sku.into(),
            barcode: None,
            name: name.into(),
            category: None,
            unit_price,
            on_hand,
            age_restricted: false,
            special_tax_category: None,
            is_tax_exempt: false,
            lot_number: None,
            expiration_date: None,
        }
    }

    pub fn age_restricted(mut self) -> Self {
        self.age_restricted = true;
        self
    }

    pub fn special_tax(mut self, category: SpecialTaxCategory) -> Self {
        self.special_tax_category = Some(category);
        self
    }

    pub fn tax_exempt(mut self) -> Self {
        self.is_tax_exempt = true;
        self
    }

    pub fn lot(mut self, lot_number: impl Into<String>, expiration_date: Option<NaiveDate>) -> Self {
        self.lot_number = Some(lot_number.into());
        self.expiration_date = expiration_date;
        self
    }
}

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by ID, active or not.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Active products ordered by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1 ORDER BY name LIMIT ?1"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Inserts a product and returns it.
    ///
    /// Prices outside `0..=MAX_PRICE_CENTS` are refused with
    /// `ConstraintViolation` before anything is written.
    pub async fn insert(&self, new: NewProduct) -> DbResult<Product> {
        check_price(new.unit_price)?;
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            sku: new.sku,
            barcode: new.barcode,
            name: new.name,
            category: new.category,
            unit_price: new.unit_price,
            on_hand: new.on_hand,
            age_restricted: new.age_restricted,
            special_tax_category: new.special_tax_category,
            is_tax_exempt: new.is_tax_exempt,
            lot_number: new.lot_number,
            expiration_date: new.expiration_date,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, barcode, name, category, unit_price, on_hand,
                age_restricted, special_tax_category, is_tax_exempt,
                lot_number, expiration_date, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.unit_price)
        .bind(product.on_hand)
        .bind(product.age_restricted)
        .bind(product.special_tax_category)
        .bind(product.is_tax_exempt)
        .bind(&product.lot_number)
        .bind(product.expiration_date)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: product.sku.clone(),
            },
            other => other,
        })?;

        Ok(product)
    }

    /// Adds `delta` (positive or negative) to on-hand stock.
    ///
    /// The update is conditional, so stock never goes below zero; a negative
    /// delta larger than the stock fails with `ConstraintViolation`.
    ///
    /// ## Returns
    /// The new on-hand quantity.
    pub async fn adjust_stock(&self, id: &str, delta: i64) -> DbResult<i64> {
        let now = Utc::now();

        let new_on_hand: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET on_hand = on_hand + ?2, updated_at = ?3
            WHERE id = ?1 AND on_hand + ?2 >= 0
            RETURNING on_hand
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match new_on_hand {
            Some(on_hand) => {
                info!(product_id = %id, delta, on_hand, "Stock adjusted");
                Ok(on_hand)
            }
            None => match self.get_by_id(id).await? {
                Some(product) => Err(DbError::ConstraintViolation {
                    message: format!(
                        "adjustment of {delta} would take {} below zero (on hand {})",
                        product.sku, product.on_hand
                    ),
                }),
                None => Err(DbError::not_found("Product", id)),
            },
        }
    }

    /// Soft-deletes a product. Historical line items keep referencing it.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        info!(product_id = %id, "Product deactivated");
        Ok(())
    }

    /// Sets the unit price for future sales. Past line items keep their snapshot.
    pub async fn update_price(&self, id: &str, unit_price: Money) -> DbResult<()> {
        check_price(unit_price)?;
        let result = sqlx::query("UPDATE products SET unit_price = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(unit_price)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }
}

fn check_price(price: Money) -> DbResult<()> {
    validate_price_cents(price.cents()).map_err(|e| DbError::ConstraintViolation {
        message: e.to_string(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
