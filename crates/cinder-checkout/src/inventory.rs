//! Catalogue maintenance outside of checkout: receiving products, stock
//! corrections and soft deactivation. Each change is audited.

use serde_json::json;
use tracing::{info, warn};

use cinder_audit::AuditSink;
use cinder_core::audit::AuditAction;
use cinder_core::validation::{validate_actor_id, validate_name, validate_price_cents, validate_reason, validate_sku};
use cinder_core::{Money, Product};
use cinder_db::{Database, DbError, NewProduct, ProductRepository};

use crate::audit_entry;
use crate::error::{CheckoutError, CheckoutResult};

const ENTITY: &str = "product";

#[derive(Debug, Clone)]
pub struct InventoryService {
    products: ProductRepository,
    audit: AuditSink,
}

impl InventoryService {
    pub fn new(db: &Database, audit: AuditSink) -> Self {
        Self {
            products: db.products(),
            audit,
        }
    }

    pub async fn add_product(&self, new: NewProduct, actor_id: &str) -> CheckoutResult<Product> {
        validate_actor_id("actor_id", actor_id)?;
        validate_sku(&new.sku)?;
        validate_name("name", &new.name)?;
        validate_price_cents(new.unit_price.cents())?;
        if new.on_hand < 0 {
            return Err(CheckoutError::validation("on_hand must not be negative"));
        }

        let product = self.products.insert(new).await.map_err(|e| match e {
            DbError::UniqueViolation { value, .. } => {
                CheckoutError::validation(format!("sku {value} already exists"))
            }
            other => other.into(),
        })?;

        info!(product_id = %product.id, sku = %product.sku, on_hand = product.on_hand, "Product added");
        self.audit
            .record(
                audit_entry(actor_id, AuditAction::InventoryAdjusted, ENTITY)
                    .entity(&product.id)
                    .details(json!({
                        "change": "created",
                        "sku": product.sku,
                        "on_hand": product.on_hand,
                        "age_restricted": product.age_restricted,
                    })),
            )
            .await;

        Ok(product)
    }

    /// Receives (`delta > 0`) or writes off (`delta < 0`) stock.
    ///
    /// Returns the new on-hand quantity. Stock never goes below zero.
    pub async fn adjust_stock(
        &self,
        product_id: &str,
        delta: i64,
        reason: &str,
        actor_id: &str,
    ) -> CheckoutResult<i64> {
        validate_actor_id("actor_id", actor_id)?;
        validate_reason(reason)?;
        if delta == 0 {
            return Err(CheckoutError::validation("stock adjustment must not be zero"));
        }

        let product = self.active_product(product_id).await?;

        let on_hand = self.products.adjust_stock(product_id, delta).await.map_err(|e| match e {
            DbError::ConstraintViolation { .. } => {
                warn!(product_id, delta, on_hand = product.on_hand, "Adjustment would make stock negative");
                CheckoutError::InsufficientStock {
                    sku: product.sku.clone(),
                    available: product.on_hand,
                    requested: -delta,
                }
            }
            DbError::NotFound { .. } => CheckoutError::ProductNotFound(product_id.to_string()),
            other => other.into(),
        })?;

        self.audit
            .record(
                audit_entry(actor_id, AuditAction::InventoryAdjusted, ENTITY)
                    .entity(product_id)
                    .details(json!({
                        "change": "stock",
                        "sku": product.sku,
                        "delta": delta,
                        "on_hand": on_hand,
                        "reason": reason.trim(),
                    })),
            )
            .await;

        Ok(on_hand)
    }

    /// Reprices a product for future sales. Committed line items keep the
    /// price they were sold at.
    pub async fn update_price(
        &self,
        product_id: &str,
        unit_price: Money,
        reason: &str,
        actor_id: &str,
    ) -> CheckoutResult<Product> {
        validate_actor_id("actor_id", actor_id)?;
        validate_reason(reason)?;
        validate_price_cents(unit_price.cents())?;

        let product = self.active_product(product_id).await?;
        self.products
            .update_price(product_id, unit_price)
            .await
            .map_err(|e| match e {
                DbError::NotFound { .. } => CheckoutError::ProductNotFound(product_id.to_string()),
                other => other.into(),
            })?;

        info!(product_id, sku = %product.sku, from = %product.unit_price, to = %unit_price, "Product repriced");
        self.audit
            .record(
                audit_entry(actor_id, AuditAction::InventoryAdjusted, ENTITY)
                    .entity(product_id)
                    .details(json!({
                        "change": "price",
                        "sku": product.sku,
                        "previous_price_cents": product.unit_price.cents(),
                        "price_cents": unit_price.cents(),
                        "reason": reason.trim(),
                    })),
            )
            .await;

        Ok(Product { unit_price, ..product })
    }

    /// Withdraws a product from sale. Past transactions keep referencing it.
    pub async fn deactivate(&self, product_id: &str, reason: &str, actor_id: &str) -> CheckoutResult<()> {
        validate_actor_id("actor_id", actor_id)?;
        validate_reason(reason)?;

        let product = self.active_product(product_id).await?;
        self.products.deactivate(product_id).await?;

        self.audit
            .record(
                audit_entry(actor_id, AuditAction::InventoryAdjusted, ENTITY)
                    .entity(product_id)
                    .details(json!({
                        "change": "deactivated",
                        "sku": product.sku,
                        "reason": reason.trim(),
                    })),
            )
            .await;

        Ok(())
    }

    async fn active_product(&self, product_id: &str) -> CheckoutResult<Product> {
        match self.products.get_by_id(product_id).await? {
            Some(product) if product.is_active => Ok(product),
            _ => Err(CheckoutError::ProductNotFound(product_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_core::MAX_PRICE_CENTS;
    use cinder_db::{AuditQuery, DbConfig};

    async fn setup() -> (Database, InventoryService) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = InventoryService::new(&db, AuditSink::new(&db));
        (db, service)
    }

    #[tokio::test]
    async fn test_stock_never_goes_negative() {
        let (_db, service) = setup().await;
        let product = service
            .add_product(NewProduct::new("CIG-001", "Cigarettes", Money::from_cents(1599), 3), "mgr-1")
            .await
            .unwrap();

        assert_eq!(service.adjust_stock(&product.id, 10, "Delivery", "mgr-1").await.unwrap(), 13);

        let err = service.adjust_stock(&product.id, -20, "Shrink", "mgr-1").await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InsufficientStock {
                available: 13,
                requested: 20,
                ..
            }
        ));
        assert_eq!(service.adjust_stock(&product.id, -13, "Recall", "mgr-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deactivated_product_cannot_be_adjusted() {
        let (db, service) = setup().await;
        let product = service
            .add_product(NewProduct::new("VAPE-01", "Vape pod", Money::from_cents(999), 5), "mgr-1")
            .await
            .unwrap();

        service.deactivate(&product.id, "Discontinued", "mgr-1").await.unwrap();
        assert!(matches!(
            service.adjust_stock(&product.id, 1, "Delivery", "mgr-1").await,
            Err(CheckoutError::ProductNotFound(_))
        ));

        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert!(!stored.is_active);

        let entries = db
            .audit_log()
            .query(&AuditQuery::new().action(AuditAction::InventoryAdjusted))
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let (_db, service) = setup().await;
        let new = NewProduct::new("DUP-1", "Lighter", Money::from_cents(199), 1);
        service.add_product(new.clone(), "mgr-1").await.unwrap();
        assert!(matches!(
            service.add_product(new, "mgr-1").await,
            Err(CheckoutError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_reprice_is_audited_and_bounded() {
        let (db, service) = setup().await;
        let product = service
            .add_product(NewProduct::new("CIGAR-9", "Cigar", Money::from_cents(1200), 4), "mgr-1")
            .await
            .unwrap();

        let repriced = service
            .update_price(&product.id, Money::from_cents(1350), "Supplier increase", "mgr-1")
            .await
            .unwrap();
        assert_eq!(repriced.unit_price.cents(), 1350);
        assert_eq!(
            db.products().get_by_id(&product.id).await.unwrap().unwrap().unit_price.cents(),
            1350
        );

        let err = service
            .update_price(&product.id, Money::from_cents(MAX_PRICE_CENTS + 1), "Typo", "mgr-1")
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
        assert!(matches!(
            service
                .update_price("missing", Money::from_cents(100), "Supplier increase", "mgr-1")
                .await,
            Err(CheckoutError::ProductNotFound(_))
        ));

        let entries = db
            .audit_log()
            .query(&AuditQuery::new().action(AuditAction::InventoryAdjusted))
            .await
            .unwrap();
        let price_change = entries
            .iter()
            .find(|entry| entry.details["change"] == "price")
            .expect("price change audited");
        assert_eq!(price_change.details["previous_price_cents"], 1200);
        assert_eq!(price_change.details["price_cents"], 1350);
    }

    #[tokio::test]
    async fn test_price_beyond_the_ceiling_is_not_catalogued() {
        let (db, service) = setup().await;
        let huge = NewProduct::new("GOLD-1", "Gold humidor", Money::from_cents(i64::MAX / 2 + 1), 1);
        assert!(matches!(
            service.add_product(huge, "mgr-1").await,
            Err(CheckoutError::Validation(_))
        ));
        assert!(db.products().get_by_sku("GOLD-1").await.unwrap().is_none());
    }
}
