//! Shared fixtures for the checkout integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use cinder_audit::AuditSink;
use cinder_checkout::{
    AgeVerificationService, ApprovingProcessor, CheckoutLine, CheckoutOrchestrator, CheckoutRequest,
    CinderConfig, InventoryService, LoyaltyService, OrchestratorSettings, PaymentProcessor,
};
use cinder_core::tax::SpecialTaxCategory;
use cinder_core::{Customer, Money, PaymentMethod, Product};
use cinder_db::{Database, DbConfig, NewCustomer, NewProduct};

pub const STORE: &str = "store-1";
pub const CASHIER: &str = "cashier-1";

pub struct Harness {
    pub db: Database,
    pub audit: AuditSink,
    pub checkout: CheckoutOrchestrator,
    pub verification: AgeVerificationService,
    pub loyalty: LoyaltyService,
    pub inventory: InventoryService,
    /// Set for file-backed harnesses; removed by [`Harness::cleanup`].
    pub path: Option<PathBuf>,
}

pub fn config(jurisdiction: Option<&str>) -> CinderConfig {
    let mut config = CinderConfig::default();
    config.store.id = STORE.to_string();
    config.store.name = "Cinder Test Store".to_string();
    config.store.jurisdiction = jurisdiction.map(str::to_string);
    config
}

/// In-memory database, approving payment processor.
pub async fn harness(jurisdiction: Option<&str>) -> Harness {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    build(db, OrchestratorSettings::from_config(&config(jurisdiction)), Arc::new(ApprovingProcessor), None)
}

pub async fn harness_with(
    jurisdiction: Option<&str>,
    adjust: impl FnOnce(&mut OrchestratorSettings),
    payments: Arc<dyn PaymentProcessor>,
) -> Harness {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let mut settings = OrchestratorSettings::from_config(&config(jurisdiction));
    adjust(&mut settings);
    build(db, settings, payments, None)
}

/// Temp-file database with a real connection pool, for concurrency tests.
pub async fn file_harness(jurisdiction: Option<&str>) -> Harness {
    file_harness_with(jurisdiction, |_| {}, Arc::new(ApprovingProcessor)).await
}

pub async fn file_harness_with(
    jurisdiction: Option<&str>,
    adjust: impl FnOnce(&mut OrchestratorSettings),
    payments: Arc<dyn PaymentProcessor>,
) -> Harness {
    let path = std::env::temp_dir().join(format!("cinder-test-{}.db", uuid::Uuid::new_v4()));
    let db = Database::new(DbConfig::new(&path).max_connections(8)).await.unwrap();
    let mut settings = OrchestratorSettings::from_config(&config(jurisdiction));
    adjust(&mut settings);
    build(db, settings, payments, Some(path))
}

fn build(
    db: Database,
    settings: OrchestratorSettings,
    payments: Arc<dyn PaymentProcessor>,
    path: Option<PathBuf>,
) -> Harness {
    let base = config(None);
    let audit = AuditSink::new(&db);
    let verification =
        AgeVerificationService::new(&db, audit.clone(), base.age_policy(), base.verification_ttl());
    let checkout = CheckoutOrchestrator::new(&db, verification.clone(), payments, audit.clone(), settings);

    Harness {
        loyalty: LoyaltyService::new(&db, audit.clone()),
        inventory: InventoryService::new(&db, audit.clone()),
        checkout,
        verification,
        audit,
        db,
        path,
    }
}

impl Harness {
    pub async fn cigarettes(&self, on_hand: i64) -> Product {
        self.db
            .products()
            .insert(
                NewProduct::new("CIG-MARL-20", "Cigarettes 20pk", Money::from_cents(1599), on_hand)
                    .age_restricted()
                    .special_tax(SpecialTaxCategory::Tobacco),
            )
            .await
            .unwrap()
    }

    pub async fn product(&self, sku: &str, cents: i64, on_hand: i64) -> Product {
        self.db
            .products()
            .insert(NewProduct::new(sku, format!("Item {sku}"), Money::from_cents(cents), on_hand))
            .await
            .unwrap()
    }

    pub async fn customer(&self, email: &str) -> Customer {
        self.db
            .customers()
            .create(NewCustomer {
                first_name: "Sam".into(),
                last_name: "Okafor".into(),
                email: Some(email.into()),
                ..NewCustomer::default()
            })
            .await
            .unwrap()
    }

    pub async fn on_hand(&self, product_id: &str) -> i64 {
        self.db.products().get_by_id(product_id).await.unwrap().unwrap().on_hand
    }

    pub async fn reload_customer(&self, id: &str) -> Customer {
        self.db.customers().get_by_id(id).await.unwrap().unwrap()
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(self.db.pool())
            .await
            .unwrap()
    }

    pub async fn cleanup(self) {
        let path = self.path.clone();
        self.db.pool().close().await;
        if let Some(path) = path {
            for suffix in ["", "-wal", "-shm"] {
                let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
            }
        }
    }
}

pub fn cash(lines: Vec<CheckoutLine>, tendered_cents: i64) -> CheckoutRequest {
    CheckoutRequest {
        store_id: STORE.to_string(),
        cashier_id: CASHIER.to_string(),
        lines,
        customer_id: None,
        payment_method: PaymentMethod::Cash,
        cash_tendered: Some(Money::from_cents(tendered_cents)),
        age_verification_completed: false,
        age_verification_id: None,
        redeem_points: None,
    }
}

pub fn card(lines: Vec<CheckoutLine>) -> CheckoutRequest {
    CheckoutRequest {
        payment_method: PaymentMethod::Card,
        cash_tendered: None,
        ..cash(lines, 0)
    }
}
