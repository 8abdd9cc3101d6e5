//! # Service Wiring
//!
//! Builds every service around one explicitly owned [`Database`] handle.
//!
//! ```text
//! CinderConfig ──► Database ──┬──► AuditSink ──► AuditDispatcher (task)
//!                             ├──► AgeVerificationService
//!                             ├──► LoyaltyService
//!                             ├──► InventoryService
//!                             └──► CheckoutOrchestrator
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};

use cinder_audit::{AuditDispatcher, AuditDispatcherHandle, AuditSink, AuditTransport};
use cinder_db::Database;

use crate::config::CinderConfig;
use crate::error::CheckoutResult;
use crate::inventory::InventoryService;
use crate::loyalty::LoyaltyService;
use crate::orchestrator::{CheckoutOrchestrator, OrchestratorSettings};
use crate::payment::PaymentProcessor;
use crate::verification::AgeVerificationService;

pub struct CinderPos {
    pub db: Database,
    pub audit: AuditSink,
    pub checkout: CheckoutOrchestrator,
    pub verification: AgeVerificationService,
    pub loyalty: LoyaltyService,
    pub inventory: InventoryService,
    dispatcher: AuditDispatcherHandle,
    dispatcher_task: JoinHandle<()>,
}

impl CinderPos {
    /// Opens the database from `config` and starts audit delivery.
    pub async fn start(
        config: &CinderConfig,
        transport: Arc<dyn AuditTransport>,
        payments: Arc<dyn PaymentProcessor>,
    ) -> CheckoutResult<Self> {
        let db = Database::new(config.db_config()?).await?;
        Ok(Self::with_database(db, config, transport, payments))
    }

    /// Wires services around an already open database.
    pub fn with_database(
        db: Database,
        config: &CinderConfig,
        transport: Arc<dyn AuditTransport>,
        payments: Arc<dyn PaymentProcessor>,
    ) -> Self {
        let audit = AuditSink::new(&db);
        let (dispatcher, handle) =
            AuditDispatcher::new(audit.clone(), transport, config.dispatcher_settings());
        let dispatcher_task = dispatcher.spawn();

        let verification = AgeVerificationService::new(
            &db,
            audit.clone(),
            config.age_policy(),
            config.verification_ttl(),
        );
        let checkout = CheckoutOrchestrator::new(
            &db,
            verification.clone(),
            payments,
            audit.clone(),
            OrchestratorSettings::from_config(config),
        );

        info!(store_id = %config.store.id, "Cinder POS services started");

        Self {
            loyalty: LoyaltyService::new(&db, audit.clone()),
            inventory: InventoryService::new(&db, audit.clone()),
            checkout,
            verification,
            audit,
            db,
            dispatcher: handle,
            dispatcher_task,
        }
    }

    /// Delivers what is pending, stops the dispatcher and waits for it.
    pub async fn shutdown(self) {
        if let Err(e) = self.dispatcher.shutdown().await {
            error!(?e, "Audit dispatcher was already stopped");
        }
        if let Err(e) = self.dispatcher_task.await {
            error!(?e, "Audit dispatcher task failed");
        }
        info!("Cinder POS services stopped");
    }
}
