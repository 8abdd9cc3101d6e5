//! # cinder-checkout: Checkout Orchestration for Cinder POS
//!
//! The only crate that changes several entities at once. Everything here is
//! constructed around an explicitly passed [`cinder_db::Database`].
//!
//! ## Modules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         cinder-checkout                                 │
//! │                                                                         │
//! │  orchestrator   cart ──► committed transaction (one unit of work)       │
//! │  verification   ID adjudication records, manager overrides              │
//! │  loyalty        registration, manual redeem/earn                        │
//! │  inventory      receiving, write-offs, deactivation                     │
//! │  payment        PaymentProcessor capability for non-cash tenders        │
//! │  config         cinder.toml + CINDER_* environment                      │
//! │  telemetry      tracing subscriber setup                                │
//! │  app            wiring of all of the above                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust,ignore
//! let config = CinderConfig::load(None)?;
//! let pos = CinderPos::start(&config, Arc::new(LoggingTransport), Arc::new(ApprovingProcessor)).await?;
//!
//! let committed = pos.checkout.checkout(request).await?;
//! let receipt = pos.checkout.receipt(&committed);
//! ```

use chrono::Utc;
use uuid::Uuid;

use cinder_core::audit::{AuditAction, AuditLogEntry};

pub mod app;
pub mod config;
pub mod error;
pub mod inventory;
pub mod loyalty;
pub mod orchestrator;
pub mod payment;
pub mod telemetry;
pub mod verification;

// =============================================================================
// Re-exports
// =============================================================================

pub use app::CinderPos;
pub use config::{CinderConfig, ConfigError};
pub use error::{CheckoutError, CheckoutResult, ErrorCode, ErrorResponse};
pub use inventory::InventoryService;
pub use loyalty::LoyaltyService;
pub use orchestrator::{
    CheckoutLine, CheckoutOrchestrator, CheckoutRequest, CommittedTransaction, OrchestratorSettings,
};
pub use payment::{ApprovingProcessor, PaymentAuthorization, PaymentProcessor, PaymentRequest};
pub use verification::{AgeVerificationService, OverrideRequest, VerificationRequest};

/// New audit entry stamped now, at the action's minimum severity.
pub(crate) fn audit_entry(actor_id: &str, action: AuditAction, entity_type: &str) -> AuditLogEntry {
    AuditLogEntry::new(Uuid::new_v4().to_string(), Utc::now(), actor_id, action, entity_type)
}
