//! # cinder-db: Database Layer for Cinder POS
//!
//! SQLite storage for products, customers, committed transactions, age
//! verification records and the audit log, using sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Cinder POS Data Flow                             │
//! │                                                                         │
//! │  CheckoutOrchestrator / AuditDispatcher                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    cinder-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  (reads, admin │    │  (embedded)  │  │   │
//! │  │   │               │    │   audit rows)  │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│                │    │ 001_init.sql │  │   │
//! │  │   │ begin() ──────┼──► │  UnitOfWork    │    │              │  │   │
//! │  │   └───────────────┘    │  (checkout tx) │    └──────────────┘  │   │
//! │  │                        └────────────────┘                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//! - [`unit_of_work`] - The single transaction a checkout commits through
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cinder_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("cinder.db")).await?;
//!
//! let mut uow = db.begin().await?;
//! if !uow.decrement_stock(&product_id, 2).await? {
//!     uow.rollback().await?;
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod unit_of_work;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use unit_of_work::UnitOfWork;

pub use repository::audit::{AuditLogRepository, AuditQuery, PendingAuditEntry};
pub use repository::customer::{CustomerRepository, NewCustomer};
pub use repository::product::{NewProduct, ProductRepository};
pub use repository::transaction::TransactionRepository;
pub use repository::verification::VerificationRepository;
