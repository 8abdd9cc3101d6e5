//! # Repository Module
//!
//! Pool-backed repositories. Each call runs on its own connection and
//! commits on its own; anything that must commit together with a checkout
//! goes through [`crate::UnitOfWork`] instead.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  db.products()       ProductRepository       catalogue, stock admin    │
//! │  db.customers()      CustomerRepository      registration, reads       │
//! │  db.transactions()   TransactionRepository   committed sales (read)    │
//! │  db.verifications()  VerificationRepository  append-only ID checks     │
//! │  db.audit_log()      AuditLogRepository      append, delivery, query   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audit;
pub mod customer;
pub mod product;
pub mod transaction;
pub mod verification;
