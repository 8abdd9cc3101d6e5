//! # cinder-audit: Audit Sink for Cinder POS
//!
//! Records audit entries without ever blocking or failing the caller, and
//! delivers them out of band.
//!
//! ## Guarantees
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  record()       returns after a local SQLite append (or an in-memory   │
//! │                 hold if the append fails). No remote call.             │
//! │                                                                         │
//! │  audit_log      permanent, append-only. Delivery state lives in        │
//! │                 bookkeeping columns; entry content never changes.      │
//! │                                                                         │
//! │  dispatcher     at-least-once delivery. High/critical entries are      │
//! │                 retried until delivered; low/medium may be abandoned   │
//! │                 after a configured number of attempts.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let sink = AuditSink::new(&db);
//! let (dispatcher, handle) =
//!     AuditDispatcher::new(sink.clone(), Arc::new(LoggingTransport), DispatcherSettings::default());
//! dispatcher.spawn();
//!
//! sink.record(entry).await;
//! handle.shutdown().await?;
//! ```

pub mod dispatcher;
pub mod error;
pub mod sink;
pub mod transport;

pub use dispatcher::{AuditDispatcher, AuditDispatcherHandle, DeliveryReport, DispatcherSettings};
pub use error::{AuditError, AuditResult};
pub use sink::AuditSink;
pub use transport::{AuditTransport, LoggingTransport, NullTransport};
