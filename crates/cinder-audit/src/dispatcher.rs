//! # Audit Dispatcher
//!
//! Background task that moves entries from the local `audit_log` buffer to
//! an [`AuditTransport`].
//!
//! ## Delivery Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      AuditDispatcher::run                               │
//! │                                                                         │
//! │  select! {                                                             │
//! │      interval.tick()   ── every poll_interval                          │
//! │      wake.notified()   ── AuditSink::record appended something         │
//! │      shutdown_rx       ── stop (after one final delivery pass)         │
//! │  }                                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  drain():                                                              │
//! │    1. flush the sink's in-memory fallback into audit_log               │
//! │    2. pending(batch_size) ── oldest undelivered first                  │
//! │    3. transport.deliver(batch)                                         │
//! │         ok  ─► mark_delivered, repeat while batches are full           │
//! │         err ─► record_failure per entry                                │
//! │                low/medium at max attempts ─► abandon (warn!)           │
//! │                high/critical ─► kept pending forever                   │
//! │    4. on failure wait ExponentialBackoff::next_backoff()               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use cinder_core::audit::AuditLogEntry;

use crate::error::{AuditError, AuditResult};
use crate::sink::AuditSink;
use crate::transport::AuditTransport;

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// How often pending entries are checked without a wake-up.
    pub poll_interval: Duration,

    /// Entries per transport call.
    pub batch_size: u32,

    pub initial_backoff: Duration,
    pub max_backoff: Duration,

    /// Delivery attempts before a low/medium entry is abandoned.
    /// High and critical entries are never abandoned.
    pub max_attempts_low_severity: i64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        DispatcherSettings {
            poll_interval: Duration::from_secs(5),
            batch_size: 100,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            max_attempts_low_severity: 10,
        }
    }
}

/// Counts from one or more delivery passes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
    pub abandoned: usize,
}

impl AddAssign for DeliveryReport {
    fn add_assign(&mut self, other: DeliveryReport) {
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.abandoned += other.abandoned;
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

pub struct AuditDispatcher {
    sink: AuditSink,
    transport: Arc<dyn AuditTransport>,
    settings: DispatcherSettings,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running dispatcher.
#[derive(Debug, Clone)]
pub struct AuditDispatcherHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl AuditDispatcherHandle {
    /// Asks the dispatcher to make a final delivery pass and stop.
    pub async fn shutdown(&self) -> AuditResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| AuditError::DispatcherStopped)
    }
}

impl AuditDispatcher {
    pub fn new(
        sink: AuditSink,
        transport: Arc<dyn AuditTransport>,
        settings: DispatcherSettings,
    ) -> (Self, AuditDispatcherHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let dispatcher = AuditDispatcher {
            sink,
            transport,
            settings,
            shutdown_rx,
        };

        (dispatcher, AuditDispatcherHandle { shutdown_tx })
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!(transport = self.transport.name(), "Audit dispatcher starting");

        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let wake = self.sink.wake_signal();
        let mut backoff = self.create_backoff();

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = wake.notified() => {}
                _ = self.shutdown_rx.recv() => {
                    info!("Audit dispatcher shutting down");
                    break;
                }
            }

            let healthy = match self.drain().await {
                Ok(report) => {
                    if report.delivered > 0 || report.failed > 0 {
                        debug!(?report, "Audit delivery pass");
                    }
                    report.failed == 0
                }
                Err(e) => {
                    error!(?e, "Audit delivery pass failed");
                    false
                }
            };

            if healthy {
                backoff.reset();
                continue;
            }

            if let Some(duration) = backoff.next_backoff() {
                debug!(?duration, "Waiting before next audit delivery");
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {}
                    _ = self.shutdown_rx.recv() => {
                        info!("Shutdown during audit backoff");
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.run_once().await {
            warn!(?e, "Final audit delivery pass failed; entries stay buffered");
        }
        info!("Audit dispatcher stopped");
    }

    /// Delivers batches until the buffer is empty or a batch fails.
    pub async fn drain(&self) -> AuditResult<DeliveryReport> {
        let mut total = DeliveryReport::default();

        loop {
            let report = self.run_once().await?;
            total += report;

            let full_batch = report.delivered >= self.settings.batch_size as usize;
            if report.failed > 0 || !full_batch {
                return Ok(total);
            }
        }
    }

    /// One delivery attempt for the oldest pending batch.
    pub async fn run_once(&self) -> AuditResult<DeliveryReport> {
        self.sink.flush_fallback().await;

        let repo = self.sink.repository();
        let pending = repo.pending(self.settings.batch_size).await?;
        if pending.is_empty() {
            return Ok(DeliveryReport::default());
        }

        let batch: Vec<AuditLogEntry> = pending.iter().map(|p| p.entry.clone()).collect();
        let mut report = DeliveryReport::default();

        match self.transport.deliver(&batch).await {
            Ok(()) => {
                let ids: Vec<String> = batch.iter().map(|e| e.id.clone()).collect();
                repo.mark_delivered(&ids, Utc::now()).await?;
                report.delivered = ids.len();
            }
            Err(e) => {
                let message = e.to_string();
                warn!(
                    transport = self.transport.name(),
                    count = batch.len(),
                    error = %message,
                    "Audit delivery failed"
                );

                let now = Utc::now();
                for entry in &batch {
                    let attempts = repo.record_failure(&entry.id, &message, now).await?;
                    report.failed += 1;

                    if !entry.severity.is_compliance_grade()
                        && attempts >= self.settings.max_attempts_low_severity
                    {
                        repo.abandon(&entry.id, now).await?;
                        report.abandoned += 1;
                        warn!(
                            id = %entry.id,
                            action = %entry.action,
                            attempts,
                            "Abandoning delivery of low-severity audit entry"
                        );
                    }
                }
            }
        }

        Ok(report)
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.settings.initial_backoff,
            initial_interval: self.settings.initial_backoff,
            max_interval: self.settings.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
