//! Reconciliation loop runner with cooperative shutdown.
//!
//! [`run_reconciliation`] drives [`ReconciliationEngine::tick`] on a fixed
//! interval on the calling task. There are no retries inside a tick; a
//! skipped tick is simply retried at the next interval.
//!
//! Shutdown is cooperative: once [`Shutdown::trigger`] is called, no further
//! tick is scheduled. A tick that is already running is allowed to finish,
//! so a batch of join announcements is never cut in half.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::engine::{ReconciliationEngine, TickOutcome};
use crate::preferences::PreferenceStore;
use crate::sink::NotificationSink;
use crate::source::StatusSource;

/// Shared shutdown flag.
///
/// Cloned into every long-running surface (reconciliation loop, HTTP
/// listeners). Triggering it is idempotent.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Create an untriggered shutdown flag.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown and wake every waiter.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once shutdown has been requested (immediately if it already
    /// was).
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Totals for one run of the reconciliation loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks executed, skipped ones included.
    pub ticks: u64,
    /// Ticks skipped because the fetch failed.
    pub skipped: u64,
    /// Join events delivered.
    pub delivered: u64,
    /// Join events whose delivery failed.
    pub failed: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: &TickOutcome) {
        self.ticks = self.ticks.saturating_add(1);
        match outcome {
            TickOutcome::Skipped => self.skipped = self.skipped.saturating_add(1),
            TickOutcome::Reconciled(report) => {
                self.delivered = self.delivered.saturating_add(widen(report.delivered));
                self.failed = self.failed.saturating_add(widen(report.failed));
            }
        }
    }
}

fn widen(count: usize) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX)
}

/// Run ticks every `interval` until `shutdown` is triggered.
///
/// The first tick runs immediately.
pub async fn run_reconciliation<S, N, P>(
    engine: &mut ReconciliationEngine<S, N, P>,
    interval: Duration,
    shutdown: &Shutdown,
) -> RunSummary
where
    S: StatusSource,
    N: NotificationSink,
    P: PreferenceStore,
{
    let mut summary = RunSummary::default();

    info!(
        interval_secs = interval.as_secs(),
        "reconciliation loop starting"
    );

    loop {
        if shutdown.is_triggered() {
            break;
        }

        let outcome = engine.tick().await;
        summary.record(&outcome);

        if shutdown.is_triggered() {
            break;
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = shutdown.wait() => break,
        }
    }

    log_run_end(&summary);
    summary
}

/// Log the totals of a finished run.
pub fn log_run_end(summary: &RunSummary) {
    info!(
        ticks = summary.ticks,
        skipped = summary.skipped,
        delivered = summary.delivered,
        failed = summary.failed,
        "reconciliation loop stopped"
    );
}
