//! Fixed-cadence scheduler with a single run slot.
//!
//! The first interval tick fires immediately, so a run happens at startup.
//! Each run is spawned onto its own task; a tick that arrives while a run
//! is still in flight is dropped. A failed run is logged and the next tick
//! is the retry.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::orchestrator::Orchestrator;
use crate::types::RunReport;

// ---------------------------------------------------------------------------
// Run slot
// ---------------------------------------------------------------------------

/// Single-slot guard: at most one `RunPermit` exists at a time.
#[derive(Debug, Clone, Default)]
pub struct RunSlot {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of a run; frees the slot on drop (panics included).
#[derive(Debug)]
pub struct RunPermit {
    busy: Arc<AtomicBool>,
}

impl RunSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit { busy: self.busy.clone() })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    slot: RunSlot,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
            slot: RunSlot::new(),
        }
    }

    pub fn slot(&self) -> &RunSlot {
        &self.slot
    }

    /// Start a run on a new task unless one is already in flight.
    pub fn trigger(&self) -> Option<JoinHandle<Option<RunReport>>> {
        let Some(permit) = self.slot.try_acquire() else {
            warn!("Previous run still in flight, skipping trigger");
            return None;
        };

        let orchestrator = self.orchestrator.clone();
        Some(tokio::spawn(async move {
            let _permit = permit;
            match orchestrator.run_once().await {
                Ok(report) => {
                    log_run_report(&report);
                    Some(report)
                }
                Err(e) => {
                    error!(error = %format!("{e:#}"), "Run failed, continuing to next");
                    None
                }
            }
        }))
    }

    /// Tick until `shutdown` resolves, then wait for any in-flight run.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        let mut in_flight: Option<JoinHandle<Option<RunReport>>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(handle) = self.trigger() {
                        in_flight = Some(handle);
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received.");
                    break;
                }
            }
        }

        if let Some(handle) = in_flight {
            if !handle.is_finished() {
                info!("Waiting for in-flight run to finish");
            }
            if let Err(e) = handle.await {
                error!(error = %e, "Run task panicked");
            }
        }
    }
}

/// Log a one-line run summary.
fn log_run_report(report: &RunReport) {
    info!(
        held = report.held,
        priced = report.priced,
        unpriced = report.unpriced,
        failed_batches = report.failed_batches,
        events = report.events.len(),
        notified = report.notified,
        notify_failures = report.notify_failures,
        elapsed_ms = report.duration().num_milliseconds(),
        "Run complete"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
