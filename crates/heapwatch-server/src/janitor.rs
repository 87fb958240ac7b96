// crates/heapwatch-server/src/janitor.rs
// ============================================================================
// Module: Heapwatch Lifecycle Janitors
// Description: Cancellable background loops for the two sweeps.
// Purpose: Run the shared sweep logic on fixed intervals for process life.
// Dependencies: heapwatch-core, tokio
// ============================================================================

//! ## Overview
//! Two independent, uncoordinated timer loops: the stale sweep force-finishes
//! abandoned runs, the retention sweep deletes runs past the cutoff. Each
//! loop selects over its interval tick and a shared shutdown watch channel so
//! tests and graceful shutdown can stop them deterministically. The loops
//! call the same `heapwatch_core::sweep` functions as the admin endpoints;
//! only the trigger label differs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use heapwatch_core::SharedRunStore;
use heapwatch_core::retention_sweep;
use heapwatch_core::stale_sweep;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;

use crate::audit::AuditSink;
use crate::audit::SweepAuditEvent;
use crate::handlers::run_blocking;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Intervals and thresholds for the background sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JanitorConfig {
    /// Interval between stale sweeps.
    pub stale_sweep_interval: Duration,
    /// Inactivity window after which an unfinished run counts as stale.
    pub stale_timeout: Duration,
    /// Interval between retention sweeps.
    pub retention_sweep_interval: Duration,
    /// Age beyond which run documents are deleted.
    pub retention_period: Duration,
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Handle over the spawned janitor tasks.
pub struct JanitorHandle {
    /// Shutdown signal sender; flipping to true stops both loops.
    shutdown: watch::Sender<bool>,
    /// Spawned loop tasks.
    tasks: Vec<JoinHandle<()>>,
}

impl JanitorHandle {
    /// Signals both loops to stop and waits for them to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

// ============================================================================
// SECTION: Spawning
// ============================================================================

/// Spawns the two sweep loops. Each loop first fires one interval after
/// startup, then on its fixed period.
#[must_use]
pub fn spawn_janitors(
    store: SharedRunStore,
    audit: Arc<dyn AuditSink>,
    config: JanitorConfig,
) -> JanitorHandle {
    let (shutdown, stale_rx) = watch::channel(false);
    let retention_rx = shutdown.subscribe();
    let stale_task = tokio::spawn(stale_loop(
        store.clone(),
        Arc::clone(&audit),
        config.stale_sweep_interval,
        config.stale_timeout,
        stale_rx,
    ));
    let retention_task = tokio::spawn(retention_loop(
        store,
        audit,
        config.retention_sweep_interval,
        config.retention_period,
        retention_rx,
    ));
    JanitorHandle {
        shutdown,
        tasks: vec![stale_task, retention_task],
    }
}

/// Stale sweep loop body.
async fn stale_loop(
    store: SharedRunStore,
    audit: Arc<dyn AuditSink>,
    interval: Duration,
    stale_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let event = match run_blocking(|| stale_sweep(&store, stale_timeout)) {
                    Ok(report) => SweepAuditEvent::new(
                        "stale",
                        "background",
                        report.stale_found.len(),
                        report.failures.len(),
                        None,
                    ),
                    Err(err) => {
                        SweepAuditEvent::new("stale", "background", 0, 0, Some(err.to_string()))
                    }
                };
                audit.record_sweep(&event);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Retention sweep loop body.
async fn retention_loop(
    store: SharedRunStore,
    audit: Arc<dyn AuditSink>,
    interval: Duration,
    retention_period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let event = match run_blocking(|| retention_sweep(&store, retention_period)) {
                    Ok(report) => SweepAuditEvent::new(
                        "retention",
                        "background",
                        report.deleted_runs.len(),
                        0,
                        None,
                    ),
                    Err(err) => {
                        SweepAuditEvent::new("retention", "background", 0, 0, Some(err.to_string()))
                    }
                };
                audit.record_sweep(&event);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
