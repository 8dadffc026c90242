//! Coordinator loop - pairs registered units and runs one cycle at a time

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::cycle::{Cycle, CycleReport};
use crate::error::CycleError;
use crate::registry::Registry;

/// Counters kept by the coordinator loop (in memory only)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorMetrics {
    pub ticks: u64,
    pub waiting_ticks: u64,
    pub cycles_completed: u64,
    pub cycles_aborted: u64,
}

/// What a single tick did
#[derive(Debug)]
pub enum TickOutcome {
    /// Fewer than two units were registered
    Waiting { registered: usize },
    Completed(CycleReport),
    Aborted(CycleError),
}

/// Drives cycles over the first two registered units
pub struct Coordinator {
    registry: Arc<Registry>,
    poll_interval: Duration,
    ack_timeout: Option<Duration>,
    /// Held for a whole tick so no two cycles ever overlap
    cycle_gate: tokio::sync::Mutex<()>,
    metrics: Mutex<CoordinatorMetrics>,
}

impl Coordinator {
    pub fn new(registry: Arc<Registry>, config: &CoordinatorConfig) -> Self {
        debug!(
            poll_interval_ms = config.poll_interval_ms,
            ack_timeout_ms = config.ack_timeout_ms,
            "Coordinator::new: called"
        );
        Self {
            registry,
            poll_interval: config.poll_interval(),
            ack_timeout: config.ack_timeout(),
            cycle_gate: tokio::sync::Mutex::new(()),
            metrics: Mutex::new(CoordinatorMetrics::default()),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn metrics(&self) -> CoordinatorMetrics {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, update: impl FnOnce(&mut CoordinatorMetrics)) {
        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut *metrics);
    }

    /// Snapshot the registry and, given two units, run one cycle to completion
    ///
    /// A failed cycle is logged and returned, never propagated.
    pub async fn tick(&self) -> TickOutcome {
        let _gate = self.cycle_gate.lock().await;
        self.record(|m| m.ticks += 1);

        let snapshot = self.registry.snapshot();
        let [a, b, ..] = snapshot.as_slice() else {
            info!(registered = snapshot.len(), "Waiting for at least 2 signal units...");
            self.record(|m| m.waiting_ticks += 1);
            return TickOutcome::Waiting {
                registered: snapshot.len(),
            };
        };

        match Cycle::new(a, b, self.ack_timeout).run().await {
            Ok(report) => {
                self.record(|m| m.cycles_completed += 1);
                TickOutcome::Completed(report)
            }
            Err(e) => {
                warn!(error = %e, "Error during cycle, a signal unit may have disconnected");
                self.record(|m| m.cycles_aborted += 1);
                TickOutcome::Aborted(e)
            }
        }
    }

    /// Tick every poll interval until shutdown is requested
    pub async fn run(&self, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(poll_interval = ?self.poll_interval, "Coordinator started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {
                    self.tick().await;
                }
                _ = shutdown_rx.recv() => {
                    debug!("Coordinator::run: shutdown signal received");
                    break;
                }
            }
        }

        info!("Coordinator stopped");
    }
}
