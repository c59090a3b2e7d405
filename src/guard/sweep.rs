//! Periodic eviction of expired throttle records
//!
//! The guard's record map grows with every new identity; this service drops
//! records whose window and block have both expired.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, instrument};

use super::AccessGuard;

/// Record sweeper configuration
#[derive(Debug, Clone)]
pub struct RecordSweeperConfig {
    /// How often to sweep expired records
    pub sweep_interval: Duration,
}

impl Default for RecordSweeperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(600),
        }
    }
}

/// Record sweeper service
///
/// Periodically calls [`AccessGuard::sweep`] on the guard it watches.
pub struct RecordSweeper {
    guard: Arc<AccessGuard>,
    config: RecordSweeperConfig,
}

impl RecordSweeper {
    pub fn new(guard: Arc<AccessGuard>, config: RecordSweeperConfig) -> Self {
        Self { guard, config }
    }

    /// Run the sweeper (call in a spawned task)
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting record sweeper with {}s interval",
            self.config.sweep_interval.as_secs()
        );

        let mut sweep_interval = interval(self.config.sweep_interval);
        sweep_interval.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    let removed = self.guard.sweep();
                    if removed > 0 {
                        info!("Swept {} expired client records", removed);
                    } else {
                        debug!("Sweep found no expired client records");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Record sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Guard for managing record sweeper lifecycle
pub struct RecordSweeperHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl RecordSweeperHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for RecordSweeperHandle {
    fn default() -> Self {
        Self::new().0
    }
}
