//! Bounded-concurrency task queue with paced dispatch
//!
//! Jobs dispatch in FIFO order, at most `concurrency` at a time, with at
//! least `wait` between successive dispatches and at most `timeout` for each
//! job to settle. Per job: Queued → Dispatched → Succeeded | Failed | TimedOut.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

use crate::error::{Result, TrawlError};

/// Task queue configuration, fixed at construction
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of jobs executing at once
    pub concurrency: usize,
    /// Minimum pause between successive dispatches
    pub wait: Duration,
    /// Maximum time a dispatched job may take to settle
    pub timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            wait: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Terminal state of a dispatched job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded => "succeeded",
            JobOutcome::Failed => "failed",
            JobOutcome::TimedOut => "timed_out",
        }
    }
}

/// The injected job body the queue dispatches payloads to
#[async_trait]
pub trait JobRunner<T>: Send + Sync {
    async fn run(&self, payload: T) -> Result<()>;
}

/// Snapshot of queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Default)]
struct QueueState {
    /// Jobs queued or in flight
    outstanding: AtomicUsize,
    in_flight: AtomicUsize,
    drained: Notify,
    enqueued: AtomicU64,
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

impl QueueState {
    fn record_settled(&self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Succeeded => self.succeeded.fetch_add(1, Ordering::Relaxed),
            JobOutcome::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
            JobOutcome::TimedOut => self.timed_out.fetch_add(1, Ordering::Relaxed),
        };

        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }
}

struct QueueJob<T> {
    payload: T,
    enqueued_at: Instant,
}

/// Bounded-concurrency task queue
///
/// Every enqueued payload is passed to the runner exactly once; outcomes
/// settle independently and never abort sibling jobs.
pub struct TaskQueue<T: Send + 'static> {
    tx: Mutex<Option<mpsc::UnboundedSender<QueueJob<T>>>>,
    state: Arc<QueueState>,
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Start the scheduler loop and return the queue handle
    pub fn spawn(config: QueueConfig, runner: Arc<dyn JobRunner<T>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState::default());
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));

        tokio::spawn(scheduler(rx, config, runner, state.clone(), semaphore));

        Self {
            tx: Mutex::new(Some(tx)),
            state,
        }
    }

    /// Queue a payload for dispatch
    pub fn enqueue(&self, payload: T) -> Result<()> {
        let tx = self.tx.lock();
        let tx = tx.as_ref().ok_or(TrawlError::QueueClosed)?;

        self.state.outstanding.fetch_add(1, Ordering::AcqRel);
        let job = QueueJob {
            payload,
            enqueued_at: Instant::now(),
        };

        if tx.send(job).is_err() {
            self.state.outstanding.fetch_sub(1, Ordering::AcqRel);
            return Err(TrawlError::QueueClosed);
        }

        self.state.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Stop intake; already-queued jobs still run to completion
    pub fn close(&self) {
        self.tx.lock().take();
    }

    /// Wait until no job remains queued or in flight
    ///
    /// Fires whenever outstanding work reaches zero; enqueues after that
    /// re-arm it, so it can be awaited again.
    pub async fn drained(&self) {
        loop {
            let notified = self.state.drained.notified();
            if self.state.outstanding.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Jobs queued or executing
    pub fn outstanding(&self) -> usize {
        self.state.outstanding.load(Ordering::Acquire)
    }

    /// Jobs currently executing
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.state.enqueued.load(Ordering::Relaxed),
            dispatched: self.state.dispatched.load(Ordering::Relaxed),
            succeeded: self.state.succeeded.load(Ordering::Relaxed),
            failed: self.state.failed.load(Ordering::Relaxed),
            timed_out: self.state.timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Single scheduler loop driving all dispatch decisions
async fn scheduler<T: Send + 'static>(
    mut rx: mpsc::UnboundedReceiver<QueueJob<T>>,
    config: QueueConfig,
    runner: Arc<dyn JobRunner<T>>,
    state: Arc<QueueState>,
    semaphore: Arc<Semaphore>,
) {
    debug!(concurrency = config.concurrency, "Task queue scheduler started");

    while let Some(job) = rx.recv().await {
        // Capped at `concurrency`: wait for a slot before dispatching
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        state.dispatched.fetch_add(1, Ordering::Relaxed);
        state.in_flight.fetch_add(1, Ordering::AcqRel);

        let runner = runner.clone();
        let state = state.clone();
        let job_timeout = config.timeout;

        tokio::spawn(async move {
            let _permit = permit;
            debug!(queued_for = ?job.enqueued_at.elapsed(), "Dispatching job");

            let outcome = match timeout(job_timeout, runner.run(job.payload)).await {
                Ok(Ok(())) => JobOutcome::Succeeded,
                Ok(Err(e)) => {
                    warn!("Job failed: {}", e);
                    JobOutcome::Failed
                }
                // The slot is freed either way; the underlying operation is
                // dropped, not awaited further.
                Err(_) => {
                    warn!("Job timed out after {:?}", job_timeout);
                    JobOutcome::TimedOut
                }
            };

            debug!(outcome = outcome.as_str(), "Job settled");
            state.record_settled(outcome);
        });

        sleep(config.wait).await;
    }

    debug!("Task queue scheduler stopped");
}
