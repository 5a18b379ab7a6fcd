//! TargetHandle - owns a target in an isolated worker task
//!
//! The dispatcher talks to every target through a command channel and waits
//! for the verdict, so a panicking target surfaces as a delivery failure
//! instead of taking the dispatcher down.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use contracts::{ContractError, LogRecord, Target};

use crate::metrics::TargetMetrics;

type Verdict = Result<(), ContractError>;

enum Command {
    Log {
        record: Arc<LogRecord>,
        reply: oneshot::Sender<Verdict>,
    },
}

/// Suspension state of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Active,
    /// Skipped until the deadline passes
    SuspendedUntil(Instant),
}

/// Handle to a running target worker
pub struct TargetHandle {
    /// Target name
    name: String,
    /// Rank threshold assigned by the initializer
    threshold: i64,
    /// Channel to send commands to worker
    tx: mpsc::Sender<Command>,
    /// Shared metrics
    metrics: Arc<TargetMetrics>,
    /// Worker task handle, yields the result of `Target::stop`
    worker_handle: JoinHandle<Verdict>,
    state: TargetState,
}

impl fmt::Debug for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetHandle")
            .field("name", &self.name)
            .field("threshold", &self.threshold)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl TargetHandle {
    /// Create a new TargetHandle and spawn the worker task
    pub fn spawn<T: Target + 'static>(target: T, threshold: i64) -> Self {
        let name = target.name().to_string();
        // Deliveries are awaited one at a time
        let (tx, rx) = mpsc::channel(1);
        let metrics = Arc::new(TargetMetrics::new());

        let worker_name = name.clone();
        let worker_handle = tokio::spawn(async move { target_worker(target, rx, worker_name).await });

        Self {
            name,
            threshold,
            tx,
            metrics,
            worker_handle,
            state: TargetState::Active,
        }
    }

    /// Get target name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<TargetMetrics> {
        &self.metrics
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    /// Whether the target is suspended at `now`. An expired suspension is
    /// cleared here.
    pub fn is_suspended(&mut self, now: Instant) -> bool {
        match self.state {
            TargetState::SuspendedUntil(deadline) if now < deadline => true,
            TargetState::SuspendedUntil(_) => {
                self.state = TargetState::Active;
                debug!(target_name = %self.name, "Target suspension expired");
                false
            }
            TargetState::Active => false,
        }
    }

    /// Suspend for `timeout` starting at `now`.
    ///
    /// A running suspension keeps its deadline. Returns true if the target
    /// was active before.
    pub fn suspend(&mut self, now: Instant, timeout: Duration) -> bool {
        if self.is_suspended(now) {
            return false;
        }
        self.state = TargetState::SuspendedUntil(now + timeout);
        true
    }

    /// Hand a record to the worker and wait until the target handled it
    pub async fn deliver(&self, record: Arc<LogRecord>) -> Verdict {
        let unavailable = || ContractError::TargetUnavailable {
            target: self.name.clone(),
        };

        let (reply, verdict) = oneshot::channel();
        self.tx
            .send(Command::Log { record, reply })
            .await
            .map_err(|_| unavailable())?;

        verdict.await.map_err(|_| unavailable())?
    }

    /// Shutdown the target worker, returning the result of `Target::stop`
    #[instrument(name = "target_handle_shutdown", skip(self), fields(target_name = %self.name))]
    pub async fn shutdown(self) -> Verdict {
        // Drop sender to signal worker to stop
        drop(self.tx);
        let result = match self.worker_handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(target_name = %self.name, error = ?e, "Worker task panicked");
                Err(ContractError::target_stop(&self.name, "worker task panicked"))
            }
        };
        debug!(target_name = %self.name, "TargetHandle shutdown complete");
        result
    }
}

/// Worker task that hands records to the target
#[instrument(name = "target_worker_loop", skip(target, rx), fields(target_name = %name))]
async fn target_worker<T: Target>(
    mut target: T,
    mut rx: mpsc::Receiver<Command>,
    name: String,
) -> Verdict {
    debug!(target_name = %name, "Target worker started");

    while let Some(command) = rx.recv().await {
        match command {
            Command::Log { record, reply } => {
                let verdict = target.log(&record).await;
                // Dispatcher only drops the receiver if it is going away itself
                let _ = reply.send(verdict);
            }
        }
    }

    let result = target.stop().await;
    debug!(target_name = %name, "Target worker stopped");
    result
}
