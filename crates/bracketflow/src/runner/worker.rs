//! Run worker: claims due runs from the ledger and executes them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::config::WorkerConfig;
use super::context::{Interrupt, RunContext};
use super::ledger::LedgerStore;
use super::registry::WorkflowHandler;
use crate::error::Error;

/// Polls the ledger for due runs and drives them to a settled state.
///
/// Each claimed run ends this entry in exactly one of four ways: completed,
/// suspended (a `sleep_until` point in the future), rescheduled for retry
/// (transient step failure), or permanently failed. Multiple workers
/// coordinate through the ledger's claim lease, so a run is never executed
/// twice concurrently.
pub(crate) struct RunWorker<L> {
    ledger: L,
    handlers: Arc<HashMap<&'static str, Arc<dyn WorkflowHandler>>>,
    config: WorkerConfig,
    worker_id: String,
}

impl<L> RunWorker<L>
where
    L: LedgerStore + Clone + 'static,
{
    pub fn new(
        ledger: L,
        handlers: Arc<HashMap<&'static str, Arc<dyn WorkflowHandler>>>,
        config: WorkerConfig,
        worker_id: String,
    ) -> Self {
        Self {
            ledger,
            handlers,
            config,
            worker_id,
        }
    }

    /// Run the worker until the shutdown signal.
    ///
    /// Polls at `poll_interval`; when the shutdown receiver signals, the
    /// worker finishes the run in flight (if any) and exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut poll_interval = interval(self.config.poll_interval);
        poll_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(worker_id = %self.worker_id, "Run worker started");

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    if let Err(e) = self.process_one().await {
                        error!(worker_id = %self.worker_id, error = %e, "Error processing run");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(worker_id = %self.worker_id, "Run worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Try to claim and settle one run.
    async fn process_one(&self) -> crate::Result<()> {
        let Some(run) = self
            .ledger
            .claim_due(&self.worker_id, self.config.lock_duration)
            .await?
        else {
            return Ok(()); // Nothing due
        };

        debug!(
            run_id = %run.id,
            kind = %run.kind,
            key = %run.key,
            attempt = run.attempts + 1,
            "Processing run"
        );

        let Some(handler) = self.handlers.get(run.kind.as_str()) else {
            let e = Error::UnknownWorkflowKind(run.kind.clone());
            error!(run_id = %run.id, error = %e, "No handler registered; failing run");
            self.ledger.fail(run.id, &e.to_string()).await?;
            return Ok(());
        };

        let mut ctx = RunContext::new(&self.ledger, run.id, run.step_map());

        match handler.execute(&mut ctx, &run.payload).await {
            Ok(()) => {
                self.ledger.complete(run.id).await?;
                debug!(run_id = %run.id, "Run completed");
            }
            Err(Interrupt::Suspend { step, wake_at }) => {
                self.ledger.suspend(run.id, &step, wake_at).await?;
                debug!(run_id = %run.id, step = %step, wake_at = %wake_at, "Run suspended");
            }
            Err(Interrupt::Abort(e)) => {
                error!(run_id = %run.id, error = %e, "Run failed permanently");
                self.ledger.fail(run.id, &e.to_string()).await?;
            }
            Err(Interrupt::Retry(e)) => {
                let attempt = run.attempts + 1;
                if self.config.retry_policy.should_retry(attempt) {
                    let backoff = self.config.retry_policy.backoff_duration(attempt);
                    warn!(
                        run_id = %run.id,
                        error = %e,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Step failed; scheduling retry"
                    );
                    self.ledger
                        .record_retry(run.id, &e.to_string(), backoff)
                        .await?;
                } else {
                    error!(
                        run_id = %run.id,
                        error = %e,
                        attempt,
                        "Retry ceiling reached; failing run"
                    );
                    self.ledger.fail(run.id, &e.to_string()).await?;
                }
            }
        }

        Ok(())
    }
}
