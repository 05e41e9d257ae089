//! Workflow registration and the tournament runtime.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use super::config::WorkerConfig;
use super::context::{RunContext, StepOutcome};
use super::ledger::{FailedRun, LedgerStore, RunSnapshot};
use super::worker::RunWorker;
use crate::error::{Error, Result};
use crate::workflows::TriggerEvent;

/// A durable workflow keyed by its trigger kind.
///
/// The body is re-entered from the top on every claim; durable effects go
/// through [`RunContext::run`] so they replay instead of re-executing.
#[async_trait]
pub trait WorkflowHandler: Send + Sync + 'static {
    /// The trigger kind this handler owns (e.g. `race.initiate`).
    fn kind(&self) -> &'static str;

    /// Execute the workflow body for one entry into a run.
    async fn execute(&self, ctx: &mut RunContext<'_>, payload: &Value) -> StepOutcome<()>;
}

/// Builder for [`TournamentRuntime`].
pub struct RuntimeBuilder<L> {
    ledger: L,
    handlers: HashMap<&'static str, Arc<dyn WorkflowHandler>>,
    config: WorkerConfig,
}

impl<L> RuntimeBuilder<L>
where
    L: LedgerStore + Clone + 'static,
{
    /// Register a workflow handler.
    pub fn register<H: WorkflowHandler>(mut self, handler: H) -> Result<Self> {
        let kind = handler.kind();
        if self.handlers.contains_key(kind) {
            return Err(Error::DuplicateWorkflowKind(kind.to_owned()));
        }
        self.handlers.insert(kind, Arc::new(handler));
        Ok(self)
    }

    /// Set the worker configuration.
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> TournamentRuntime<L> {
        TournamentRuntime {
            ledger: self.ledger,
            handlers: Arc::new(self.handlers),
            config: self.config,
        }
    }
}

/// The durable workflow runtime for match progression.
///
/// Owns the step ledger, the registered workflow handlers, and the worker
/// pool. Trigger events are submitted with [`submit`](Self::submit); workers
/// started by [`run`](Self::run) claim due runs and drive them to a settled
/// state. Cloning shares the same ledger and registry.
pub struct TournamentRuntime<L> {
    ledger: L,
    handlers: Arc<HashMap<&'static str, Arc<dyn WorkflowHandler>>>,
    config: WorkerConfig,
}

impl<L> Clone for TournamentRuntime<L>
where
    L: Clone,
{
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            handlers: Arc::clone(&self.handlers),
            config: self.config.clone(),
        }
    }
}

impl<L> TournamentRuntime<L>
where
    L: LedgerStore + Clone + 'static,
{
    pub fn builder(ledger: L) -> RuntimeBuilder<L> {
        RuntimeBuilder {
            ledger,
            handlers: HashMap::new(),
            config: WorkerConfig::default(),
        }
    }

    /// Submit a trigger event, enqueueing a durable run for it.
    ///
    /// Idempotent: redelivery of the same event attaches to the existing run
    /// and returns its id. Rejects kinds with no registered handler.
    pub async fn submit(&self, event: &TriggerEvent) -> Result<Uuid> {
        let kind = event.kind();
        if !self.handlers.contains_key(kind) {
            return Err(Error::UnknownWorkflowKind(kind.to_owned()));
        }

        let data = event.data();
        let payload = serde_json::to_value(data)?;
        let run_id = self
            .ledger
            .enqueue(kind, &data.correlation_key(), payload)
            .await?;

        info!(
            %run_id,
            kind,
            match_id = %data.match_id,
            race_id = %data.race_id,
            "Trigger event submitted"
        );
        Ok(run_id)
    }

    /// Run the worker pool until the shutdown signal.
    ///
    /// Spawns `config.workers` workers, then waits for all of them to drain
    /// after shutdown, up to `config.shutdown_timeout`.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let base_id = self
            .config
            .worker_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut handles = Vec::with_capacity(self.config.workers);
        for n in 0..self.config.workers {
            let worker = RunWorker::new(
                self.ledger.clone(),
                Arc::clone(&self.handlers),
                self.config.clone(),
                format!("{base_id}-{n}"),
            );
            handles.push(tokio::spawn(worker.run(shutdown.clone())));
        }

        let drain = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Run worker task panicked");
                }
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout, drain)
            .await
            .is_err()
        {
            warn!("Shutdown timeout elapsed with workers still running");
        }
    }

    /// Observable state of a run, for monitoring and tests.
    pub async fn run_state(&self, run_id: Uuid) -> Result<Option<RunSnapshot>> {
        self.ledger.run_state(run_id).await
    }

    /// Permanently failed runs held for manual intervention.
    pub async fn fetch_failed(&self, limit: u32) -> Result<Vec<FailedRun>> {
        self.ledger.fetch_failed(limit).await
    }

    /// The underlying step ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }
}
