//! Step ledger storage for durable workflow runs.
//!
//! A *run* is one execution of a workflow for one trigger event. The ledger
//! persists each run's payload, lifecycle status, and the checkpointed
//! results of its named steps. Everything the runner needs to survive a
//! process restart lives here; workers hold no state of their own.
//!
//! # Claim protocol
//!
//! Runs are claimed with a lock lease (`locked_by`/`locked_until`), the same
//! protocol a multi-worker outbox uses: a claim makes the run invisible to
//! other workers for the lease duration, and a crashed worker's run becomes
//! claimable again once the lease expires. Workers must settle a claimed run
//! — [`complete`](LedgerStore::complete), [`suspend`](LedgerStore::suspend),
//! [`record_retry`](LedgerStore::record_retry), or
//! [`fail`](LedgerStore::fail) — before the lease runs out.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::Result;

/// Lifecycle status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Ready to execute (possibly waiting out a retry backoff).
    Pending,
    /// Suspended at a `sleep_until` point; wakes at `wake_at`.
    Sleeping,
    /// All steps finished.
    Completed,
    /// Permanently failed; requires manual intervention.
    Failed,
}

impl RunStatus {
    /// Stable string form used by persistent ledgers.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Sleeping => "sleeping",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// Parse the string form back into a status.
    pub fn from_str(value: &str) -> Option<RunStatus> {
        match value {
            "pending" => Some(RunStatus::Pending),
            "sleeping" => Some(RunStatus::Sleeping),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// A checkpointed step result.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// The step's name, unique within its run.
    pub name: String,
    /// The recorded output, substituted on replay.
    pub output: Value,
}

/// A run claimed for execution, with its replay data.
#[derive(Debug, Clone)]
pub struct ClaimedRun {
    pub id: Uuid,
    /// Workflow kind string (e.g. `race.initiate`).
    pub kind: String,
    /// Correlation key; one active run per `(kind, key)`.
    pub key: String,
    /// The trigger event payload.
    pub payload: Value,
    /// Failed attempts of the step currently being retried.
    pub attempts: u32,
    /// Checkpointed steps, in recording order.
    pub steps: Vec<StepRecord>,
}

impl ClaimedRun {
    /// Steps as a name-keyed map for replay lookup.
    pub fn step_map(&self) -> HashMap<String, Value> {
        self.steps
            .iter()
            .map(|step| (step.name.clone(), step.output.clone()))
            .collect()
    }
}

/// Observable state of a run, for monitoring and tests.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub id: Uuid,
    pub kind: String,
    pub key: String,
    pub status: RunStatus,
    pub attempts: u32,
    /// Next time the run becomes claimable (suspension or retry backoff).
    pub wake_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    /// Names of checkpointed steps, in recording order.
    pub step_names: Vec<String>,
}

/// A permanently failed run held for inspection.
#[derive(Debug, Clone)]
pub struct FailedRun {
    pub id: Uuid,
    pub kind: String,
    pub key: String,
    pub payload: Value,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Persistent storage for workflow runs and their step checkpoints.
///
/// Two implementations are provided: [`MemoryLedger`](super::MemoryLedger)
/// for tests and local development, and `PgLedger` for production (requires
/// the `postgres` feature).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Enqueue a run for a trigger event.
    ///
    /// Idempotent on `(kind, key)`: if a run already exists for the
    /// correlation key — active, completed, or failed — its id is returned
    /// and nothing is created. Trigger delivery is at-least-once; duplicates
    /// must attach to the existing run.
    async fn enqueue(&self, kind: &str, key: &str, payload: Value) -> Result<Uuid>;

    /// Claim the next due run for execution.
    ///
    /// A run is due when it is `Pending` or `Sleeping`, its `wake_at` has
    /// passed (or is unset), and no live lease holds it. Claiming acquires a
    /// lease for `lease` and clears any wake time. Claiming a sleeping run
    /// checkpoints its pending `sleep_until` step, so the re-entered body
    /// replays past the suspension point.
    async fn claim_due(&self, worker_id: &str, lease: Duration) -> Result<Option<ClaimedRun>>;

    /// Checkpoint a completed step.
    ///
    /// Resets the run's attempt counter: retries budget the *failing step*,
    /// not the whole run, and a successful step opens a fresh budget.
    async fn record_step(&self, run_id: Uuid, name: &str, output: Value) -> Result<()>;

    /// Mark the run completed and release its lease.
    async fn complete(&self, run_id: Uuid) -> Result<()>;

    /// Suspend the run at a `sleep_until` step until an absolute time.
    ///
    /// Releases the lease; the run holds no process resources while
    /// suspended and may resume on a different worker. `step` is recorded
    /// as completed by the claim that wakes the run.
    async fn suspend(&self, run_id: Uuid, step: &str, wake_at: OffsetDateTime) -> Result<()>;

    /// Record a transient step failure and schedule a retry after `backoff`.
    ///
    /// Increments the attempt counter and releases the lease.
    async fn record_retry(&self, run_id: Uuid, error: &str, backoff: Duration) -> Result<()>;

    /// Mark the run permanently failed and release its lease.
    async fn fail(&self, run_id: Uuid, error: &str) -> Result<()>;

    /// Fetch the observable state of a run.
    async fn run_state(&self, run_id: Uuid) -> Result<Option<RunSnapshot>>;

    /// Fetch permanently failed runs, oldest first.
    async fn fetch_failed(&self, limit: u32) -> Result<Vec<FailedRun>>;
}
