//! Durable workflow runner.
//!
//! Workflow bodies are re-entered from the top on every claim, replaying
//! checkpointed steps from the ledger and executing only the steps not yet
//! recorded. This keeps each externally-visible effect (a store write, a
//! chat message) bounded to at most one execution across retries,
//! suspensions, and process restarts.
//!
//! The moving parts:
//!
//! - [`LedgerStore`] persists runs and step checkpoints
//!   ([`MemoryLedger`] for tests, `PgLedger` behind the `postgres` feature)
//! - [`RunContext`] gives workflow bodies `run` / `sleep_until`
//! - [`WorkflowHandler`] is the trait workflows implement
//! - [`TournamentRuntime`] wires handlers to a worker pool over the ledger

mod config;
mod context;
mod ledger;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod registry;
mod retry;
mod worker;

pub use config::WorkerConfig;
pub use context::{Interrupt, RunContext, StepOutcome};
pub use ledger::{ClaimedRun, FailedRun, LedgerStore, RunSnapshot, RunStatus, StepRecord};
pub use memory::MemoryLedger;
#[cfg(feature = "postgres")]
pub use postgres::PgLedger;
pub use registry::{RuntimeBuilder, TournamentRuntime, WorkflowHandler};
pub use retry::RetryPolicy;
