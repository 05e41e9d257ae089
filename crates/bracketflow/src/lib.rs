//! Durable match-progression workflows for bracket-style racing tournaments.
//!
//! Bracketflow coordinates a two-player, best-of-three racing match: it
//! initializes matches when races are scheduled, advances the pick/veto
//! state machine when race rooms go live, reminds players to set up their
//! options, and assigns the decider race's mode from whatever the pick/veto
//! phase left over.
//!
//! Everything runs as durable workflows:
//!
//! - **Step checkpointing** — workflow bodies are re-entered from the top
//!   and replay recorded steps, so each externally-visible effect happens
//!   at most once across retries, suspensions, and process restarts
//! - **Wall-clock suspension** — a run can sleep until an absolute time
//!   (ten minutes before a scheduled race) while holding no process state
//! - **Leased claims** — workers coordinate through the step ledger, so a
//!   crashed worker's run is picked up by another once its lease expires
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                       TournamentRuntime                            │
//! │                                                                    │
//! │   submit(event) ──► LedgerStore::enqueue (idempotent per race)     │
//! │                                                                    │
//! │   RunWorker: claim_due ──► WorkflowHandler::execute                │
//! │     └─ RunContext::run / sleep_until  ──► step checkpoints         │
//! │     └─ settle: complete / suspend / retry with backoff / fail      │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use bracketflow::client::InertiaClient;
//! use bracketflow::runner::{MemoryLedger, TournamentRuntime};
//! use bracketflow::workflows::{RaceScheduledWorkflow, RaceStartWorkflow};
//! use bracketflow::TournamentConfig;
//!
//! let config = TournamentConfig::from_env();
//! let client = InertiaClient::new(config.clone());
//! let runtime = TournamentRuntime::builder(MemoryLedger::default())
//!     .register(RaceScheduledWorkflow::new(client.clone()))?
//!     .register(RaceStartWorkflow::new(client.clone(), client, config))?
//!     .build();
//!
//! runtime.submit(&event).await?;
//! runtime.run(shutdown_rx).await;
//! ```
//!
//! # Feature Flags
//!
//! - `postgres` — Enables [`runner::PgLedger`] for production use with
//!   PostgreSQL
//!
//! # Design Documentation
//!
//! See `DESIGN.md` for architectural decisions and future work.

pub mod catalog;
pub mod client;
mod config;
mod error;
pub mod progression;
pub mod record;
pub mod runner;
pub mod workflows;

pub use config::TournamentConfig;
pub use error::{Error, Result};
