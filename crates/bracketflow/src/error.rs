//! Error types for bracketflow.

use thiserror::Error;

/// A `Result` alias with [`enum@Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in bracketflow operations.
///
/// Errors are classified as permanent or transient via
/// [`is_permanent`](Error::is_permanent). Permanent errors abort a workflow
/// run outright; transient errors cause the runner to retry the failing step
/// with backoff.
#[derive(Debug, Error)]
pub enum Error {
    /// The match record does not exist in the tournament store.
    ///
    /// Permanent: retrying cannot make the match appear, and the run is
    /// flagged for manual intervention.
    #[error("match {0} not found")]
    MatchNotFound(String),

    /// The race is not part of the match's race list.
    #[error("race {race_id} not found in match {match_id}")]
    RaceNotFound {
        /// The match that was searched.
        match_id: String,
        /// The race id from the trigger event.
        race_id: String,
    },

    /// Every catalog mode is already consumed by the pick/veto metafields.
    ///
    /// With well-formed data exactly one mode remains before the decider
    /// race, so this indicates an upstream data inconsistency.
    #[error("no race mode left to assign for match {0}")]
    NoModeRemaining(String),

    /// A recorded step checkpoint no longer matches the expected type.
    ///
    /// This typically means the workflow code changed shape between the
    /// original execution and a resume. Replaying cannot succeed, so the
    /// run is failed permanently.
    #[error("failed to decode checkpoint for step {step}: {source}")]
    Checkpoint {
        /// The step whose recorded output failed to decode.
        step: String,
        /// The underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to serialize or deserialize a payload or step result.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request to the tournament store or messaging relay failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Tournament store call failed for a non-HTTP reason.
    #[error("store error: {0}")]
    Store(String),

    /// Race room message delivery failed.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Step ledger operation failed.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// A run was claimed for a workflow kind with no registered handler.
    #[error("unknown workflow kind: {0}")]
    UnknownWorkflowKind(String),

    /// A workflow kind was registered more than once.
    #[error("duplicate workflow kind registration: {0}")]
    DuplicateWorkflowKind(String),

    /// PostgreSQL ledger error.
    ///
    /// Preserves the full `sqlx::Error` for matching on specific database
    /// error conditions (connection timeout, constraint violation, etc.).
    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),
}

impl Error {
    /// Returns `true` if this error should abort a workflow run permanently.
    ///
    /// Everything else is treated as transient and retried with backoff up
    /// to the configured ceiling.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Error::MatchNotFound(_)
                | Error::RaceNotFound { .. }
                | Error::NoModeRemaining(_)
                | Error::Checkpoint { .. }
                | Error::Serialization(_)
                | Error::UnknownWorkflowKind(_)
                | Error::DuplicateWorkflowKind(_)
        )
    }
}
