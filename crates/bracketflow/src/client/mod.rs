//! Client contracts for the external tournament store and race room relay.
//!
//! The workflows only ever touch these two traits; the production
//! implementation ([`InertiaClient`]) lives in [`inertia`], and tests supply
//! recording fakes. Failures from either system are transient by default —
//! the runner retries the calling step with backoff.

mod inertia;

use async_trait::async_trait;

use crate::error::Result;
use crate::record::MatchRecord;

pub use inertia::{InertiaClient, METAFIELDS_PATH, RACE_MESSAGE_PATH};

/// Which entity kind a metafield is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaModel {
    Match,
    User,
}

impl MetaModel {
    /// Wire value used by the store API.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaModel::Match => "match",
            MetaModel::User => "user",
        }
    }
}

/// Whether a metafield write creates a new field or updates an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

/// Read/write access to tournament data.
///
/// The store owns match, race, and racer records; this interface only reads
/// snapshots and appends or overwrites metafields.
#[async_trait]
pub trait TournamentStore: Send + Sync + 'static {
    /// Fetch a match snapshot by id. `Ok(None)` means the match does not
    /// exist — callers decide whether that is a permanent failure.
    async fn fetch_match(&self, match_id: &str) -> Result<Option<MatchRecord>>;

    /// Create or update a metafield on an entity.
    async fn put_metafield(
        &self,
        model: MetaModel,
        model_id: &str,
        key: &str,
        value: &str,
        mode: WriteMode,
    ) -> Result<()>;
}

/// Sends a text message to a live race room identified by URL.
#[async_trait]
pub trait RaceRoomGateway: Send + Sync + 'static {
    async fn send_message(&self, room_url: &str, text: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_model_wire_values() {
        assert_eq!(MetaModel::Match.as_str(), "match");
        assert_eq!(MetaModel::User.as_str(), "user");
    }
}
