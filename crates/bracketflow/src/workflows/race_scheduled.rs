//! Match setup on race scheduling.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{decode_event, RACE_SCHEDULED};
use crate::client::{MetaModel, TournamentStore, WriteMode};
use crate::error::Error;
use crate::progression::{self, SetupAction};
use crate::record::meta;
use crate::runner::{RunContext, StepOutcome, WorkflowHandler};

/// Handles `race.scheduled`: initializes the match's `status` and
/// `higher_seed` metafields if they are absent.
///
/// A single durable step wraps both writes. Each write is itself a no-op
/// when the field already exists, so redelivery and retries converge on the
/// same final state regardless of where a previous attempt stopped.
pub struct RaceScheduledWorkflow<S> {
    store: S,
}

impl<S> RaceScheduledWorkflow<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: TournamentStore> WorkflowHandler for RaceScheduledWorkflow<S> {
    fn kind(&self) -> &'static str {
        RACE_SCHEDULED
    }

    async fn execute(&self, ctx: &mut RunContext<'_>, payload: &Value) -> StepOutcome<()> {
        let event = decode_event(payload)?;

        ctx.run("setup-match", || async {
            let record = self
                .store
                .fetch_match(&event.match_id)
                .await?
                .ok_or_else(|| Error::MatchNotFound(event.match_id.clone()))?;

            for action in progression::setup_actions(&record) {
                let (key, value) = match &action {
                    SetupAction::SetStatus(state) => (meta::STATUS, state.slug()),
                    SetupAction::SetHigherSeed(racer_id) => {
                        (meta::HIGHER_SEED, racer_id.as_str())
                    }
                };
                info!(match_id = %event.match_id, key, value, "Initializing match metafield");
                self.store
                    .put_metafield(MetaModel::Match, &event.match_id, key, value, WriteMode::Create)
                    .await?;
            }

            Ok(())
        })
        .await
    }
}
