//! Match progression when a race room goes live.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{info, warn};

use super::{
    decode_event, final_mode_message, setup_message, ADVANCE_NOTICE_MESSAGE, RACE_INITIATE,
};
use crate::catalog::MatchState;
use crate::client::{MetaModel, RaceRoomGateway, TournamentStore, WriteMode};
use crate::config::TournamentConfig;
use crate::error::Error;
use crate::progression;
use crate::record::{meta, MatchRecord, RaceSlot};
use crate::runner::{RunContext, StepOutcome, WorkflowHandler};

/// Handles `race.initiate`: drives the match forward when a race room opens.
///
/// The earlier-race branch advances the pick/veto state, then holds the run
/// suspended until ten minutes before the scheduled start and reminds the
/// room to set up options. The decider branch assigns the one remaining mode
/// at random, announces it, and moves the match to its final playing state.
///
/// Every external effect sits inside a named durable step; the match
/// snapshot from `get-match` is itself a checkpoint, so all later decisions
/// replay against the same data no matter when the run resumes.
pub struct RaceStartWorkflow<S, G> {
    store: S,
    gateway: G,
    config: TournamentConfig,
}

impl<S, G> RaceStartWorkflow<S, G> {
    pub fn new(store: S, gateway: G, config: TournamentConfig) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }
}

#[async_trait]
impl<S, G> WorkflowHandler for RaceStartWorkflow<S, G>
where
    S: TournamentStore,
    G: RaceRoomGateway,
{
    fn kind(&self) -> &'static str {
        RACE_INITIATE
    }

    async fn execute(&self, ctx: &mut RunContext<'_>, payload: &Value) -> StepOutcome<()> {
        let event = decode_event(payload)?;

        let record: MatchRecord = ctx
            .run("get-match", || async {
                self.store
                    .fetch_match(&event.match_id)
                    .await?
                    .ok_or_else(|| Error::MatchNotFound(event.match_id.clone()))
            })
            .await?;

        let slot: RaceSlot = ctx
            .run("determine-race-slot", || async {
                let race = record.race(&event.race_id).ok_or_else(|| Error::RaceNotFound {
                    match_id: event.match_id.clone(),
                    race_id: event.race_id.clone(),
                })?;
                Ok(race.slot())
            })
            .await?;

        if slot.is_decider() {
            self.set_final_match(ctx, &event.match_id, &event.racetime_url, &record)
                .await?;
        } else {
            self.progress_earlier_race(ctx, &event.match_id, &event.race_id, &event.racetime_url, &record)
                .await?;
        }

        Ok(())
    }
}

impl<S, G> RaceStartWorkflow<S, G>
where
    S: TournamentStore,
    G: RaceRoomGateway,
{
    async fn progress_earlier_race(
        &self,
        ctx: &mut RunContext<'_>,
        match_id: &str,
        race_id: &str,
        racetime_url: &str,
        record: &MatchRecord,
    ) -> StepOutcome<()> {
        ctx.run("progress-match", || async {
            let raw = record.metafields.try_get(meta::STATUS);
            if raw.is_none() {
                warn!(%match_id, "Match has no status metafield; leaving it untouched");
            }

            let status = raw.and_then(MatchState::from_slug);
            if let Some(next) = progression::advance_on_race_start(status) {
                info!(%match_id, status = %next, "Advancing match status");
                self.store
                    .put_metafield(
                        MetaModel::Match,
                        match_id,
                        meta::STATUS,
                        next.slug(),
                        WriteMode::Update,
                    )
                    .await?;
            }
            Ok(())
        })
        .await?;

        let reminder_at: Option<OffsetDateTime> = ctx
            .run("await-scheduled-time", || async {
                Ok(record.race(race_id).and_then(progression::reminder_time))
            })
            .await?;

        if let Some(wake_at) = reminder_at {
            ctx.run("send-initial-message", || async {
                self.gateway
                    .send_message(racetime_url, ADVANCE_NOTICE_MESSAGE)
                    .await
            })
            .await?;

            ctx.sleep_until("wait-until-10m-prior", wake_at).await?;
        }

        ctx.run("send-msg", || async {
            let message = setup_message(&self.config.match_page_url(match_id));
            self.gateway.send_message(racetime_url, &message).await
        })
        .await?;

        Ok(())
    }

    async fn set_final_match(
        &self,
        ctx: &mut RunContext<'_>,
        match_id: &str,
        racetime_url: &str,
        record: &MatchRecord,
    ) -> StepOutcome<()> {
        let _assigned: String = ctx
            .run("set-final-match", || async {
                let candidates = progression::final_mode_candidates(record)?;
                let mode = {
                    let mut rng = rand::thread_rng();
                    candidates.choose(&mut rng).copied()
                }
                .ok_or_else(|| Error::NoModeRemaining(match_id.to_owned()))?;

                info!(%match_id, mode = mode.slug, "Assigning decider race mode");
                self.store
                    .put_metafield(
                        MetaModel::Match,
                        match_id,
                        meta::GAME_3_MODE,
                        mode.slug,
                        WriteMode::Create,
                    )
                    .await?;

                self.gateway
                    .send_message(racetime_url, &final_mode_message(mode.name))
                    .await?;

                self.store
                    .put_metafield(
                        MetaModel::Match,
                        match_id,
                        meta::STATUS,
                        MatchState::PlayingRace3.slug(),
                        WriteMode::Update,
                    )
                    .await?;

                Ok(mode.slug.to_owned())
            })
            .await?;

        Ok(())
    }
}
