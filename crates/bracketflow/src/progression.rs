//! Pure match progression decisions.
//!
//! Every function here is deterministic and side-effect free: it maps a
//! [`MatchRecord`] snapshot to the actions a workflow should take. The
//! workflows own the side effects (metafield writes, race room messages,
//! suspension); this module owns the rules.
//!
//! The `status` metafield only moves forward through the
//! [`MatchState`](crate::catalog::MatchState) sequence — nothing here ever
//! proposes a regression.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::catalog::{self, MatchState, RaceMode};
use crate::error::{Error, Result};
use crate::record::{meta, MatchRecord, RaceRecord, RacerRecord};

/// How far ahead of the scheduled start the pick/veto reminder fires.
pub const REMINDER_LEAD: time::Duration = time::Duration::minutes(10);

/// A metafield write planned in response to a `race.scheduled` trigger.
///
/// Both actions create a metafield that is absent; a snapshot where the
/// field already exists plans nothing, which is what makes the setup
/// workflow idempotent under redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupAction {
    /// Initialize the `status` metafield.
    SetStatus(MatchState),
    /// Record the higher-seeded racer's id under `higher_seed`.
    SetHigherSeed(String),
}

/// Plan the metafield writes for a newly scheduled race.
///
/// The two checks are independent and order-insensitive:
/// - absent `status` → initialize to `AWAITING_PLAYER_ASSIGNMENT`
/// - absent `higher_seed` → record the racer with the smallest seed
pub fn setup_actions(record: &MatchRecord) -> Vec<SetupAction> {
    let mut actions = Vec::new();

    if !record.metafields.contains_key(meta::STATUS) {
        actions.push(SetupAction::SetStatus(MatchState::AwaitingPlayerAssignment));
    }

    if !record.metafields.contains_key(meta::HIGHER_SEED) {
        if let Some(racer) = higher_seed(&record.racers) {
            actions.push(SetupAction::SetHigherSeed(racer.id.clone()));
        }
    }

    actions
}

/// The racer with the numerically smallest `initial_seed`.
///
/// Ties keep the first minimal racer in input order. Seeds that fail to
/// parse as integers sort last, so one malformed seed still yields a
/// deterministic answer.
pub fn higher_seed(racers: &[RacerRecord]) -> Option<&RacerRecord> {
    racers.iter().min_by_key(|racer| seed_rank(racer))
}

fn seed_rank(racer: &RacerRecord) -> i64 {
    racer.initial_seed.trim().parse().unwrap_or(i64::MAX)
}

/// Status transition when an earlier (non-decider) race starts.
///
/// Only `PLAYING_RACE_1` advances (to `PLAYER_1_PICK`, opening the pick
/// phase for race 2). Any other status — including an absent one — is left
/// unchanged: either the match already progressed past this point or it has
/// not reached it yet.
pub fn advance_on_race_start(status: Option<MatchState>) -> Option<MatchState> {
    match status {
        Some(MatchState::PlayingRace1) => Some(MatchState::Player1Pick),
        _ => None,
    }
}

/// When to remind the room that pick/veto options are coming.
///
/// Returns `None` — no reminder, no suspension — when the race is scheduled
/// on the previous race's finish, has no scheduled time, or its timestamp
/// does not parse. An unparseable time is recovered locally rather than
/// treated as an error.
pub fn reminder_time(race: &RaceRecord) -> Option<OffsetDateTime> {
    if race.schedule_on_finish {
        return None;
    }
    let raw = race.scheduled_at.as_deref()?;
    let scheduled = OffsetDateTime::parse(raw, &Rfc3339).ok()?;
    Some(scheduled - REMINDER_LEAD)
}

/// Modes still available for the decider race, in catalog order.
///
/// Excludes every mode consumed by the four pick/veto metafields. An empty
/// result is a data inconsistency (4 of 5 modes should be consumed) and
/// fails permanently rather than letting a random pick panic downstream.
pub fn final_mode_candidates(record: &MatchRecord) -> Result<Vec<&'static RaceMode>> {
    let selected: Vec<&str> = meta::SELECTED_MODE_KEYS
        .iter()
        .filter_map(|key| record.metafields.try_get(key))
        .collect();

    candidates_from_selected(&record.id, &selected)
}

fn candidates_from_selected(match_id: &str, selected: &[&str]) -> Result<Vec<&'static RaceMode>> {
    let remaining = catalog::excluding(selected);
    if remaining.is_empty() {
        return Err(Error::NoModeRemaining(match_id.to_owned()));
    }
    Ok(remaining)
}
