//! Durable workflow definitions for match progression.
//!
//! Two workflows are registered with the runtime, keyed by trigger kind:
//!
//! - [`RACE_SCHEDULED`] → [`RaceScheduledWorkflow`]: one-time match setup
//!   when a race is first put on the calendar.
//! - [`RACE_INITIATE`] → [`RaceStartWorkflow`]: match progression when a
//!   race room goes live, including the timed pick/veto reminder.

mod race_scheduled;
mod race_started;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runner::{Interrupt, StepOutcome};

pub use race_scheduled::RaceScheduledWorkflow;
pub use race_started::RaceStartWorkflow;

/// Trigger kind for race scheduling events.
pub const RACE_SCHEDULED: &str = "race.scheduled";
/// Trigger kind for race room start events.
pub const RACE_INITIATE: &str = "race.initiate";

/// Payload carried by both race trigger events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceEvent {
    pub match_id: String,
    pub race_id: String,
    /// URL of the live race room, used to address chat messages.
    pub racetime_url: String,
}

impl RaceEvent {
    pub fn new(
        match_id: impl Into<String>,
        race_id: impl Into<String>,
        racetime_url: impl Into<String>,
    ) -> Self {
        Self {
            match_id: match_id.into(),
            race_id: race_id.into(),
            racetime_url: racetime_url.into(),
        }
    }

    /// Correlation key deduplicating runs: one run per race per kind.
    pub fn correlation_key(&self) -> String {
        format!("{}:{}", self.match_id, self.race_id)
    }
}

/// A trigger event addressed to one of the registered workflows.
#[derive(Debug, Clone)]
pub enum TriggerEvent {
    Scheduled(RaceEvent),
    Initiate(RaceEvent),
}

impl TriggerEvent {
    /// The workflow kind this event triggers.
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerEvent::Scheduled(_) => RACE_SCHEDULED,
            TriggerEvent::Initiate(_) => RACE_INITIATE,
        }
    }

    /// The event payload.
    pub fn data(&self) -> &RaceEvent {
        match self {
            TriggerEvent::Scheduled(event) | TriggerEvent::Initiate(event) => event,
        }
    }
}

/// Decode a run payload back into a [`RaceEvent`].
///
/// A payload that fails to decode is a permanent failure: the stored run can
/// never become executable by retrying.
fn decode_event(payload: &Value) -> StepOutcome<RaceEvent> {
    serde_json::from_value(payload.clone())
        .map_err(|e| Interrupt::Abort(crate::Error::Serialization(e)))
}

/// Sent when the race room opens well before the scheduled start.
pub const ADVANCE_NOTICE_MESSAGE: &str = "The options for this race will be sent to this room 10 minutes prior to the scheduled time.";

/// Reminder pointing players at the match setup page.
pub fn setup_message(match_url: &str) -> String {
    format!("Please visit {match_url} to setup the options for this race")
}

/// Announcement of the automatically assigned decider mode.
pub fn final_mode_message(mode_name: &str) -> String {
    format!("This race will be set to {mode_name} shortly.")
}
