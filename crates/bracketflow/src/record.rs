//! Match snapshot model as served by the tournament store.
//!
//! These types mirror the store's JSON wire shape (camelCase fields,
//! metafields as a key/value list). A [`MatchRecord`] is a point-in-time
//! snapshot: workflows read it, decide, and write back individual metafields
//! through the store client — the records themselves are owned by the
//! external store.

use serde::{Deserialize, Serialize};

/// A named string-valued attribute attached to a match or user entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metafield {
    pub key: String,
    pub value: String,
}

/// Typed mapping over an entity's metafields.
///
/// Keys are unique per entity. Lookup is by exact key with an explicit
/// optional result, replacing ad hoc list scans.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metafields(Vec<Metafield>);

impl Metafields {
    /// Build a mapping from key/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| Metafield {
                    key: key.into(),
                    value: value.into(),
                })
                .collect(),
        )
    }

    /// Look up a metafield value by key.
    pub fn try_get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|field| field.key == key)
            .map(|field| field.value.as_str())
    }

    /// Returns `true` if the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.try_get(key).is_some()
    }

    /// Insert or overwrite a metafield value.
    ///
    /// The store owns the canonical data; this exists so local snapshots can
    /// reflect writes that were just applied (and for test fixtures).
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|field| field.key == key) {
            Some(field) => field.value = value,
            None => self.0.push(Metafield { key, value }),
        }
    }
}

/// Metafield keys used by the match progression workflows.
pub mod meta {
    /// Current [`MatchState`](crate::catalog::MatchState) slug.
    pub const STATUS: &str = "status";
    /// Racer id of the higher seed (pick/veto priority).
    pub const HIGHER_SEED: &str = "higher_seed";
    /// Mode slug picked by player 1 during pick/veto.
    pub const PLAYER_1_PICK: &str = "player_1_pick";
    /// Mode slug picked by player 2 during pick/veto.
    pub const PLAYER_2_PICK: &str = "player_2_pick";
    /// Mode slug vetoed by player 1 during pick/veto.
    pub const PLAYER_1_VETO: &str = "player_1_veto";
    /// Mode slug vetoed by player 2 during pick/veto.
    pub const PLAYER_2_VETO: &str = "player_2_veto";
    /// Mode slug assigned automatically for the decider race.
    pub const GAME_3_MODE: &str = "game_3_mode";

    /// The four pick/veto keys that consume modes before the decider race.
    pub const SELECTED_MODE_KEYS: [&str; 4] =
        [PLAYER_1_PICK, PLAYER_2_PICK, PLAYER_1_VETO, PLAYER_2_VETO];
}

/// One timed attempt within a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceRecord {
    pub id: String,
    /// Position within the match's race list. See [`RaceSlot`].
    pub ordering: i64,
    /// Scheduled start time as an RFC 3339 timestamp, when known.
    #[serde(default)]
    pub scheduled_at: Option<String>,
    /// The race's time is set only once the prior race ends.
    #[serde(default)]
    pub schedule_on_finish: bool,
    /// Identifier of the live race room.
    #[serde(default)]
    pub racetime_url: Option<String>,
}

/// The `ordering` value that marks the decider race.
pub const DECIDER_ORDERING: i64 = 2;

/// Which branch of the progression a race drives.
///
/// The upstream data pins down exactly one fact about race numbering: the
/// race with `ordering == 2` is the decider, whose mode is assigned
/// automatically from the modes left over after pick/veto. Every other
/// ordering value is an earlier race preceded by a pick/veto phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceSlot {
    /// A race preceded by a pick/veto phase (races 1 and 2).
    Earlier,
    /// The final race; its mode is assigned from the unselected modes.
    Decider,
}

impl RaceSlot {
    /// Classify an `ordering` value.
    pub fn from_ordering(ordering: i64) -> RaceSlot {
        if ordering == DECIDER_ORDERING {
            RaceSlot::Decider
        } else {
            RaceSlot::Earlier
        }
    }

    /// Returns `true` for the decider race.
    pub fn is_decider(&self) -> bool {
        matches!(self, RaceSlot::Decider)
    }
}

impl RaceRecord {
    /// The progression branch this race drives.
    pub fn slot(&self) -> RaceSlot {
        RaceSlot::from_ordering(self.ordering)
    }
}

/// One of the two players in a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RacerRecord {
    pub id: String,
    /// String-encoded integer rank; lower means higher seed.
    pub initial_seed: String,
}

/// Point-in-time snapshot of a match and its races and racers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: String,
    #[serde(default)]
    pub metafields: Metafields,
    #[serde(default)]
    pub races: Vec<RaceRecord>,
    #[serde(default)]
    pub racers: Vec<RacerRecord>,
}

impl MatchRecord {
    /// Look up a race by id within this match.
    pub fn race(&self, race_id: &str) -> Option<&RaceRecord> {
        self.races.iter().find(|race| race.id == race_id)
    }
}
