//! Static tournament configuration: race modes and match states.
//!
//! Both tables are fixed at compile time and loaded nowhere else — the
//! tournament format defines exactly five playable modes and a nine-state
//! linear match progression. Slugs are the wire representation stored in
//! metafields; display names are what players see in race room messages.

/// A named ruleset variant a race can be played under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceMode {
    /// Stable identifier stored in metafields.
    pub slug: &'static str,
    /// Human-readable name used in announcements.
    pub name: &'static str,
}

/// The complete mode catalog, in pick/veto presentation order.
pub const RACE_MODES: [RaceMode; 5] = [
    RaceMode {
        slug: "no-objectives",
        name: "No Objectives",
    },
    RaceMode {
        slug: "mo-nm2",
        name: "Metroids Objectives, No Motherbrain 2",
    },
    RaceMode {
        slug: "double-suit",
        name: "Double Suit",
    },
    RaceMode {
        slug: "gravity",
        name: "Gravity 9+1",
    },
    RaceMode {
        slug: "vhsig",
        name: "Varia, HiJump, Spring, Ice, Grapple",
    },
];

/// All catalog modes in presentation order.
pub fn all() -> &'static [RaceMode] {
    &RACE_MODES
}

/// Catalog modes whose slug is not in `selected`, preserving catalog order.
pub fn excluding(selected: &[&str]) -> Vec<&'static RaceMode> {
    RACE_MODES
        .iter()
        .filter(|mode| !selected.contains(&mode.slug))
        .collect()
}

/// Current position of a match in its lifecycle.
///
/// States form a linear progression; the `status` metafield only ever moves
/// forward through this sequence. The pick/veto sub-sequence runs before each
/// of the first two races; the third race's mode is assigned automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchState {
    AwaitingSeed,
    AwaitingPlayerAssignment,
    Player1Veto,
    Player2Veto,
    Player2Pick,
    PlayingRace1,
    Player1Pick,
    PlayingRace2,
    PlayingRace3,
}

impl MatchState {
    /// Every state in progression order.
    pub const ALL: [MatchState; 9] = [
        MatchState::AwaitingSeed,
        MatchState::AwaitingPlayerAssignment,
        MatchState::Player1Veto,
        MatchState::Player2Veto,
        MatchState::Player2Pick,
        MatchState::PlayingRace1,
        MatchState::Player1Pick,
        MatchState::PlayingRace2,
        MatchState::PlayingRace3,
    ];

    /// The slug stored in the `status` metafield.
    pub fn slug(&self) -> &'static str {
        match self {
            MatchState::AwaitingSeed => "AWAITING_SEED",
            MatchState::AwaitingPlayerAssignment => "AWAITING_PLAYER_ASSIGNMENT",
            MatchState::Player1Veto => "PLAYER_1_VETO",
            MatchState::Player2Veto => "PLAYER_2_VETO",
            MatchState::Player2Pick => "PLAYER_2_PICK",
            MatchState::PlayingRace1 => "PLAYING_RACE_1",
            MatchState::Player1Pick => "PLAYER_1_PICK",
            MatchState::PlayingRace2 => "PLAYING_RACE_2",
            MatchState::PlayingRace3 => "PLAYING_RACE_3",
        }
    }

    /// Parse a metafield slug back into a state.
    pub fn from_slug(slug: &str) -> Option<MatchState> {
        MatchState::ALL.iter().copied().find(|s| s.slug() == slug)
    }
}

impl std::fmt::Display for MatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}
