//! Process configuration for the tournament coordinator.

use std::env;

/// Tournament identity and endpoint configuration.
///
/// Defaults target the production tournament; every field can be overridden
/// through the environment (`TOURNAMENT_SLUG`, `INERTIA_API_URL`,
/// `MATCH_PAGE_URL`).
#[derive(Debug, Clone)]
pub struct TournamentConfig {
    /// Tournament slug used in store API paths.
    pub tournament_slug: String,
    /// Base URL of the Inertia API.
    pub api_base_url: String,
    /// Base URL of the player-facing match setup pages.
    pub match_page_base_url: String,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            tournament_slug: "sm-maprando-2025".into(),
            api_base_url: "https://inertia.run".into(),
            match_page_base_url: "https://sm-maprando-2025.inertia.run".into(),
        }
    }
}

impl TournamentConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tournament_slug: env::var("TOURNAMENT_SLUG").unwrap_or(defaults.tournament_slug),
            api_base_url: env::var("INERTIA_API_URL").unwrap_or(defaults.api_base_url),
            match_page_base_url: env::var("MATCH_PAGE_URL")
                .unwrap_or(defaults.match_page_base_url),
        }
    }

    /// Player-facing setup page for a match.
    pub fn match_page_url(&self, match_id: &str) -> String {
        format!(
            "{}/match/{}",
            self.match_page_base_url.trim_end_matches('/'),
            match_id
        )
    }
}
