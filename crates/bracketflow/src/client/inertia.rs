//! HTTP client for the Inertia tournament API.
//!
//! Inertia fronts both external systems this crate talks to: the tournament
//! data store (match snapshots, metafield CRUD) and the racetime message
//! relay. Request shaping is kept in pure helpers so the payloads can be
//! checked without a server.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::{MetaModel, RaceRoomGateway, TournamentStore, WriteMode};
use crate::config::TournamentConfig;
use crate::error::Result;
use crate::record::MatchRecord;

/// Metafield CRUD endpoint.
pub const METAFIELDS_PATH: &str = "/api/metafields";
/// Racetime race room message relay endpoint.
pub const RACE_MESSAGE_PATH: &str = "/api/racetime/race/msg";

/// Production [`TournamentStore`] and [`RaceRoomGateway`] over the Inertia API.
#[derive(Debug, Clone)]
pub struct InertiaClient {
    http: reqwest::Client,
    config: TournamentConfig,
}

impl InertiaClient {
    /// Create a client for the configured tournament.
    pub fn new(config: TournamentConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }
}

/// Path of the match snapshot endpoint for a tournament.
fn match_path(tournament_slug: &str, match_id: &str) -> String {
    format!("/api/tournaments/{tournament_slug}/matches/{match_id}")
}

/// JSON body for a metafield create/update.
fn metafield_payload(model: MetaModel, model_id: &str, key: &str, value: &str) -> Value {
    json!({
        "key": key,
        "value": value,
        "model": model.as_str(),
        "modelId": model_id,
    })
}

/// JSON body for a race room message.
fn message_payload(room_url: &str, text: &str) -> Value {
    json!({
        "msg": text,
        "roomUrl": room_url,
    })
}

#[async_trait]
impl TournamentStore for InertiaClient {
    async fn fetch_match(&self, match_id: &str) -> Result<Option<MatchRecord>> {
        let path = match_path(&self.config.tournament_slug, match_id);
        let response = self.http.get(self.url(&path)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        // The API also signals a missing match with a JSON null body.
        let record = response.error_for_status()?.json::<Option<MatchRecord>>().await?;
        Ok(record)
    }

    async fn put_metafield(
        &self,
        model: MetaModel,
        model_id: &str,
        key: &str,
        value: &str,
        mode: WriteMode,
    ) -> Result<()> {
        let url = self.url(METAFIELDS_PATH);
        let payload = metafield_payload(model, model_id, key, value);

        let request = match mode {
            WriteMode::Create => self.http.post(url),
            WriteMode::Update => self.http.put(url),
        };

        request.json(&payload).send().await?.error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl RaceRoomGateway for InertiaClient {
    async fn send_message(&self, room_url: &str, text: &str) -> Result<()> {
        self.http
            .post(self.url(RACE_MESSAGE_PATH))
            .json(&message_payload(room_url, text))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_path_includes_tournament_and_match() {
        assert_eq!(
            match_path("sm-maprando-2025", "m-42"),
            "/api/tournaments/sm-maprando-2025/matches/m-42"
        );
    }

    #[test]
    fn metafield_payload_shape() {
        let payload = metafield_payload(MetaModel::Match, "m-1", "status", "PLAYING_RACE_3");
        assert_eq!(
            payload,
            json!({
                "key": "status",
                "value": "PLAYING_RACE_3",
                "model": "match",
                "modelId": "m-1",
            })
        );
    }

    #[test]
    fn message_payload_shape() {
        let payload = message_payload("https://racetime.gg/smr/room", "hello");
        assert_eq!(payload["roomUrl"], "https://racetime.gg/smr/room");
        assert_eq!(payload["msg"], "hello");
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let mut config = TournamentConfig::default();
        config.api_base_url = "https://inertia.run/".into();
        let client = InertiaClient::new(config);
        assert_eq!(client.url(METAFIELDS_PATH), "https://inertia.run/api/metafields");
    }
}
