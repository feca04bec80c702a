//! Minecraft server status via the mcsrvstat.us API.
//!
//! `GET {api_url}/3/{server}` returns a JSON document whose
//! `players.list[].name` entries are the online players. An offline server
//! or one that hides its player list answers 200 without `players.list`;
//! that is a genuine empty snapshot. Anything else that goes wrong is a
//! [`FetchError`] and the engine skips the tick.

use joinwatch_core::config::StatusConfig;
use joinwatch_core::source::{FetchError, StatusSource};
use joinwatch_types::{Identity, PresenceSnapshot};
use serde::Deserialize;

use crate::error::BotError;

/// Status API response, reduced to the fields we read.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    players: Option<Players>,
}

#[derive(Debug, Deserialize)]
struct Players {
    #[serde(default)]
    list: Vec<Player>,
}

#[derive(Debug, Deserialize)]
struct Player {
    name: String,
}

impl StatusResponse {
    fn into_snapshot(self) -> PresenceSnapshot {
        self.players
            .map(|players| players.list)
            .unwrap_or_default()
            .into_iter()
            .map(|player| Identity::new(player.name))
            .collect()
    }
}

/// Polls mcsrvstat.us for one server.
pub struct McSrvStatSource {
    client: reqwest::Client,
    url: String,
}

impl McSrvStatSource {
    /// Build a source for `config.server`.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &StatusConfig) -> Result<Self, BotError> {
        // mcsrvstat.us rejects requests without a user agent.
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("joinwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BotError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url: format!(
                "{}/3/{}",
                config.api_url.trim_end_matches('/'),
                config.server
            ),
        })
    }
}

impl StatusSource for McSrvStatSource {
    async fn fetch_presence(&self) -> Result<PresenceSnapshot, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(body.into_snapshot())
    }

    fn name(&self) -> &str {
        "mcsrvstat"
    }
}
