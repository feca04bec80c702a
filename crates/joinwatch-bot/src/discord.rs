//! Discord REST notification sink.
//!
//! Talks to the Discord HTTP API with a bot token:
//!
//! - readiness: `GET /users/@me` must succeed with the token,
//! - destination: `GET /channels/{id}` must resolve the announce channel,
//! - delivery: `POST /channels/{id}/messages` with `{"content": ...}`.
//!
//! Delivery is one request per join event; a failure affects only that
//! event. Every request is bounded by `chat.request_timeout_ms`.
//!
//! The account reported by `/users/@me` is recorded in a [`SelfAuthor`] so
//! the command bridge never answers the bot's own messages.

use joinwatch_core::commands::SelfAuthor;
use joinwatch_core::config::ChatConfig;
use joinwatch_core::sink::{NotificationSink, NotifyError};
use joinwatch_types::JoinEvent;
use serde::Deserialize;
use tracing::{debug, info};

use crate::announce::Announcer;
use crate::error::BotError;

/// A resolved announcement channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordChannel {
    /// Channel snowflake.
    pub id: String,
    /// Channel name, when Discord reports one.
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

/// Announces joins in a Discord channel.
pub struct DiscordSink {
    client: reqwest::Client,
    api_url: String,
    token: String,
    channel_id: String,
    announcer: Announcer,
    self_author: SelfAuthor,
}

impl DiscordSink {
    /// Build a sink from chat configuration. The logged-in account is
    /// recorded into `self_author` once [`NotificationSink::ready`] succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Template`] if the announce template is invalid,
    /// or [`BotError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &ChatConfig, self_author: SelfAuthor) -> Result<Self, BotError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!(
                "DiscordBot (joinwatch, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .map_err(|e| BotError::Client(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            token: config.token.clone(),
            channel_id: config.announce_channel_id.clone(),
            announcer: Announcer::new(&config.announce_template)?,
            self_author,
        })
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token)
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, String> {
        let response = self
            .client
            .get(format!("{}{path}", self.api_url))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(format!("Discord returned {status}"))
        }
    }
}

impl NotificationSink for DiscordSink {
    type Destination = DiscordChannel;

    async fn ready(&self) -> Result<(), NotifyError> {
        let user: CurrentUser = self
            .get("/users/@me")
            .await
            .map_err(NotifyError::NotReady)?
            .json()
            .await
            .map_err(|e| NotifyError::NotReady(format!("unexpected /users/@me body: {e}")))?;

        info!(bot = %user.username, bot_id = %user.id, "logged in to Discord");
        self.self_author.record([user.id, user.username]);
        Ok(())
    }

    async fn resolve_destination(&self) -> Result<DiscordChannel, NotifyError> {
        let unresolved = |reason: String| NotifyError::Unresolved {
            destination: self.channel_id.clone(),
            reason,
        };

        let channel: ChannelInfo = self
            .get(&format!("/channels/{}", self.channel_id))
            .await
            .map_err(unresolved)?
            .json()
            .await
            .map_err(|e| unresolved(format!("unexpected channel body: {e}")))?;

        info!(
            channel_id = %channel.id,
            channel = channel.name.as_deref().unwrap_or("?"),
            "announce channel resolved"
        );
        Ok(DiscordChannel {
            id: channel.id,
            name: channel.name,
        })
    }

    async fn deliver(
        &self,
        destination: &DiscordChannel,
        event: &JoinEvent,
    ) -> Result<(), NotifyError> {
        let content = self.announcer.render(event)?;

        let response = self
            .client
            .post(format!(
                "{}/channels/{}/messages",
                self.api_url, destination.id
            ))
            .header("Authorization", self.authorization())
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unable to read error body"));
            return Err(NotifyError::Delivery(format!(
                "Discord returned {status}: {body}"
            )));
        }
        debug!(
            channel = destination.name.as_deref().unwrap_or(&destination.id),
            identity = %event.identity,
            "announcement posted"
        );
        Ok(())
    }
}
