//! Chat commands.
//!
//! Commands arrive as plain message text from the chat transport and are
//! answered with plain text. Anything not starting with `$` is ignored.
//!
//! | Command | Effect |
//! |---------|--------|
//! | `$players` | List who is present (silent identities omitted) |
//! | `$silent [name]` | Stop announcing `name` (default: the author) |
//! | `$unsilent [name]` | Resume announcing `name` (default: the author) |
//! | `$help` | Usage |
//!
//! Preference failures never escape as errors: every outcome becomes a
//! reply the user can read. Messages posted by the notifier's own chat
//! account are never answered.

use std::sync::{Arc, OnceLock};

use joinwatch_types::Identity;
use tracing::{debug, warn};

use crate::preferences::{PreferenceError, PreferenceStore};
use crate::presence::PresenceView;

/// Prefix marking a message as a command.
pub const COMMAND_PREFIX: char = '$';

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Report current visible presence.
    Players,
    /// Opt out of join announcements.
    Silent {
        /// Who to silence; the author when absent.
        target: Option<Identity>,
    },
    /// Opt back in to join announcements.
    Unsilent {
        /// Who to unsilence; the author when absent.
        target: Option<Identity>,
    },
    /// Show usage.
    Help,
    /// A `$` command this bot does not know.
    Unknown(String),
}

impl Command {
    /// Parse message text. Returns `None` for ordinary chat.
    pub fn parse(content: &str) -> Option<Self> {
        let rest = content.trim().strip_prefix(COMMAND_PREFIX)?;
        let mut parts = rest.splitn(2, char::is_whitespace);
        let verb = parts.next().unwrap_or_default();
        let target = parts
            .next()
            .map(str::trim)
            .filter(|arg| !arg.is_empty())
            .map(Identity::from);

        let command = match verb.to_ascii_lowercase().as_str() {
            "players" => Self::Players,
            "silent" => Self::Silent { target },
            "unsilent" => Self::Unsilent { target },
            "help" => Self::Help,
            _ => Self::Unknown(verb.to_owned()),
        };
        Some(command)
    }
}

/// The chat account the notifier itself posts as.
///
/// Shared between the notification sink, which learns the account when it
/// logs in, and the command handler, which must not answer it. Until the
/// account is recorded no author is treated as the notifier.
#[derive(Debug, Clone, Default)]
pub struct SelfAuthor {
    names: Arc<OnceLock<Vec<String>>>,
}

impl SelfAuthor {
    /// An unrecorded account.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every name the account is known by (id, username). Only the
    /// first call takes effect.
    pub fn record<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if self.names.set(names).is_err() {
            debug!("chat account already recorded");
        }
    }

    /// Whether `author` is the notifier's own account.
    pub fn is(&self, author: &str) -> bool {
        self.names
            .get()
            .is_some_and(|names| names.iter().any(|name| name == author))
    }
}

/// Executes commands against the presence view and preference cache.
pub struct CommandHandler<P> {
    presence: PresenceView<P>,
    self_author: SelfAuthor,
}

impl<P> Clone for CommandHandler<P> {
    fn clone(&self) -> Self {
        Self {
            presence: self.presence.clone(),
            self_author: self.self_author.clone(),
        }
    }
}

impl<P: PreferenceStore> CommandHandler<P> {
    /// Create a handler reading from `presence`.
    pub fn new(presence: PresenceView<P>) -> Self {
        Self {
            presence,
            self_author: SelfAuthor::new(),
        }
    }

    /// Ignore messages from `self_author`.
    #[must_use]
    pub fn with_self_author(mut self, self_author: SelfAuthor) -> Self {
        self.self_author = self_author;
        self
    }

    /// The presence view commands are answered from.
    pub const fn presence(&self) -> &PresenceView<P> {
        &self.presence
    }

    /// Parse and execute `content` sent by `author`.
    ///
    /// Returns the reply to post, or `None` if the message is not a command
    /// or was posted by the notifier itself.
    pub async fn handle(&self, author: &str, content: &str) -> Option<String> {
        if self.self_author.is(author) {
            return None;
        }
        let command = Command::parse(content)?;
        debug!(author, ?command, "command received");
        Some(self.execute(&Identity::from(author), command).await)
    }

    /// Execute an already-parsed command on behalf of `author`.
    pub async fn execute(&self, author: &Identity, command: Command) -> String {
        match command {
            Command::Players => self.players(),
            Command::Silent { target } => {
                self.set_silent(target.unwrap_or_else(|| author.clone()), true)
                    .await
            }
            Command::Unsilent { target } => {
                self.set_silent(target.unwrap_or_else(|| author.clone()), false)
                    .await
            }
            Command::Help => help_text(),
            Command::Unknown(verb) => {
                format!("❓ Unknown command `{COMMAND_PREFIX}{verb}`. Try `{COMMAND_PREFIX}help`.")
            }
        }
    }

    fn players(&self) -> String {
        let visible = self.presence.current_visible_presence();
        if visible.observed_at.is_none() {
            return String::from("❌ Error fetching server status.");
        }
        if visible.identities.is_empty() {
            return String::from("😢 No players online.");
        }
        let names: Vec<&str> = visible.identities.iter().map(Identity::as_str).collect();
        format!("Online players on MC server are: {}", names.join(", "))
    }

    async fn set_silent(&self, identity: Identity, silent: bool) -> String {
        match self.presence.preferences().set_silent(&identity, silent).await {
            Ok(_) if silent => {
                format!("🔕 **{identity}** will no longer be announced.")
            }
            Ok(_) => format!("🔔 **{identity}** will be announced again."),
            Err(PreferenceError::NotRegistered { .. }) => format!(
                "⚠️ **{identity}** is not registered. Ask an admin to register you first."
            ),
            Err(e @ PreferenceError::Persist { .. }) => {
                warn!(identity = %identity, error = %e, "preference command failed");
                String::from("❌ Could not save your preference, please try again later.")
            }
        }
    }
}

fn help_text() -> String {
    format!(
        "Commands:\n\
         `{p}players` -- who is online\n\
         `{p}silent [name]` -- stop announcing when you (or `name`) join\n\
         `{p}unsilent [name]` -- announce again",
        p = COMMAND_PREFIX
    )
}
