//! Endpoint handlers.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness, always `ok` |
//! | `GET` | `/api/presence` | Visible presence |
//! | `GET` | `/api/preferences/{identity}` | One preference record |
//! | `PUT` | `/api/preferences/{identity}` | Set or clear `silent` |
//! | `POST` | `/api/registrations` | Provision an identity |
//! | `POST` | `/api/commands` | Run a chat command, return the reply |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use joinwatch_core::preferences::PreferenceStore;
use joinwatch_core::presence::VisiblePresence;
use joinwatch_types::{Identity, Preference};

use crate::error::ApiError;
use crate::state::AppState;

/// Body of `PUT /api/preferences/{identity}`.
#[derive(Debug, serde::Deserialize)]
pub struct SilentRequest {
    /// The new value of the silent flag.
    pub silent: bool,
}

/// Body of `POST /api/registrations`.
#[derive(Debug, serde::Deserialize)]
pub struct RegistrationRequest {
    /// Identity to register.
    pub identity: String,
    /// Chat-side nickname, if known.
    #[serde(default)]
    pub display_nick: Option<String>,
}

/// Body of `POST /api/commands`, as relayed by the chat transport.
#[derive(Debug, serde::Deserialize)]
pub struct CommandRequest {
    /// Author of the chat message.
    pub author: String,
    /// Raw message text.
    pub content: String,
}

/// Response of `POST /api/commands`.
#[derive(Debug, serde::Serialize)]
pub struct CommandReply {
    /// Text to post back, or `null` when the message was not a command.
    pub reply: Option<String>,
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

/// `GET /api/presence`
pub async fn get_presence<P: PreferenceStore>(
    State(state): State<Arc<AppState<P>>>,
) -> Json<VisiblePresence> {
    Json(state.presence().current_visible_presence())
}

/// `GET /api/preferences/{identity}`
pub async fn get_preference<P: PreferenceStore>(
    State(state): State<Arc<AppState<P>>>,
    Path(identity): Path<String>,
) -> Result<Json<Preference>, ApiError> {
    let identity = Identity::new(identity);
    state
        .preferences()
        .get(&identity)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("preference for {identity}")))
}

/// `PUT /api/preferences/{identity}`
pub async fn put_preference<P: PreferenceStore>(
    State(state): State<Arc<AppState<P>>>,
    Path(identity): Path<String>,
    Json(body): Json<SilentRequest>,
) -> Result<Json<Preference>, ApiError> {
    let updated = state
        .preferences()
        .set_silent(&Identity::new(identity), body.silent)
        .await?;
    Ok(Json(updated))
}

/// `POST /api/registrations`
///
/// Idempotent: registering an existing identity returns its record as-is.
pub async fn post_registration<P: PreferenceStore>(
    State(state): State<Arc<AppState<P>>>,
    Json(body): Json<RegistrationRequest>,
) -> Result<Json<Preference>, ApiError> {
    let name = body.identity.trim();
    if name.is_empty() {
        return Err(ApiError::InvalidRequest(String::from(
            "identity must not be empty",
        )));
    }
    let record = state
        .preferences()
        .register(&Identity::from(name), body.display_nick.as_deref())
        .await?;
    Ok(Json(record))
}

/// `POST /api/commands`
pub async fn post_command<P: PreferenceStore>(
    State(state): State<Arc<AppState<P>>>,
    Json(body): Json<CommandRequest>,
) -> Json<CommandReply> {
    let reply = state.commands().handle(&body.author, &body.content).await;
    Json(CommandReply { reply })
}
