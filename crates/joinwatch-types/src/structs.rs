//! Preference records and join events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{Identity, JoinEventId};

/// Per-identity announcement preference, as stored in the preference store.
///
/// Records are provisioned out-of-band with `silent = false`. The engine
/// only ever flips `silent`; `display_nick` belongs to whoever registered the
/// identity and is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    /// The participant this record belongs to.
    pub identity: Identity,
    /// When true, join notifications for this identity are suppressed.
    pub silent: bool,
    /// Chat-side nickname of the participant, if known.
    pub display_nick: Option<String>,
}

impl Preference {
    /// A freshly registered, visible preference.
    pub const fn visible(identity: Identity, display_nick: Option<String>) -> Self {
        Self {
            identity,
            silent: false,
            display_nick,
        }
    }
}

/// A newly observed presence, emitted once and handed to the notification sink.
///
/// Join events are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinEvent {
    /// Correlation ID for logging.
    pub id: JoinEventId,
    /// Who joined.
    pub identity: Identity,
    /// When the engine observed the join.
    pub observed_at: DateTime<Utc>,
}

impl JoinEvent {
    /// Create a join event stamped with the current time.
    pub fn now(identity: Identity) -> Self {
        Self {
            id: JoinEventId::new(),
            identity,
            observed_at: Utc::now(),
        }
    }
}
