//! Read-only publication of the last reconciled snapshot.
//!
//! The engine's previous snapshot is owned by the reconciliation task and
//! never shared. After each successful tick the engine publishes a copy
//! through a [`tokio::sync::watch`] channel; the command surface reads that
//! copy through a [`PresenceView`] and filters it through the preference
//! cache at read time, so a preference change is reflected immediately.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use joinwatch_types::{Identity, PresenceSnapshot};
use tokio::sync::watch;

use crate::preferences::{PreferenceCache, PreferenceStore};

/// The last snapshot the engine accepted, with its capture time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedPresence {
    /// Who was present.
    pub snapshot: PresenceSnapshot,
    /// When the snapshot was captured; `None` until the first successful tick.
    pub observed_at: Option<DateTime<Utc>>,
}

/// Visible presence as reported to users.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VisiblePresence {
    /// Present identities that are not silent, sorted.
    pub identities: Vec<Identity>,
    /// When the underlying snapshot was captured; `None` if presence has
    /// never been fetched successfully.
    pub observed_at: Option<DateTime<Utc>>,
}

/// Write half, owned by the reconciliation engine.
#[derive(Debug)]
pub struct PresencePublisher {
    tx: watch::Sender<ObservedPresence>,
}

impl PresencePublisher {
    /// Replace the published snapshot.
    pub fn publish(&self, snapshot: &PresenceSnapshot, observed_at: DateTime<Utc>) {
        self.tx.send_replace(ObservedPresence {
            snapshot: snapshot.clone(),
            observed_at: Some(observed_at),
        });
    }
}

/// Read half, cloned into every command surface.
pub struct PresenceView<P> {
    rx: watch::Receiver<ObservedPresence>,
    preferences: Arc<PreferenceCache<P>>,
}

impl<P> Clone for PresenceView<P> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            preferences: Arc::clone(&self.preferences),
        }
    }
}

impl<P: PreferenceStore> PresenceView<P> {
    /// The last published snapshot minus silent identities.
    pub fn current_visible_presence(&self) -> VisiblePresence {
        let observed = self.rx.borrow().clone();
        VisiblePresence {
            identities: self.preferences.visible(&observed.snapshot),
            observed_at: observed.observed_at,
        }
    }

    /// The preference cache the view filters through.
    pub const fn preferences(&self) -> &Arc<PreferenceCache<P>> {
        &self.preferences
    }
}

/// Create a linked publisher/view pair starting from the empty snapshot.
pub fn presence_channel<P>(
    preferences: Arc<PreferenceCache<P>>,
) -> (PresencePublisher, PresenceView<P>) {
    let (tx, rx) = watch::channel(ObservedPresence::default());
    (PresencePublisher { tx }, PresenceView { rx, preferences })
}
