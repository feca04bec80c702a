//! Notification sink trait.
//!
//! A [`NotificationSink`] is the chat transport side of the engine. Before
//! the reconciliation loop starts, the engine waits for the transport to
//! report ready and resolves the announcement destination exactly once. Each
//! [`JoinEvent`] is then delivered individually; a failed delivery affects
//! only that event.

use std::future::Future;

use joinwatch_types::JoinEvent;

/// Errors raised by a notification sink.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The transport is not usable (bad credentials, unreachable).
    #[error("transport not ready: {0}")]
    NotReady(String),

    /// The configured destination does not exist or is not accessible.
    #[error("destination {destination} could not be resolved: {reason}")]
    Unresolved {
        /// The configured destination identifier.
        destination: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A single message could not be delivered.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The message text could not be rendered.
    #[error("render failed: {0}")]
    Render(String),
}

/// The chat transport that renders join events for humans.
pub trait NotificationSink: Send + Sync {
    /// A resolved, ready-to-use destination (e.g. a chat channel handle).
    type Destination: Send + Sync;

    /// Wait until the transport is usable.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::NotReady`] if the transport cannot be used.
    fn ready(&self) -> impl Future<Output = Result<(), NotifyError>> + Send;

    /// Resolve the configured announcement destination.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Unresolved`] if the destination does not exist.
    fn resolve_destination(
        &self,
    ) -> impl Future<Output = Result<Self::Destination, NotifyError>> + Send;

    /// Deliver one join event to the destination.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if this single delivery failed.
    fn deliver(
        &self,
        destination: &Self::Destination,
        event: &JoinEvent,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}
