//! Status source trait.
//!
//! The engine asks a [`StatusSource`] for the set of identities currently
//! present. The source is an external, unreliable service: every failure
//! (transport error, non-success status, undecodable body) is reported as a
//! [`FetchError`] and treated by the engine as a *soft failure*. A soft
//! failure carries no snapshot at all, so it can never be mistaken for
//! "nobody is present".
//!
//! Like the chat sink and the preference store, the trait returns
//! `impl Future + Send` so the engine stays generic over its collaborators
//! and can still be moved onto its own Tokio task.

use std::future::Future;

use joinwatch_types::PresenceSnapshot;

/// A transient failure to obtain a presence snapshot.
///
/// None of these are fatal; the next scheduled tick is the retry.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request could not be sent or timed out.
    #[error("status request failed: {0}")]
    Transport(String),

    /// The status service answered with something other than 200.
    #[error("status service returned HTTP {status}")]
    Status {
        /// The HTTP status code received.
        status: u16,
    },

    /// The response body was not the expected JSON shape.
    #[error("status response could not be decoded: {0}")]
    Decode(String),
}

/// A source of presence snapshots.
pub trait StatusSource: Send + Sync {
    /// Fetch the identities currently present.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on any failure. Callers must not interpret an
    /// error as an empty snapshot.
    fn fetch_presence(&self) -> impl Future<Output = Result<PresenceSnapshot, FetchError>> + Send;

    /// Short name of the source for logging.
    fn name(&self) -> &str;
}
