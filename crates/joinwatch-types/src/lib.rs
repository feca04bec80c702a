//! Shared type definitions for the joinwatch presence notifier.
//!
//! This crate is the single source of truth for the value types that flow
//! between the status source, the reconciliation engine, the preference
//! store, and the chat transport.
//!
//! # Modules
//!
//! - [`ids`] -- [`Identity`] and [`JoinEventId`] wrappers
//! - [`presence`] -- [`PresenceSnapshot`], the set of identities present at one poll
//! - [`structs`] -- [`Preference`] records and ephemeral [`JoinEvent`]s

pub mod ids;
pub mod presence;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use ids::{Identity, JoinEventId};
pub use presence::PresenceSnapshot;
pub use structs::{JoinEvent, Preference};
