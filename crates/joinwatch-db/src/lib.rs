//! Data layer (`PostgreSQL`) for the joinwatch presence notifier.
//!
//! `PostgreSQL` holds the durable copy of every per-identity preference. The
//! notifier loads all of them into its in-memory cache at startup and writes
//! through on every opt-in or opt-out command.
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool, configuration, and migrations
//! - [`preference_store`] -- The `preferences` table behind the
//!   [`PreferenceStore`](joinwatch_core::preferences::PreferenceStore) trait
//! - [`error`] -- Shared error types

pub mod error;
pub mod postgres;
pub mod preference_store;

// Re-export primary types for convenience.
pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresPool};
pub use preference_store::{PgPreferenceStore, PreferenceRow};
