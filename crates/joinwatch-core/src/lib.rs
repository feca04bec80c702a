//! Presence reconciliation core for joinwatch.
//!
//! This crate owns the poll-diff-filter-notify cycle: it polls a
//! [`StatusSource`] for who is present, diffs against the last accepted
//! snapshot, drops identities that opted out via the [`PreferenceCache`],
//! and hands one join event per new arrival to a [`NotificationSink`].
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `joinwatch.yaml` and the
//!   environment into strongly-typed structs.
//! - [`source`] -- [`StatusSource`] trait and fetch errors.
//! - [`sink`] -- [`NotificationSink`] trait and delivery errors.
//! - [`preferences`] -- [`PreferenceStore`] trait, [`PreferenceCache`], and
//!   an in-memory store.
//! - [`engine`] -- [`ReconciliationEngine`], one tick at a time.
//! - [`runner`] -- The fixed-interval loop and cooperative [`Shutdown`].
//! - [`presence`] -- Read-only publication of the last snapshot.
//! - [`commands`] -- Chat command parsing and execution.
//!
//! [`StatusSource`]: source::StatusSource
//! [`NotificationSink`]: sink::NotificationSink
//! [`PreferenceStore`]: preferences::PreferenceStore
//! [`PreferenceCache`]: preferences::PreferenceCache
//! [`ReconciliationEngine`]: engine::ReconciliationEngine
//! [`Shutdown`]: runner::Shutdown

pub mod commands;
pub mod config;
pub mod engine;
pub mod preferences;
pub mod presence;
pub mod runner;
pub mod sink;
pub mod source;
