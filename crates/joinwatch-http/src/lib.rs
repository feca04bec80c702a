//! HTTP surfaces for the joinwatch presence notifier.
//!
//! Two independent Axum listeners:
//!
//! - a health listener answering `GET /health` regardless of engine state,
//! - a command API that bridges the chat transport to the core
//!   [`CommandHandler`](joinwatch_core::commands::CommandHandler) and exposes
//!   presence and preference records as JSON.
//!
//! Both shut down gracefully on the shared
//! [`Shutdown`](joinwatch_core::runner::Shutdown) signal.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
