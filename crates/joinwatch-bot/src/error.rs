//! Error types for the notifier binary.

/// Top-level error for the notifier binary.
///
/// Each variant wraps a subsystem error so `run` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Configuration could not be loaded or is incomplete.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: joinwatch_core::config::ConfigError,
    },

    /// The preference database could not be reached or migrated.
    #[error("database error: {source}")]
    Db {
        /// The underlying database error.
        #[from]
        source: joinwatch_db::DbError,
    },

    /// An HTTP listener failed to bind.
    #[error("listener error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: joinwatch_http::server::ServerError,
    },

    /// The reconciliation engine refused to start.
    #[error("engine start error: {source}")]
    Start {
        /// The underlying start error.
        #[from]
        source: joinwatch_core::engine::StartError,
    },

    /// An HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),

    /// The announcement template does not compile.
    #[error("template error: {0}")]
    Template(String),
}
