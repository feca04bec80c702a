//! Presence notifier binary.
//!
//! Watches a Minecraft server through the mcsrvstat.us status API and
//! announces each newly joined player in a Discord channel, unless the
//! player opted out with `$silent`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `joinwatch.yaml` (or defaults) plus env overrides
//! 2. Initialize structured logging (tracing)
//! 3. Open the preference store and warm the cache
//! 4. Start the health listener and the command API
//! 5. Wait for Discord and resolve the announce channel
//! 6. Run the reconciliation loop until Ctrl-C
//! 7. Drain the listeners and log the run summary

mod announce;
mod discord;
mod error;
mod status;
mod store;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use joinwatch_core::commands::{CommandHandler, SelfAuthor};
use joinwatch_core::config::WatchConfig;
use joinwatch_core::engine::ReconciliationEngine;
use joinwatch_core::preferences::{MemoryPreferenceStore, PreferenceCache};
use joinwatch_core::presence::presence_channel;
use joinwatch_core::runner::{Shutdown, run_reconciliation};
use joinwatch_db::PostgresPool;
use joinwatch_http::router::{build_api_router, build_health_router};
use joinwatch_http::server::{ListenerConfig, spawn_listener};
use joinwatch_http::state::AppState;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::discord::DiscordSink;
use crate::error::BotError;
use crate::status::McSrvStatSource;
use crate::store::Store;

const CONFIG_PATH: &str = "joinwatch.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    let config = load_config();

    let level = config
        .as_ref()
        .map_or("info", |config| config.logging.level.as_str());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(true)
        .init();

    let result = match config {
        Ok(config) => run(config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "joinwatch-bot stopped");
            ExitCode::FAILURE
        }
    }
}

/// Load `joinwatch.yaml` if present, otherwise defaults, then validate.
fn load_config() -> Result<WatchConfig, BotError> {
    let path = Path::new(CONFIG_PATH);
    let config = if path.exists() {
        WatchConfig::from_file(path)?
    } else {
        WatchConfig::from_env()?
    };
    config.validate()?;
    Ok(config)
}

async fn run(config: WatchConfig) -> Result<(), BotError> {
    info!(
        server = %config.status.server,
        poll_interval_secs = config.engine.poll_interval_secs,
        "joinwatch-bot starting"
    );

    // Preference store.
    let pool = match &config.infrastructure.postgres_url {
        Some(url) => {
            let pool = PostgresPool::connect_url(url).await?;
            pool.run_migrations().await?;
            Some(pool)
        }
        None => None,
    };
    let store = pool.as_ref().map_or_else(
        || {
            warn!("no database configured, preferences will not survive a restart");
            Store::Memory(MemoryPreferenceStore::new())
        },
        |pool| Store::Postgres(pool.preferences()),
    );
    info!(store = store.name(), "preference store selected");

    let preferences = Arc::new(PreferenceCache::new(store));
    preferences.load_all().await;
    let (publisher, view) = presence_channel(Arc::clone(&preferences));

    // Shutdown on Ctrl-C.
    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C");
                return;
            }
            info!("Ctrl-C received, shutting down");
            shutdown.trigger();
        });
    }

    // Listeners. The command bridge ignores the bot's own account once the
    // sink has logged in.
    let self_author = SelfAuthor::new();
    let commands = CommandHandler::new(view).with_self_author(self_author.clone());
    let host = config.infrastructure.bind_host.as_str();
    let (_, health) = spawn_listener(
        "health",
        &ListenerConfig::new(host, config.infrastructure.health_port),
        build_health_router(),
        shutdown.clone(),
    )
    .await?;
    let (_, api) = spawn_listener(
        "api",
        &ListenerConfig::new(host, config.infrastructure.api_port),
        build_api_router(Arc::new(AppState::with_commands(commands))),
        shutdown.clone(),
    )
    .await?;
    let listeners = [health, api];

    // Engine.
    let source = McSrvStatSource::new(&config.status)?;
    let sink = DiscordSink::new(&config.chat, self_author)?;
    let mut engine =
        match ReconciliationEngine::start(source, sink, preferences, publisher, &config.engine)
            .await
        {
            Ok(engine) => engine,
            Err(e) => {
                shutdown.trigger();
                drain(listeners, pool).await;
                return Err(e.into());
            }
        };

    run_reconciliation(&mut engine, config.engine.poll_interval(), &shutdown).await;

    shutdown.trigger();
    drain(listeners, pool).await;
    info!("joinwatch-bot stopped");
    Ok(())
}

/// Wait for listeners to finish and close the database pool.
async fn drain(listeners: [JoinHandle<()>; 2], pool: Option<PostgresPool>) {
    for handle in listeners {
        if let Err(e) = handle.await {
            warn!(error = %e, "listener task failed");
        }
    }
    if let Some(pool) = pool {
        pool.close().await;
    }
}
