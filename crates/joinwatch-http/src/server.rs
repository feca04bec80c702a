//! Listener lifecycle.
//!
//! [`spawn_listener`] binds eagerly so a port conflict fails startup rather
//! than surfacing later from a background task, then serves on its own
//! Tokio task until the shared [`Shutdown`] fires. Shutdown is graceful:
//! requests already accepted are allowed to finish.

use std::net::SocketAddr;

use axum::Router;
use joinwatch_core::runner::Shutdown;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Address a listener binds to.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Host to bind (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port; `0` picks a free one.
    pub port: u16,
}

impl ListenerConfig {
    /// Listen on `host:port`.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_owned(),
            port,
        }
    }
}

/// Errors starting or running a listener.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The address was invalid or already in use.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server hit a fatal I/O error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

/// Bind a TCP listener for `config`.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address does not parse or cannot be
/// bound.
pub async fn bind(config: &ListenerConfig) -> Result<TcpListener, ServerError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| ServerError::Bind(format!("invalid address: {e}")))?;

    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))
}

/// Serve `router` on `listener` until `shutdown` fires.
///
/// # Errors
///
/// Returns [`ServerError::Serve`] if the server fails.
pub async fn serve(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    shutdown: Shutdown,
) -> Result<(), ServerError> {
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(e.to_string()))?;
    info!(listener = name, %addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;

    info!(listener = name, "listener stopped");
    Ok(())
}

/// Bind `config` now and serve `router` on a background task.
///
/// Returns the bound address with the task handle; the task ends once
/// `shutdown` fires and in-flight requests drain.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address cannot be bound.
pub async fn spawn_listener(
    name: &'static str,
    config: &ListenerConfig,
    router: Router,
    shutdown: Shutdown,
) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
    let listener = bind(config).await?;
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(e.to_string()))?;

    let handle = tokio::spawn(async move {
        if let Err(e) = serve(name, listener, router, shutdown).await {
            error!(listener = name, error = %e, "listener exited with error");
        }
    });

    Ok((addr, handle))
}
