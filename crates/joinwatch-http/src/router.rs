//! Router construction.

use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::routing::{get, post};
use joinwatch_core::preferences::PreferenceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Router for the health listener.
///
/// Holds no state, so it answers even if the engine never started.
pub fn build_health_router() -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
}

/// Router for the command API.
///
/// Read endpoints accept cross-origin `GET` so a status page can poll
/// `/api/presence` directly.
pub fn build_api_router<P>(state: Arc<AppState<P>>) -> Router
where
    P: PreferenceStore + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/api/presence", get(handlers::get_presence::<P>))
        .route(
            "/api/preferences/{identity}",
            get(handlers::get_preference::<P>).put(handlers::put_preference::<P>),
        )
        .route("/api/registrations", post(handlers::post_registration::<P>))
        .route("/api/commands", post(handlers::post_command::<P>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
