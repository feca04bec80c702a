//! Error types for the command API.
//!
//! [`ApiError`] converts into an Axum response carrying a JSON body of the
//! form `{"error": "...", "status": 404}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use joinwatch_core::preferences::PreferenceError;

/// Errors returned by command API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No preference record exists for the identity.
    #[error("not found: {0}")]
    NotFound(String),

    /// A preference change was rejected by the store layer.
    #[error(transparent)]
    Preference(#[from] PreferenceError),

    /// The request body or path was unusable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) | Self::Preference(PreferenceError::NotRegistered { .. }) => {
                StatusCode::NOT_FOUND
            }
            Self::Preference(PreferenceError::Persist { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };

        if status.is_server_error() {
            tracing::warn!(error = %self, "command API request failed");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
