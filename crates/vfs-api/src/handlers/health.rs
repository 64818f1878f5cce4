//! Liveness endpoint.

use axum::{extract::State, http::StatusCode};
use tracing::warn;

use crate::AppState;

/// `GET /status`: `OK`, or 500 when the metadata store does not answer.
pub async fn status(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if let Some(db) = &state.db {
        if let Err(e) = db.ping().await {
            warn!(error = %e, "Health check failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "DB error");
        }
    }
    (StatusCode::OK, "OK")
}
