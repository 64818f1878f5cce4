//! Manual bulk ingest trigger.

use axum::{extract::State, Json};

use vfs_core::ScanStats;

use crate::{ApiError, AppState};

/// `GET|POST /scan-files`; a scan already in progress answers 409.
pub async fn scan_files(State(state): State<AppState>) -> Result<Json<ScanStats>, ApiError> {
    let stats = state.scheduler.scan().await?;
    Ok(Json(stats))
}
