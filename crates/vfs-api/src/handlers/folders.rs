//! Folder tree handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use vfs_core::{Folder, FolderWithChildren};

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub parent_id: i32,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameFolderRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveFolderRequest {
    pub destination_id: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRequest {
    pub is_favorite: bool,
}

/// `GET /folders/:id` with direct children.
pub async fn get_folder(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<FolderWithChildren>, ApiError> {
    Ok(Json(state.folders.folder_with_children(id).await?))
}

/// `GET /folders/:id/branch`, root first.
pub async fn get_branch(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<Folder>>, ApiError> {
    Ok(Json(state.folders.branch(id).await?))
}

/// `POST /folders`
pub async fn create_folder(
    State(state): State<AppState>,
    Json(req): Json<CreateFolderRequest>,
) -> Result<(StatusCode, Json<Folder>), ApiError> {
    let folder = state.folders.create(req.parent_id, &req.name).await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

/// `PATCH /folders/:id`
pub async fn rename_folder(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(req): Json<RenameFolderRequest>,
) -> Result<StatusCode, ApiError> {
    state.folders.rename(id, &req.name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /folders/:id`
pub async fn delete_folder(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    state.folders.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /folders/:id/move`; moving into the folder's own subtree is 409.
pub async fn move_folder(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(req): Json<MoveFolderRequest>,
) -> Result<StatusCode, ApiError> {
    state.folders.move_folder(id, req.destination_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /folders/favorites`
pub async fn list_favorites(State(state): State<AppState>) -> Result<Json<Vec<Folder>>, ApiError> {
    Ok(Json(state.folders.favorites().await?))
}

/// `PUT /folders/:id/favorite`
pub async fn set_favorite(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(req): Json<FavoriteRequest>,
) -> Result<StatusCode, ApiError> {
    state.folders.set_favorite(id, req.is_favorite).await?;
    Ok(StatusCode::NO_CONTENT)
}
