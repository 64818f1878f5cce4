//! Tree file handlers: listing, bulk move/delete, renames and lookups.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use vfs_core::defaults::{PAGE_LIMIT, PAGE_LIMIT_MAX};
use vfs_core::{Error, File, FileSort, Folder, ListFilesRequest};

use crate::{ApiError, AppState};

/// Query of `GET /folders/:id/files`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesQuery {
    pub search: Option<String>,
    #[serde(default)]
    pub sort: FileSort,
    #[serde(default)]
    pub desc: bool,
    /// 1-based.
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl ListFilesQuery {
    fn into_request(self, folder_id: i32) -> ListFilesRequest {
        let limit = self.page_size.unwrap_or(PAGE_LIMIT).clamp(1, PAGE_LIMIT_MAX);
        let page = self.page.unwrap_or(1).max(1);
        ListFilesRequest {
            folder_id,
            search: self.search.filter(|s| !s.trim().is_empty()),
            sort: self.sort,
            sort_desc: self.desc,
            limit,
            offset: (page - 1) * limit,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub files: Vec<File>,
    pub total: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveFilesRequest {
    pub file_ids: Vec<i32>,
    pub destination_id: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFilesRequest {
    pub file_ids: Vec<i32>,
}

#[derive(Debug, Deserialize)]
pub struct RenameFileRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct FolderByPathQuery {
    pub path: String,
}

/// Rows touched by a bulk operation.
#[derive(Debug, Serialize, Deserialize)]
pub struct AffectedResponse {
    pub affected: u64,
}

/// `GET /folders/:id/files`
pub async fn list_files(
    State(state): State<AppState>,
    Path(folder_id): Path<i32>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<ListFilesResponse>, ApiError> {
    let req = query.into_request(folder_id);
    let (files, total) = state.files.list(&req).await?;
    Ok(Json(ListFilesResponse { files, total }))
}

/// `POST /files/move`
pub async fn move_files(
    State(state): State<AppState>,
    Json(req): Json<MoveFilesRequest>,
) -> Result<Json<AffectedResponse>, ApiError> {
    let affected = state
        .files
        .move_files(&req.file_ids, req.destination_id)
        .await?;
    Ok(Json(AffectedResponse { affected }))
}

/// `POST /files/delete`
pub async fn delete_files(
    State(state): State<AppState>,
    Json(req): Json<DeleteFilesRequest>,
) -> Result<Json<AffectedResponse>, ApiError> {
    let affected = state.files.delete_files(&req.file_ids).await?;
    Ok(Json(AffectedResponse { affected }))
}

/// `PUT /files/:id/name`; an unacceptable physical name is 406.
pub async fn set_physical_name(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(req): Json<RenameFileRequest>,
) -> Result<StatusCode, ApiError> {
    match state.files.set_physical_name(id, &req.name).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(Error::InvalidInput(msg)) => Err(ApiError::NotAcceptable(msg)),
        Err(e) => Err(e.into()),
    }
}

/// `GET /files/:id/folder`
pub async fn folder_of_file(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Folder>, ApiError> {
    Ok(Json(state.files.folder_of_file(id).await?))
}

/// `GET /files/folder?path=`
pub async fn folder_of_path(
    State(state): State<AppState>,
    Query(query): Query<FolderByPathQuery>,
) -> Result<Json<Folder>, ApiError> {
    Ok(Json(state.files.folder_of_path(&query.path).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_paging_defaults_and_clamp() {
        let req = ListFilesQuery::default().into_request(3);
        assert_eq!(req.folder_id, 3);
        assert_eq!((req.limit, req.offset), (PAGE_LIMIT, 0));

        let req = ListFilesQuery {
            page: Some(3),
            page_size: Some(10_000),
            search: Some("  ".into()),
            ..Default::default()
        }
        .into_request(1);
        assert_eq!(req.limit, PAGE_LIMIT_MAX);
        assert_eq!(req.offset, 2 * PAGE_LIMIT_MAX);
        assert!(req.search.is_none());
    }
}
