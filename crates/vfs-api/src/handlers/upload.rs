//! Upload handlers for hash-addressed objects and tree files.
//!
//! `PUT` streams the raw body; `POST` reads the configured multipart field.

use std::io;

use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Query, State},
    Json,
};
use futures::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::info;

use vfs_core::defaults::PUBLIC_NAMESPACE;
use vfs_core::{db_namespace, extension_of, title_from_filename, NewHashRecord};
use vfs_db::TreeUpload;
use vfs_jobs::read_dimensions;

use crate::{ApiError, AppState};

/// Query parameters of `/upload/hash`.
#[derive(Debug, Deserialize)]
pub struct HashUploadQuery {
    #[serde(default)]
    pub ns: String,
    #[serde(default)]
    pub ext: String,
}

/// Query parameters of `/upload/file`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadQuery {
    pub folder_id: i32,
    /// Used by `PUT`, where no client file name is available.
    #[serde(default)]
    pub ext: String,
}

/// Upload result; hash uploads fill `hash`/`webPath`, tree uploads `id`/`name`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    pub ext: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// `PUT /upload/hash?ns=&ext=`
pub async fn put_hash(
    State(state): State<AppState>,
    Query(query): Query<HashUploadQuery>,
    body: Body,
) -> Result<Json<UploadResponse>, ApiError> {
    let ext = query.ext.to_lowercase();
    let reader = stream_reader(body.into_data_stream());
    store_hash(&state, &query.ns, &ext, reader).await.map(Json)
}

/// `POST /upload/hash?ns=&ext=`
pub async fn post_hash(
    State(state): State<AppState>,
    Query(query): Query<HashUploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let form_name = state.storage.upload_form_name.as_str();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(form_name) {
            continue;
        }
        let ext = query.ext.to_lowercase();
        return store_hash(&state, &query.ns, &ext, stream_reader(field))
            .await
            .map(Json);
    }
    Err(missing_field(form_name))
}

/// `PUT /upload/file?folderId=&ext=`
pub async fn put_file(
    State(state): State<AppState>,
    Query(query): Query<FileUploadQuery>,
    body: Body,
) -> Result<Json<UploadResponse>, ApiError> {
    let ext = query.ext.to_lowercase();
    let reader = stream_reader(body.into_data_stream());
    store_tree_file(&state, query.folder_id, &ext, String::new(), reader)
        .await
        .map(Json)
}

/// `POST /upload/file?folderId=`; extension and title come from the file name.
pub async fn post_file(
    State(state): State<AppState>,
    Query(query): Query<FileUploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let form_name = state.storage.upload_form_name.as_str();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(form_name) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let ext = extension_of(&filename).to_lowercase();
        let title = title_from_filename(&filename);
        return store_tree_file(&state, query.folder_id, &ext, title, stream_reader(field))
            .await
            .map(Json);
    }
    Err(missing_field(form_name))
}

fn missing_field(name: &str) -> ApiError {
    ApiError::BadRequest(format!("missing form field {name}"))
}

/// Adapt a body or multipart field into a reader so uploads are hashed as
/// they arrive; the object store enforces the size limit while copying.
fn stream_reader<S, E>(stream: S) -> impl AsyncRead + Unpin
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    StreamReader::new(Box::pin(stream.map_err(io::Error::other)))
}

async fn store_hash<R>(
    state: &AppState,
    ns: &str,
    ext: &str,
    reader: R,
) -> Result<UploadResponse, ApiError>
where
    R: AsyncRead + Unpin,
{
    let staged = state.store.stage(ns, ext, reader).await?;
    let stored = state.store.commit(ns, staged).await?;
    let fingerprint = &stored.fingerprint;

    let added = state
        .hashes
        .insert_if_absent(NewHashRecord {
            hash: fingerprint.digest().to_string(),
            namespace: db_namespace(ns).to_string(),
            extension: fingerprint.extension().to_string(),
            file_size: i64::try_from(stored.size).unwrap_or(i64::MAX),
        })
        .await?;

    info!(
        subsystem = "api",
        component = "upload",
        op = "hash",
        hash = %fingerprint.digest(),
        namespace = ns,
        file_size = stored.size,
        added,
        "Hash upload stored"
    );

    Ok(UploadResponse {
        hash: Some(fingerprint.digest().to_string()),
        web_path: Some(state.storage.web_hash_path(ns, "", &fingerprint.rel_path())),
        ext: fingerprint.extension().to_string(),
        ..Default::default()
    })
}

async fn store_tree_file<R>(
    state: &AppState,
    folder_id: i32,
    ext: &str,
    title: String,
    reader: R,
) -> Result<UploadResponse, ApiError>
where
    R: AsyncRead + Unpin,
{
    state.folders.folder(folder_id).await?;

    let staged = state.store.stage(PUBLIC_NAMESPACE, ext, reader).await?;
    let temp = staged.path().to_path_buf();
    let dimensions = tokio::task::spawn_blocking(move || read_dimensions(&temp).ok())
        .await
        .ok()
        .flatten();

    let file = state
        .files
        .add_upload(
            folder_id,
            TreeUpload {
                staged,
                title,
                dimensions,
                salted: state.storage.salted_filenames,
            },
        )
        .await?;

    info!(
        subsystem = "api",
        component = "upload",
        op = "file",
        file_id = file.id,
        folder_id,
        path = %file.path,
        "Tree upload stored"
    );

    Ok(UploadResponse {
        id: Some(file.id),
        ext: extension_of(&file.path).to_string(),
        name: Some(file.title),
        ..Default::default()
    })
}
