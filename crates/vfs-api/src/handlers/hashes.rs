//! Hash maintenance: deletion and public URL construction.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use vfs_core::{db_namespace, extension_of, fs_namespace, strip_extension, ContentFingerprint, Error};

use crate::config::StorageConfig;
use crate::{ApiError, AppState};

/// `DELETE /hash/:ns/:hash`; `default` addresses the public namespace.
///
/// The record is removed first; a missing record or a missing object is
/// reported as not found.
pub async fn delete_hash(
    State(state): State<AppState>,
    Path((ns, hash)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let fs_ns = fs_namespace(&ns);
    state.store.validate_namespace(fs_ns)?;
    let db_ns = db_namespace(fs_ns);

    let record = state
        .hashes
        .get(&hash, db_ns)
        .await?
        .ok_or_else(|| Error::NotFound("hash not found".into()))?;
    state.hashes.delete(&record.hash, db_ns).await?;

    let fingerprint = ContentFingerprint::new(record.hash.as_str(), &record.extension)?;
    state.store.remove(fs_ns, &fingerprint).await?;

    info!(
        subsystem = "api",
        component = "hashes",
        op = "delete",
        hash = %record.hash,
        namespace = db_ns,
        "Hash deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Query of `GET /hash/url`.
#[derive(Debug, Deserialize)]
pub struct HashUrlQuery {
    pub hash: String,
    #[serde(default)]
    pub ns: String,
    /// Media type directory such as `small`; empty for the original.
    #[serde(default, rename = "type")]
    pub media_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashUrlResponse {
    pub hash: String,
    pub web_path: String,
}

/// `GET /hash/url?hash=&ns=&type=`; storage is not consulted.
pub async fn hash_url(
    State(state): State<AppState>,
    Query(query): Query<HashUrlQuery>,
) -> Json<HashUrlResponse> {
    let rel = StorageConfig::rel_hash_path(&query.hash, "");
    Json(HashUrlResponse {
        web_path: state.storage.web_hash_path(&query.ns, &query.media_type, &rel),
        hash: query.hash,
    })
}

/// Body of `POST /hash/urls`.
#[derive(Debug, Deserialize)]
pub struct HashUrlsRequest {
    /// Digests, optionally with an extension (`<hash>.png`).
    pub hashes: Vec<String>,
    #[serde(default)]
    pub ns: String,
    #[serde(default, rename = "type")]
    pub media_type: String,
}

/// `POST /hash/urls`
pub async fn hash_urls(
    State(state): State<AppState>,
    Json(req): Json<HashUrlsRequest>,
) -> Json<Vec<HashUrlResponse>> {
    let urls = req
        .hashes
        .into_iter()
        .map(|hash| {
            let base = hash.rsplit('/').next().unwrap_or(hash.as_str());
            let rel = StorageConfig::rel_hash_path(strip_extension(base), extension_of(base));
            HashUrlResponse {
                web_path: state.storage.web_hash_path(&req.ns, &req.media_type, &rel),
                hash,
            }
        })
        .collect();
    Json(urls)
}
