//! Core data models for the vfs storage service.
//!
//! These types are shared across all vfs crates: hash-addressed object
//! metadata, the folder/file tree, and the scan/index exchange types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults::{DB_DEFAULT_NAMESPACE, PUBLIC_NAMESPACE};

// =============================================================================
// HASH RECORDS
// =============================================================================

/// Namespace-scoped metadata of a content-addressed object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashRecord {
    pub hash: String,
    pub namespace: String,
    pub extension: String,
    pub file_size: i64,
    /// 0 until indexed.
    pub width: i32,
    /// 0 until indexed.
    pub height: i32,
    pub blurhash: Option<String>,
    pub created_at: DateTime<Utc>,
    /// None while unindexed or after a retryable failure.
    pub indexed_at: Option<DateTime<Utc>>,
    /// Empty when the last indexing attempt succeeded.
    pub error: String,
}

impl HashRecord {
    /// Whether dimensions and perceptual fingerprint are populated.
    pub fn is_indexed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.blurhash.as_deref().is_some_and(|b| !b.is_empty())
    }
}

/// Insert payload for a HashRecord. Namespace is the metadata form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHashRecord {
    pub hash: String,
    pub namespace: String,
    pub extension: String,
    pub file_size: i64,
}

/// Result of one indexing attempt, written back column-scoped.
#[derive(Debug, Clone, PartialEq)]
pub struct HashIndexUpdate {
    pub hash: String,
    pub namespace: String,
    pub width: i32,
    pub height: i32,
    pub blurhash: Option<String>,
    pub indexed_at: Option<DateTime<Utc>>,
    pub error: String,
}

/// One canonical object discovered on disk by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// Digest, truncated to the staging column width.
    pub hash: String,
    /// Filesystem namespace; empty for the public namespace.
    pub namespace: String,
    pub file_size: i64,
    pub extension: String,
}

impl ScanEntry {
    /// `;`-delimited record line for the bulk-load stream.
    pub fn to_record_line(&self) -> String {
        format!(
            "{};{};{};{}\n",
            self.hash, self.namespace, self.file_size, self.extension
        )
    }
}

/// Outcome of streaming scan entries into the metadata store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkLoadStats {
    /// Records streamed into staging.
    pub scanned: u64,
    /// Rows newly inserted by the upsert.
    pub added: u64,
    /// Time spent in the staging-to-table upsert.
    pub upsert_duration: Duration,
}

/// Scan summary returned to callers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub scanned: u64,
    pub added: u64,
    pub duration_ms: u64,
}

impl From<BulkLoadStats> for ScanStats {
    fn from(s: BulkLoadStats) -> Self {
        Self {
            scanned: s.scanned,
            added: s.added,
            duration_ms: s.upsert_duration.as_millis() as u64,
        }
    }
}

/// Metadata namespace for a filesystem namespace (`""` becomes `default`).
pub fn db_namespace(ns: &str) -> &str {
    if ns.is_empty() {
        DB_DEFAULT_NAMESPACE
    } else {
        ns
    }
}

/// Filesystem namespace for a metadata namespace (`default` becomes `""`).
pub fn fs_namespace(ns: &str) -> &str {
    if ns == DB_DEFAULT_NAMESPACE {
        PUBLIC_NAMESPACE
    } else {
        ns
    }
}

// =============================================================================
// FOLDER TREE
// =============================================================================

/// Lifecycle status shared by folders and files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Enabled,
    Disabled,
    Deleted,
}

impl Status {
    pub fn as_id(self) -> i32 {
        match self {
            Status::Enabled => 1,
            Status::Disabled => 2,
            Status::Deleted => 3,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(Status::Enabled),
            2 => Some(Status::Disabled),
            3 => Some(Status::Deleted),
            _ => None,
        }
    }
}

/// Node of the user-organized folder tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: i32,
    pub parent_id: Option<i32>,
    pub title: String,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub status: Status,
}

/// Folder with its direct, non-deleted children.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderWithChildren {
    #[serde(flatten)]
    pub folder: Folder,
    pub folders: Vec<Folder>,
}

/// Tree-organized file stored under a date-partitioned path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub id: i32,
    pub folder_id: i32,
    pub title: String,
    /// Path relative to the namespace directory, `yyyymm/<folder>_<id>.<ext>`.
    pub path: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub mime_type: String,
    pub file_size: i32,
    pub file_exists: bool,
    pub created_at: DateTime<Utc>,
    pub status: Status,
}

/// Insert payload for a File; the id is reserved beforehand.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFile {
    pub id: i32,
    pub folder_id: i32,
    pub title: String,
    pub path: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub mime_type: String,
    pub file_size: i32,
}

/// Sort column for file listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileSort {
    #[default]
    CreatedAt,
    Title,
    FileSize,
}

impl FileSort {
    pub fn column(self) -> &'static str {
        match self {
            FileSort::CreatedAt => "created_at",
            FileSort::Title => "title",
            FileSort::FileSize => "file_size",
        }
    }
}

/// Filters and paging for file listings within one folder.
#[derive(Debug, Clone, Default)]
pub struct ListFilesRequest {
    pub folder_id: i32,
    /// Case-insensitive title substring.
    pub search: Option<String>,
    pub sort: FileSort,
    pub sort_desc: bool,
    pub limit: i64,
    pub offset: i64,
}
