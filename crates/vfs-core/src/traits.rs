//! Repository traits for the metadata store.
//!
//! The PostgreSQL implementations live in `vfs-db`; in-memory variants of
//! the same traits back unit tests that must run without a database.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// HASH REPOSITORY
// =============================================================================

/// A batch of unindexed rows claimed by one worker.
///
/// The rows stay locked against other claimers until `commit` finishes or
/// the batch is dropped (which releases the claim without writing).
#[async_trait]
pub trait ClaimedBatch: Send {
    /// Claimed rows; processing order is unspecified.
    fn records(&self) -> &[HashRecord];

    /// Write all results in a single statement and release the claim.
    async fn commit(self: Box<Self>, updates: Vec<HashIndexUpdate>) -> Result<()>;
}

/// Repository for hash-addressed object metadata.
#[async_trait]
pub trait HashRepository: Send + Sync {
    /// Insert unless a row for (hash, namespace) exists. Returns true when inserted.
    async fn insert_if_absent(&self, record: NewHashRecord) -> Result<bool>;

    /// Fetch one record by metadata namespace.
    async fn get(&self, hash: &str, namespace: &str) -> Result<Option<HashRecord>>;

    /// Delete one record. Returns true when a row was removed.
    async fn delete(&self, hash: &str, namespace: &str) -> Result<bool>;

    /// Claim up to `limit` rows with `indexed_at IS NULL`, skipping rows
    /// claimed by any other in-flight batch.
    async fn claim_unindexed(&self, limit: i64) -> Result<Box<dyn ClaimedBatch>>;

    /// Stream scan entries into staging and upsert them with do-nothing on
    /// conflict. An `Err` item aborts the load without committing anything.
    async fn bulk_load(&self, entries: mpsc::Receiver<Result<ScanEntry>>)
        -> Result<BulkLoadStats>;
}

// =============================================================================
// FOLDER REPOSITORY
// =============================================================================

/// Repository for the folder tree.
#[async_trait]
pub trait FolderRepository: Send + Sync {
    /// Fetch a non-deleted folder.
    async fn get(&self, id: i32) -> Result<Option<Folder>>;

    /// Direct non-deleted children ordered by title.
    async fn children(&self, id: i32) -> Result<Vec<Folder>>;

    /// Chain of folders from the root down to `id` inclusive.
    async fn ancestors(&self, id: i32) -> Result<Vec<Folder>>;

    /// Update only the parent pointer of `id`.
    ///
    /// Fails with `Conflict` when `parent_id` lies in the subtree of `id`.
    /// The check and the write are serialized against concurrent moves.
    async fn reparent(&self, id: i32, parent_id: i32) -> Result<()>;

    async fn create(&self, parent_id: i32, title: &str) -> Result<Folder>;

    async fn rename(&self, id: i32, title: &str) -> Result<()>;

    async fn set_status(&self, id: i32, status: Status) -> Result<()>;

    async fn set_favorite(&self, id: i32, favorite: bool) -> Result<()>;

    /// Non-deleted folders flagged favorite, ordered by title.
    async fn favorites(&self) -> Result<Vec<Folder>>;
}

// =============================================================================
// FILE REPOSITORY
// =============================================================================

/// Filesystem step awaited inside a repository transaction.
pub type PathMove = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Repository for tree-organized files.
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Reserve the next file id.
    async fn next_id(&self) -> Result<i32>;

    async fn insert(&self, file: NewFile) -> Result<File>;

    /// Fetch a non-deleted file.
    async fn get(&self, id: i32) -> Result<Option<File>>;

    /// Fetch a non-deleted file by its relative storage path.
    async fn find_by_path(&self, path: &str) -> Result<Option<File>>;

    async fn list(&self, req: &ListFilesRequest) -> Result<Vec<File>>;

    async fn count(&self, folder_id: i32, search: Option<&str>) -> Result<i64>;

    /// Reassign files to a folder. Returns the number of rows touched.
    async fn move_to_folder(&self, ids: &[i32], folder_id: i32) -> Result<u64>;

    /// Change status of files. Returns the number of rows touched.
    async fn set_status(&self, ids: &[i32], status: Status) -> Result<u64>;

    /// Update the stored path and run `apply` before committing; a failing
    /// `apply` leaves the row untouched.
    async fn set_path(&self, id: i32, path: &str, apply: PathMove) -> Result<()>;
}
