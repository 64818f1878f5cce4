//! In-memory repository variants.
//!
//! Same traits as the PostgreSQL repositories, held behind a mutex. The hash
//! repository emulates skip-locked claiming with a set of claimed keys that a
//! batch releases when it is committed or dropped.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use vfs_core::defaults::{DB_DEFAULT_NAMESPACE, DEFAULT_EXTENSION, ROOT_FOLDER_ID};
use vfs_core::{
    BulkLoadStats, ClaimedBatch, Error, File, FileRepository, FileSort, Folder, FolderRepository,
    HashIndexUpdate, HashRecord, HashRepository, ListFilesRequest, NewFile, NewHashRecord,
    PathMove, Result, ScanEntry, Status,
};

type HashKey = (String, String);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// HASHES
// =============================================================================

#[derive(Default)]
struct HashState {
    rows: BTreeMap<HashKey, HashRecord>,
    claimed: HashSet<HashKey>,
}

/// In-memory HashRepository.
#[derive(Clone, Default)]
pub struct MemoryHashRepository {
    state: Arc<Mutex<HashState>>,
}

impl MemoryHashRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a full record, bypassing upsert semantics.
    pub fn put(&self, record: HashRecord) {
        let key = (record.hash.clone(), record.namespace.clone());
        lock(&self.state).rows.insert(key, record);
    }

    /// Snapshot of every stored record.
    pub fn records(&self) -> Vec<HashRecord> {
        lock(&self.state).rows.values().cloned().collect()
    }

    fn new_record(hash: String, namespace: String, extension: String, file_size: i64) -> HashRecord {
        HashRecord {
            hash,
            namespace,
            extension,
            file_size,
            width: 0,
            height: 0,
            blurhash: None,
            created_at: Utc::now(),
            indexed_at: None,
            error: String::new(),
        }
    }
}

#[async_trait]
impl HashRepository for MemoryHashRepository {
    async fn insert_if_absent(&self, record: NewHashRecord) -> Result<bool> {
        let mut state = lock(&self.state);
        let key = (record.hash.clone(), record.namespace.clone());
        if state.rows.contains_key(&key) {
            return Ok(false);
        }
        state.rows.insert(
            key,
            Self::new_record(
                record.hash,
                record.namespace,
                record.extension,
                record.file_size,
            ),
        );
        Ok(true)
    }

    async fn get(&self, hash: &str, namespace: &str) -> Result<Option<HashRecord>> {
        let state = lock(&self.state);
        Ok(state
            .rows
            .get(&(hash.to_string(), namespace.to_string()))
            .cloned())
    }

    async fn delete(&self, hash: &str, namespace: &str) -> Result<bool> {
        let mut state = lock(&self.state);
        Ok(state
            .rows
            .remove(&(hash.to_string(), namespace.to_string()))
            .is_some())
    }

    async fn claim_unindexed(&self, limit: i64) -> Result<Box<dyn ClaimedBatch>> {
        let mut state = lock(&self.state);
        let limit = usize::try_from(limit).unwrap_or(0);

        let mut pending: Vec<&HashRecord> = state
            .rows
            .iter()
            .filter(|(key, r)| r.indexed_at.is_none() && !state.claimed.contains(*key))
            .map(|(_, r)| r)
            .collect();
        pending.sort_by_key(|r| r.created_at);
        let records: Vec<HashRecord> = pending.into_iter().take(limit).cloned().collect();

        let keys: Vec<HashKey> = records
            .iter()
            .map(|r| (r.hash.clone(), r.namespace.clone()))
            .collect();
        state.claimed.extend(keys.iter().cloned());

        Ok(Box::new(MemoryClaimedBatch {
            state: Arc::clone(&self.state),
            keys,
            records,
        }))
    }

    async fn bulk_load(
        &self,
        mut entries: mpsc::Receiver<Result<ScanEntry>>,
    ) -> Result<BulkLoadStats> {
        // Staged first so that a producer error leaves the rows untouched.
        let mut staged = Vec::new();
        while let Some(entry) = entries.recv().await {
            staged.push(entry?);
        }

        let start = Instant::now();
        let mut state = lock(&self.state);
        let mut added = 0;
        for e in &staged {
            let namespace = if e.namespace.is_empty() {
                DB_DEFAULT_NAMESPACE.to_string()
            } else {
                e.namespace.clone()
            };
            let extension = if e.extension.is_empty() {
                DEFAULT_EXTENSION.to_string()
            } else {
                e.extension.clone()
            };
            let key = (e.hash.clone(), namespace.clone());
            if !state.rows.contains_key(&key) {
                state.rows.insert(
                    key,
                    Self::new_record(e.hash.clone(), namespace, extension, e.file_size),
                );
                added += 1;
            }
        }

        Ok(BulkLoadStats {
            scanned: staged.len() as u64,
            added,
            upsert_duration: start.elapsed(),
        })
    }
}

/// Claimed keys stay reserved until this batch is committed or dropped.
pub struct MemoryClaimedBatch {
    state: Arc<Mutex<HashState>>,
    keys: Vec<HashKey>,
    records: Vec<HashRecord>,
}

#[async_trait]
impl ClaimedBatch for MemoryClaimedBatch {
    fn records(&self) -> &[HashRecord] {
        &self.records
    }

    async fn commit(self: Box<Self>, updates: Vec<HashIndexUpdate>) -> Result<()> {
        // The guard must be gone before Drop re-locks to release the claim.
        {
            let mut state = lock(&self.state);
            for u in updates {
                let key = (u.hash, u.namespace);
                if !self.keys.contains(&key) {
                    continue;
                }
                if let Some(row) = state.rows.get_mut(&key) {
                    row.width = u.width;
                    row.height = u.height;
                    row.blurhash = u.blurhash;
                    row.indexed_at = u.indexed_at;
                    row.error = u.error;
                }
            }
        }
        drop(self);
        Ok(())
    }
}

impl Drop for MemoryClaimedBatch {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        for key in &self.keys {
            state.claimed.remove(key);
        }
    }
}

// =============================================================================
// FOLDERS
// =============================================================================

struct FolderState {
    rows: BTreeMap<i32, Folder>,
    next_id: i32,
}

/// In-memory FolderRepository seeded with the root folder.
#[derive(Clone)]
pub struct MemoryFolderRepository {
    state: Arc<Mutex<FolderState>>,
}

impl Default for MemoryFolderRepository {
    fn default() -> Self {
        let root = Folder {
            id: ROOT_FOLDER_ID,
            parent_id: None,
            title: "root".to_string(),
            is_favorite: false,
            created_at: Utc::now(),
            status: Status::Enabled,
        };
        Self {
            state: Arc::new(Mutex::new(FolderState {
                rows: BTreeMap::from([(ROOT_FOLDER_ID, root)]),
                next_id: ROOT_FOLDER_ID + 1,
            })),
        }
    }
}

impl MemoryFolderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F: FnOnce(&mut Folder)>(&self, id: i32, include_deleted: bool, f: F) -> Result<()> {
        let mut state = lock(&self.state);
        match state.rows.get_mut(&id) {
            Some(folder) if include_deleted || folder.status != Status::Deleted => {
                f(folder);
                Ok(())
            }
            _ => Err(Error::NotFound(format!("folder {id}"))),
        }
    }
}

fn by_title(mut folders: Vec<Folder>) -> Vec<Folder> {
    folders.sort_by(|a, b| a.title.cmp(&b.title));
    folders
}

#[async_trait]
impl FolderRepository for MemoryFolderRepository {
    async fn get(&self, id: i32) -> Result<Option<Folder>> {
        let state = lock(&self.state);
        Ok(state
            .rows
            .get(&id)
            .filter(|f| f.status != Status::Deleted)
            .cloned())
    }

    async fn children(&self, id: i32) -> Result<Vec<Folder>> {
        let state = lock(&self.state);
        Ok(by_title(
            state
                .rows
                .values()
                .filter(|f| f.parent_id == Some(id) && f.status != Status::Deleted)
                .cloned()
                .collect(),
        ))
    }

    async fn ancestors(&self, id: i32) -> Result<Vec<Folder>> {
        let state = lock(&self.state);
        let mut chain = Vec::new();
        let mut cursor = state.rows.get(&id);
        while let Some(folder) = cursor {
            // A corrupt cycle must not spin forever.
            if chain.len() > state.rows.len() {
                break;
            }
            chain.push(folder.clone());
            cursor = folder.parent_id.and_then(|p| state.rows.get(&p));
        }
        chain.reverse();
        Ok(chain)
    }

    async fn reparent(&self, id: i32, parent_id: i32) -> Result<()> {
        let mut state = lock(&self.state);

        let mut cursor = Some(parent_id);
        let mut hops = 0;
        while let Some(current) = cursor {
            if current == id {
                return Err(Error::Conflict(format!(
                    "folder {parent_id} is inside folder {id}"
                )));
            }
            hops += 1;
            if hops > state.rows.len() {
                break;
            }
            cursor = state.rows.get(&current).and_then(|f| f.parent_id);
        }

        match state.rows.get_mut(&id) {
            Some(folder) => {
                folder.parent_id = Some(parent_id);
                Ok(())
            }
            None => Err(Error::NotFound(format!("folder {id}"))),
        }
    }

    async fn create(&self, parent_id: i32, title: &str) -> Result<Folder> {
        let mut state = lock(&self.state);
        let folder = Folder {
            id: state.next_id,
            parent_id: Some(parent_id),
            title: title.to_string(),
            is_favorite: false,
            created_at: Utc::now(),
            status: Status::Enabled,
        };
        state.next_id += 1;
        state.rows.insert(folder.id, folder.clone());
        Ok(folder)
    }

    async fn rename(&self, id: i32, title: &str) -> Result<()> {
        self.update(id, false, |f| f.title = title.to_string())
    }

    async fn set_status(&self, id: i32, status: Status) -> Result<()> {
        self.update(id, true, |f| f.status = status)
    }

    async fn set_favorite(&self, id: i32, favorite: bool) -> Result<()> {
        self.update(id, false, |f| f.is_favorite = favorite)
    }

    async fn favorites(&self) -> Result<Vec<Folder>> {
        let state = lock(&self.state);
        Ok(by_title(
            state
                .rows
                .values()
                .filter(|f| f.is_favorite && f.status != Status::Deleted)
                .cloned()
                .collect(),
        ))
    }
}

// =============================================================================
// FILES
// =============================================================================

#[derive(Default)]
struct FileState {
    rows: BTreeMap<i32, File>,
    seq: i32,
}

/// In-memory FileRepository.
#[derive(Clone, Default)]
pub struct MemoryFileRepository {
    state: Arc<Mutex<FileState>>,
}

impl MemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_search(file: &File, search: Option<&str>) -> bool {
    match search {
        Some(s) => file.title.to_lowercase().contains(&s.to_lowercase()),
        None => true,
    }
}

#[async_trait]
impl FileRepository for MemoryFileRepository {
    async fn next_id(&self) -> Result<i32> {
        let mut state = lock(&self.state);
        state.seq += 1;
        Ok(state.seq)
    }

    async fn insert(&self, file: NewFile) -> Result<File> {
        let mut state = lock(&self.state);
        if state.rows.contains_key(&file.id) {
            return Err(Error::Conflict(format!("file {} exists", file.id)));
        }
        let row = File {
            id: file.id,
            folder_id: file.folder_id,
            title: file.title,
            path: file.path,
            width: file.width,
            height: file.height,
            mime_type: file.mime_type,
            file_size: file.file_size,
            file_exists: true,
            created_at: Utc::now(),
            status: Status::Enabled,
        };
        state.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get(&self, id: i32) -> Result<Option<File>> {
        let state = lock(&self.state);
        Ok(state
            .rows
            .get(&id)
            .filter(|f| f.status != Status::Deleted)
            .cloned())
    }

    async fn find_by_path(&self, path: &str) -> Result<Option<File>> {
        let state = lock(&self.state);
        Ok(state
            .rows
            .values()
            .rev()
            .find(|f| f.path == path && f.status != Status::Deleted)
            .cloned())
    }

    async fn list(&self, req: &ListFilesRequest) -> Result<Vec<File>> {
        let state = lock(&self.state);
        let mut files: Vec<File> = state
            .rows
            .values()
            .filter(|f| {
                f.folder_id == req.folder_id
                    && f.status != Status::Deleted
                    && matches_search(f, req.search.as_deref())
            })
            .cloned()
            .collect();

        files.sort_by(|a, b| {
            let ord = match req.sort {
                FileSort::CreatedAt => a.created_at.cmp(&b.created_at),
                FileSort::Title => a.title.cmp(&b.title),
                FileSort::FileSize => a.file_size.cmp(&b.file_size),
            }
            .then(a.id.cmp(&b.id));
            if req.sort_desc {
                ord.reverse()
            } else {
                ord
            }
        });

        let offset = usize::try_from(req.offset).unwrap_or(0);
        let limit = usize::try_from(req.limit).unwrap_or(0);
        Ok(files.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self, folder_id: i32, search: Option<&str>) -> Result<i64> {
        let state = lock(&self.state);
        let n = state
            .rows
            .values()
            .filter(|f| {
                f.folder_id == folder_id
                    && f.status != Status::Deleted
                    && matches_search(f, search)
            })
            .count();
        Ok(n as i64)
    }

    async fn move_to_folder(&self, ids: &[i32], folder_id: i32) -> Result<u64> {
        let mut state = lock(&self.state);
        let mut touched = 0;
        for id in ids {
            if let Some(f) = state.rows.get_mut(id) {
                if f.status != Status::Deleted {
                    f.folder_id = folder_id;
                    touched += 1;
                }
            }
        }
        Ok(touched)
    }

    async fn set_status(&self, ids: &[i32], status: Status) -> Result<u64> {
        let mut state = lock(&self.state);
        let mut touched = 0;
        for id in ids {
            if let Some(f) = state.rows.get_mut(id) {
                f.status = status;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn set_path(&self, id: i32, path: &str, apply: PathMove) -> Result<()> {
        {
            let state = lock(&self.state);
            if !state
                .rows
                .get(&id)
                .is_some_and(|f| f.status != Status::Deleted)
            {
                return Err(Error::NotFound(format!("file {id}")));
            }
        }

        // The guard cannot be held across the filesystem step.
        apply.await?;

        let mut state = lock(&self.state);
        match state.rows.get_mut(&id) {
            Some(f) => {
                f.path = path.to_string();
                Ok(())
            }
            None => Err(Error::NotFound(format!("file {id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_hash(hash: &str) -> NewHashRecord {
        NewHashRecord {
            hash: hash.to_string(),
            namespace: "default".to_string(),
            extension: "jpg".to_string(),
            file_size: 1,
        }
    }

    fn done(hash: &str, error: &str) -> HashIndexUpdate {
        HashIndexUpdate {
            hash: hash.to_string(),
            namespace: "default".to_string(),
            width: 1,
            height: 1,
            blurhash: Some("L00000fQfQfQfQfQfQfQfQfQfQfQ".to_string()),
            indexed_at: Some(Utc::now()),
            error: error.to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_if_absent_is_idempotent() {
        let repo = MemoryHashRepository::new();
        assert!(repo.insert_if_absent(new_hash("a")).await.unwrap());
        assert!(!repo.insert_if_absent(new_hash("a")).await.unwrap());
        assert_eq!(repo.records().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_are_disjoint() {
        let repo = MemoryHashRepository::new();
        for h in ["a", "b", "c", "d"] {
            repo.insert_if_absent(new_hash(h)).await.unwrap();
        }

        let first = repo.claim_unindexed(3).await.unwrap();
        let second = repo.claim_unindexed(3).await.unwrap();
        assert_eq!(first.records().len(), 3);
        assert_eq!(second.records().len(), 1);

        let first_keys: HashSet<_> = first.records().iter().map(|r| r.hash.clone()).collect();
        assert!(second
            .records()
            .iter()
            .all(|r| !first_keys.contains(&r.hash)));
    }

    #[tokio::test]
    async fn test_dropped_batch_releases_claim() {
        let repo = MemoryHashRepository::new();
        repo.insert_if_absent(new_hash("a")).await.unwrap();

        let batch = repo.claim_unindexed(10).await.unwrap();
        assert_eq!(batch.records().len(), 1);
        assert!(repo.claim_unindexed(10).await.unwrap().records().is_empty());

        drop(batch);
        assert_eq!(repo.claim_unindexed(10).await.unwrap().records().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_applies_only_claimed_rows() {
        let repo = MemoryHashRepository::new();
        repo.insert_if_absent(new_hash("a")).await.unwrap();
        repo.insert_if_absent(new_hash("b")).await.unwrap();

        let batch = repo.claim_unindexed(1).await.unwrap();
        let claimed = batch.records()[0].hash.clone();
        let other = if claimed == "a" { "b" } else { "a" };
        batch
            .commit(vec![done(&claimed, ""), done(other, "")])
            .await
            .unwrap();

        let claimed_row = repo.get(&claimed, "default").await.unwrap().unwrap();
        let other_row = repo.get(other, "default").await.unwrap().unwrap();
        assert!(claimed_row.indexed_at.is_some());
        assert!(other_row.indexed_at.is_none());
    }

    #[tokio::test]
    async fn test_bulk_load_defaults_and_idempotence() {
        let repo = MemoryHashRepository::new();
        let entries = vec![
            ScanEntry {
                hash: "a".into(),
                namespace: String::new(),
                file_size: 3,
                extension: String::new(),
            },
            ScanEntry {
                hash: "b".into(),
                namespace: "items".into(),
                file_size: 4,
                extension: "png".into(),
            },
        ];

        for expected_added in [2, 0] {
            let (tx, rx) = mpsc::channel(4);
            for e in entries.clone() {
                tx.send(Ok(e)).await.unwrap();
            }
            drop(tx);
            let stats = repo.bulk_load(rx).await.unwrap();
            assert_eq!(stats.scanned, 2);
            assert_eq!(stats.added, expected_added);
        }

        let a = repo.get("a", "default").await.unwrap().unwrap();
        assert_eq!(a.extension, "jpg");
        assert!(repo.get("b", "items").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bulk_load_aborts_on_producer_error() {
        let repo = MemoryHashRepository::new();
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(ScanEntry {
            hash: "a".into(),
            namespace: String::new(),
            file_size: 1,
            extension: "jpg".into(),
        }))
        .await
        .unwrap();
        tx.send(Err(Error::Internal("walk failed".into())))
            .await
            .unwrap();
        drop(tx);

        assert!(repo.bulk_load(rx).await.is_err());
        assert!(repo.records().is_empty());
    }

    #[tokio::test]
    async fn test_folder_ancestors_root_first() {
        let repo = MemoryFolderRepository::new();
        let a = repo.create(ROOT_FOLDER_ID, "a").await.unwrap();
        let b = repo.create(a.id, "b").await.unwrap();

        let chain: Vec<i32> = repo
            .ancestors(b.id)
            .await
            .unwrap()
            .iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(chain, vec![ROOT_FOLDER_ID, a.id, b.id]);
        assert!(repo.ancestors(999).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reparent_rejects_own_subtree() {
        let repo = MemoryFolderRepository::new();
        let a = repo.create(ROOT_FOLDER_ID, "a").await.unwrap();
        let b = repo.create(ROOT_FOLDER_ID, "b").await.unwrap();

        repo.reparent(a.id, b.id).await.unwrap();
        assert!(matches!(
            repo.reparent(b.id, a.id).await,
            Err(Error::Conflict(_))
        ));
        assert_eq!(repo.get(b.id).await.unwrap().unwrap().parent_id, Some(ROOT_FOLDER_ID));
        assert!(matches!(
            repo.reparent(999, a.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_file_list_sort_and_search() {
        let repo = MemoryFileRepository::new();
        for (title, size) in [("beta", 30), ("alpha", 10), ("gamma", 20)] {
            let id = repo.next_id().await.unwrap();
            repo.insert(NewFile {
                id,
                folder_id: 1,
                title: title.into(),
                path: format!("202601/1_{id}.jpg"),
                width: None,
                height: None,
                mime_type: "image/jpeg".into(),
                file_size: size,
            })
            .await
            .unwrap();
        }

        let req = ListFilesRequest {
            folder_id: 1,
            sort: FileSort::FileSize,
            sort_desc: true,
            limit: 10,
            ..Default::default()
        };
        let titles: Vec<String> = repo
            .list(&req)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.title)
            .collect();
        assert_eq!(titles, vec!["beta", "gamma", "alpha"]);

        assert_eq!(repo.count(1, Some("AL")).await.unwrap(), 1);
        assert_eq!(repo.count(2, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_path_rolls_back_on_failed_apply() {
        let repo = MemoryFileRepository::new();
        let id = repo.next_id().await.unwrap();
        repo.insert(NewFile {
            id,
            folder_id: 1,
            title: "t".into(),
            path: "202601/1_1.jpg".into(),
            width: None,
            height: None,
            mime_type: String::new(),
            file_size: 0,
        })
        .await
        .unwrap();

        let failed = repo
            .set_path(
                id,
                "202601/new.jpg",
                Box::pin(async { Err(Error::Internal("disk".into())) }),
            )
            .await;
        assert!(failed.is_err());
        assert_eq!(repo.get(id).await.unwrap().unwrap().path, "202601/1_1.jpg");

        repo.set_path(id, "202601/new.jpg", Box::pin(async { Ok(()) }))
            .await
            .unwrap();
        assert_eq!(repo.get(id).await.unwrap().unwrap().path, "202601/new.jpg");
    }
}
