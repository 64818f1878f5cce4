//! Indexing work queue: claim unindexed hashes, decode, write back.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use vfs_core::{
    fs_namespace, ContentFingerprint, Error, HashIndexUpdate, HashRecord, HashRepository, Result,
};
use vfs_db::ObjectStore;

use crate::config::IndexerConfig;
use crate::imaging::{self, ImageInfo};

/// Why a single row could not be indexed.
///
/// Only the message is persisted; the variant decides whether the row is
/// offered again on a later pass.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// The object is not on disk yet.
    #[error("{0}")]
    Retryable(String),
    /// Corrupt or unsupported content.
    #[error("{0}")]
    Terminal(String),
}

impl IndexError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::Retryable(_))
    }
}

impl From<Error> for IndexError {
    fn from(e: Error) -> Self {
        if e.is_not_found_io() {
            IndexError::Retryable(e.to_string())
        } else {
            IndexError::Terminal(e.to_string())
        }
    }
}

/// Processes batches claimed from the hash queue.
#[derive(Clone)]
pub struct Indexer {
    hashes: Arc<dyn HashRepository>,
    store: ObjectStore,
    batch_size: i64,
    blurhash: bool,
}

impl Indexer {
    pub fn new(hashes: Arc<dyn HashRepository>, store: ObjectStore, config: &IndexerConfig) -> Self {
        Self {
            hashes,
            store,
            batch_size: config.batch_size,
            blurhash: config.blurhash,
        }
    }

    /// Claim one batch, index every row and commit all results in one write.
    ///
    /// Returns the number of rows written back. Per-row failures are
    /// recorded on the row and never fail the batch.
    pub async fn process_queue(&self) -> Result<usize> {
        let start = Instant::now();
        let batch = self.hashes.claim_unindexed(self.batch_size).await?;
        let records = batch.records().to_vec();
        if records.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let handles: Vec<_> = records
            .iter()
            .cloned()
            .map(|record| {
                let store = self.store.clone();
                let blurhash = self.blurhash;
                tokio::task::spawn_blocking(move || index_record(&store, &record, blurhash))
            })
            .collect();

        let mut updates = Vec::with_capacity(handles.len());
        for (record, handle) in records.iter().zip(handles) {
            let outcome = handle
                .await
                .unwrap_or_else(|e| Err(IndexError::Terminal(e.to_string())));
            updates.push(to_update(record, outcome, now));
        }

        let rows = updates.len();
        let failed = updates.iter().filter(|u| !u.error.is_empty()).count();
        batch.commit(updates).await?;

        info!(
            subsystem = "jobs",
            component = "indexer",
            op = "process_queue",
            rows,
            failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Index batch committed"
        );
        Ok(rows)
    }
}

/// Index one claimed row from disk. Blocking.
pub fn index_record(
    store: &ObjectStore,
    record: &HashRecord,
    with_blurhash: bool,
) -> std::result::Result<ImageInfo, IndexError> {
    let fingerprint = ContentFingerprint::new(record.hash.as_str(), &record.extension)?;
    let path = store.object_path(fs_namespace(&record.namespace), &fingerprint);
    let info = imaging::analyze(&path, with_blurhash)?;
    debug!(
        subsystem = "jobs",
        component = "indexer",
        hash = %record.hash,
        namespace = %record.namespace,
        width = info.width,
        height = info.height,
        "Indexed object"
    );
    Ok(info)
}

/// Column-scoped write-back for one outcome.
pub fn to_update(
    record: &HashRecord,
    outcome: std::result::Result<ImageInfo, IndexError>,
    now: DateTime<Utc>,
) -> HashIndexUpdate {
    let mut update = HashIndexUpdate {
        hash: record.hash.clone(),
        namespace: record.namespace.clone(),
        width: 0,
        height: 0,
        blurhash: None,
        indexed_at: Some(now),
        error: String::new(),
    };
    match outcome {
        Ok(info) => {
            update.width = i32::try_from(info.width).unwrap_or(i32::MAX);
            update.height = i32::try_from(info.height).unwrap_or(i32::MAX);
            update.blurhash = info.blurhash;
        }
        Err(e) => {
            if e.is_retryable() {
                update.indexed_at = None;
            }
            update.error = e.to_string();
        }
    }
    update
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;
    use vfs_core::{digest_bytes, NewHashRecord};
    use vfs_db::MemoryHashRepository;

    struct Fixture {
        _dir: TempDir,
        repo: Arc<MemoryHashRepository>,
        store: ObjectStore,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path()).with_namespaces(["test"]);
        Fixture {
            _dir: dir,
            repo: Arc::new(MemoryHashRepository::new()),
            store,
        }
    }

    async fn register(f: &Fixture, ns: &str, digest: &str, ext: &str) {
        f.repo
            .insert_if_absent(NewHashRecord {
                hash: digest.to_string(),
                namespace: vfs_core::db_namespace(ns).to_string(),
                extension: ext.to_string(),
                file_size: 1,
            })
            .await
            .unwrap();
    }

    fn place(f: &Fixture, ns: &str, digest: &str, ext: &str, bytes: Option<&[u8]>) {
        let fp = ContentFingerprint::new(digest, ext).unwrap();
        let path = f.store.object_path(ns, &fp);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        match bytes {
            Some(b) => std::fs::write(&path, b).unwrap(),
            None => RgbImage::from_pixel(12, 8, Rgb([10, 200, 30]))
                .save_with_format(&path, image::ImageFormat::Png)
                .unwrap(),
        }
    }

    fn indexer(f: &Fixture) -> Indexer {
        Indexer::new(
            f.repo.clone(),
            f.store.clone(),
            &IndexerConfig::default().with_batch_size(10),
        )
    }

    #[test]
    fn test_index_error_classification() {
        let missing: IndexError =
            Error::Io(std::io::Error::from(std::io::ErrorKind::NotFound)).into();
        assert!(missing.is_retryable());

        let corrupt: IndexError = Error::Image("bad header".into()).into();
        assert!(!corrupt.is_retryable());
        assert_eq!(corrupt.to_string(), "Image error: bad header");
    }

    #[tokio::test]
    async fn test_process_queue_empty_returns_zero() {
        let f = fixture();
        assert_eq!(indexer(&f).process_queue().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_process_queue_success_missing_and_corrupt() {
        let f = fixture();
        let ok = digest_bytes(b"ok");
        let missing = digest_bytes(b"missing");
        let corrupt = digest_bytes(b"corrupt");

        register(&f, "", &ok, "png").await;
        register(&f, "test", &missing, "jpg").await;
        register(&f, "", &corrupt, "jpg").await;
        place(&f, "", &ok, "png", None);
        place(&f, "", &corrupt, "jpg", Some(b"not a jpeg"));

        let idx = indexer(&f);
        assert_eq!(idx.process_queue().await.unwrap(), 3);

        let row = f.repo.get(&ok, "default").await.unwrap().unwrap();
        assert_eq!((row.width, row.height), (12, 8));
        assert!(row.is_indexed());
        assert!(row.error.is_empty());

        let row = f.repo.get(&missing, "test").await.unwrap().unwrap();
        assert!(row.indexed_at.is_none());
        assert!(!row.error.is_empty());

        let row = f.repo.get(&corrupt, "default").await.unwrap().unwrap();
        assert!(row.indexed_at.is_some());
        assert!(!row.error.is_empty());
        assert!(!row.is_indexed());

        // Only the missing object is offered again.
        assert_eq!(idx.process_queue().await.unwrap(), 1);
        let row = f.repo.get(&missing, "test").await.unwrap().unwrap();
        assert!(row.indexed_at.is_none());

        place(&f, "test", &missing, "jpg", None);
        assert_eq!(idx.process_queue().await.unwrap(), 1);
        let row = f.repo.get(&missing, "test").await.unwrap().unwrap();
        assert!(row.is_indexed());
        assert!(row.error.is_empty());
        assert_eq!(idx.process_queue().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_process_queue_without_blurhash() {
        let f = fixture();
        let d = digest_bytes(b"plain");
        register(&f, "", &d, "png").await;
        place(&f, "", &d, "png", None);

        let idx = Indexer::new(
            f.repo.clone(),
            f.store.clone(),
            &IndexerConfig::default().with_blurhash(false),
        );
        idx.process_queue().await.unwrap();

        let row = f.repo.get(&d, "default").await.unwrap().unwrap();
        assert_eq!(row.width, 12);
        assert!(row.indexed_at.is_some());
        assert!(row.blurhash.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_batches_never_share_rows() {
        let f = fixture();
        for i in 0..30u32 {
            let d = digest_bytes(&i.to_le_bytes());
            register(&f, "", &d, "png").await;
            place(&f, "", &d, "png", None);
        }

        let idx = indexer(&f);
        let (a, b, c) = tokio::join!(
            idx.process_queue(),
            idx.process_queue(),
            idx.process_queue()
        );
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert_eq!((a, b, c), (10, 10, 10));

        // Disjoint claims cover every row, so nothing is left to claim.
        assert_eq!(idx.process_queue().await.unwrap(), 0);
        assert!(f.repo.records().iter().all(|r| r.is_indexed()));
    }

    #[test]
    fn test_to_update_success_clears_error() {
        let record = HashRecord {
            hash: digest_bytes(b"x"),
            namespace: "default".into(),
            extension: "jpg".into(),
            file_size: 1,
            width: 0,
            height: 0,
            blurhash: None,
            created_at: Utc::now(),
            indexed_at: None,
            error: "old failure".into(),
        };
        let now = Utc::now();
        let update = to_update(
            &record,
            Ok(ImageInfo {
                width: 4,
                height: 3,
                blurhash: Some("LEHV6nWB2yk8pyo0adR*.7kCMdnj".into()),
            }),
            now,
        );
        assert_eq!(update.indexed_at, Some(now));
        assert!(update.error.is_empty());
        assert_eq!((update.width, update.height), (4, 3));
    }
}
