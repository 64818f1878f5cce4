//! In-memory cache of rendered blurhash previews.
//!
//! Entries are derived from indexed hash records, so eviction only costs a
//! re-render.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use lru::LruCache;
use tracing::debug;

use vfs_core::defaults::PREVIEW_WIDTH;
use vfs_core::{Error, HashRepository, Result};
use vfs_jobs::{preview_height, render_preview};

/// Rendered preview and the time its source record was indexed.
#[derive(Debug, Clone)]
pub struct PreviewEntry {
    pub data: Arc<Vec<u8>>,
    pub modified: DateTime<Utc>,
}

impl PreviewEntry {
    /// Whether a client copy from `since` is still current (second precision).
    pub fn not_modified_since(&self, since: DateTime<Utc>) -> bool {
        self.modified.timestamp() <= since.timestamp()
    }
}

/// LRU of previews keyed by `namespace|hash`.
#[derive(Clone)]
pub struct PreviewCache {
    hashes: Arc<dyn HashRepository>,
    entries: Arc<Mutex<LruCache<String, PreviewEntry>>>,
    width: u32,
}

impl PreviewCache {
    pub fn new(hashes: Arc<dyn HashRepository>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            hashes,
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            width: PREVIEW_WIDTH,
        }
    }

    fn key(namespace: &str, hash: &str) -> String {
        format!("{namespace}|{hash}")
    }

    /// Cached preview, rendering it from the hash record on a miss.
    ///
    /// `namespace` is the metadata form. Missing and not-yet-indexed records
    /// are both `NotFound`.
    pub async fn get(&self, namespace: &str, hash: &str) -> Result<PreviewEntry> {
        let key = Self::key(namespace, hash);
        let cached = self.lock().get(&key).cloned();
        if let Some(entry) = cached {
            return Ok(entry);
        }

        let record = self
            .hashes
            .get(hash, namespace)
            .await?
            .ok_or_else(|| Error::NotFound("hash not found".into()))?;
        let (Some(blurhash), Some(indexed_at)) = (record.blurhash.as_deref(), record.indexed_at)
        else {
            return Err(Error::NotFound("hash not indexed yet".into()));
        };
        if !record.is_indexed() {
            return Err(Error::NotFound("hash not indexed yet".into()));
        }

        let height = preview_height(self.width, record.width, record.height);
        let data = render_preview(blurhash, self.width, height)?;
        let entry = PreviewEntry {
            data: Arc::new(data),
            modified: indexed_at,
        };

        debug!(
            subsystem = "api",
            component = "preview_cache",
            namespace,
            hash,
            bytes = entry.data.len(),
            "Rendered preview"
        );
        self.lock().put(key, entry.clone());
        Ok(entry)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, PreviewEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
