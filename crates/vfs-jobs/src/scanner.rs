//! Bulk ingest scan: walk the storage root and bulk-load canonical objects.
//!
//! The walk runs on a blocking thread and feeds a bounded channel; the
//! repository consumes the channel into its staging table. A full channel
//! blocks the walk, and a dropped receiver stops it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use vfs_core::defaults::{SCAN_CHANNEL_CAPACITY, STAGING_HASH_MAX_LEN};
use vfs_core::{
    extension_of, is_canonical_hash_path, namespace_for_path, strip_extension, Error,
    HashRepository, Result, ScanEntry, ScanStats,
};

use crate::single_flight::SingleFlight;

/// Staging column width for extensions.
const STAGING_EXT_MAX_LEN: usize = 4;

/// Registers on-disk objects that follow the sharded layout.
#[derive(Clone)]
pub struct Scanner {
    hashes: Arc<dyn HashRepository>,
    root: PathBuf,
    namespaces: Vec<String>,
    flight: SingleFlight,
}

impl Scanner {
    pub fn new(hashes: Arc<dyn HashRepository>, root: impl Into<PathBuf>, namespaces: Vec<String>) -> Self {
        Self {
            hashes,
            root: root.into(),
            namespaces,
            flight: SingleFlight::new(),
        }
    }

    /// The guard that keeps scans exclusive.
    pub fn flight(&self) -> &SingleFlight {
        &self.flight
    }

    /// Walk the root and upsert every canonical object not yet registered.
    ///
    /// Fails with `AlreadyScanning` while another scan is running. Nothing is
    /// committed when either the walk or the load fails.
    pub async fn scan(&self) -> Result<ScanStats> {
        let _guard = self.flight.try_acquire()?;
        let start = Instant::now();

        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let root = self.root.clone();
        let namespaces = self.namespaces.clone();
        let producer = tokio::task::spawn_blocking(move || walk(&root, &namespaces, &tx));

        let loaded = self.hashes.bulk_load(rx).await;
        let walked = producer
            .await
            .map_err(|e| Error::Internal(format!("scan walk failed: {e}")))?;

        let stats = loaded?;
        info!(
            subsystem = "jobs",
            component = "scanner",
            op = "scan",
            walked,
            scanned = stats.scanned,
            added = stats.added,
            upsert_ms = stats.upsert_duration.as_millis() as u64,
            duration_ms = start.elapsed().as_millis() as u64,
            "Scan completed"
        );
        Ok(stats.into())
    }
}

/// Walk `root` and send one entry per canonical object. Blocking.
///
/// Returns the number of regular files visited. Walk errors are forwarded
/// to the consumer and end the walk.
fn walk(root: &Path, namespaces: &[String], tx: &mpsc::Sender<Result<ScanEntry>>) -> u64 {
    let mut visited = 0u64;
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let _ = tx.blocking_send(Err(Error::Io(e.into())));
                return visited;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        visited += 1;

        let Some(rel) = entry
            .path()
            .strip_prefix(root)
            .ok()
            .and_then(Path::to_str)
            .map(|p| p.replace(std::path::MAIN_SEPARATOR, "/"))
        else {
            continue;
        };

        let size = match entry.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                let _ = tx.blocking_send(Err(Error::Io(e.into())));
                return visited;
            }
        };

        let Some(scan_entry) = scan_entry(namespaces, &rel, size) else {
            continue;
        };
        if tx.blocking_send(Ok(scan_entry)).is_err() {
            warn!(
                subsystem = "jobs",
                component = "scanner",
                "Bulk load stopped, ending walk"
            );
            return visited;
        }
    }
    visited
}

/// Entry for a path relative to the storage root, or None when the path is
/// not a managed object.
pub fn scan_entry(namespaces: &[String], rel: &str, size: u64) -> Option<ScanEntry> {
    let ns = namespace_for_path(namespaces, rel);
    if !is_canonical_hash_path(ns, rel) {
        return None;
    }

    let ext = extension_of(rel);
    if ext.len() > STAGING_EXT_MAX_LEN || !ext.bytes().all(|c| c.is_ascii_alphanumeric()) {
        debug!(
            subsystem = "jobs",
            component = "scanner",
            path = rel,
            "Skipping object with unsupported extension"
        );
        return None;
    }

    let stem = strip_extension(rel);
    let base = stem.rsplit('/').next().unwrap_or(stem);
    Some(ScanEntry {
        hash: base.chars().take(STAGING_HASH_MAX_LEN).collect(),
        namespace: ns.to_string(),
        file_size: i64::try_from(size).unwrap_or(i64::MAX),
        extension: ext.to_string(),
    })
}
