//! Fixed-interval indexing scheduler.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use vfs_core::{Error, Result, ScanStats};

use crate::config::IndexerConfig;
use crate::indexer::Indexer;
use crate::scanner::Scanner;
use crate::single_flight::SingleFlight;

/// Handle for a running ticker.
struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the indexing ticker and the scan guard of one process.
pub struct Scheduler {
    indexer: Indexer,
    scanner: Scanner,
    config: IndexerConfig,
    handle: Mutex<Option<SchedulerHandle>>,
}

impl Scheduler {
    pub fn new(indexer: Indexer, scanner: Scanner, config: IndexerConfig) -> Self {
        Self {
            indexer,
            scanner,
            config,
            handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Run a bulk ingest scan. Fails fast with `AlreadyScanning`.
    pub async fn scan(&self) -> Result<ScanStats> {
        self.scanner.scan().await
    }

    /// The guard held while a scan runs.
    pub fn scan_flight(&self) -> &SingleFlight {
        self.scanner.flight()
    }

    /// Process one batch outside the ticker.
    pub async fn process_queue(&self) -> Result<usize> {
        self.indexer.process_queue().await
    }

    /// Start ticking. Returns false when disabled or already running.
    pub async fn start(&self) -> bool {
        if !self.config.enabled {
            info!("Index scheduler is disabled, not starting");
            return false;
        }

        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            debug!("Index scheduler already running");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(run(
            self.indexer.clone(),
            self.config.workers.max(1),
            Duration::from_millis(self.config.interval_ms),
            shutdown_rx,
        ));
        *handle = Some(SchedulerHandle { shutdown_tx, task });
        true
    }

    pub async fn is_running(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Stop ticking and wait for in-flight batches to finish.
    pub async fn stop(&self) -> Result<()> {
        let Some(handle) = self.handle.lock().await.take() else {
            return Ok(());
        };
        handle
            .shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        handle
            .task
            .await
            .map_err(|e| Error::Internal(format!("Index scheduler task failed: {e}")))
    }
}

async fn run(indexer: Indexer, workers: usize, interval: Duration, mut shutdown_rx: mpsc::Receiver<()>) {
    info!(
        interval_ms = interval.as_millis() as u64,
        workers,
        "Index scheduler started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Index scheduler received shutdown signal");
                break;
            }
            _ = sleep(interval) => {}
        }
        tick(&indexer, workers).await;
    }

    info!("Index scheduler stopped");
}

/// Launch `workers` independent batches and wait for all of them.
async fn tick(indexer: &Indexer, workers: usize) {
    let mut tasks = JoinSet::new();
    for worker in 0..workers {
        let indexer = indexer.clone();
        tasks.spawn(async move { (worker, indexer.process_queue().await) });
    }

    while let Some(result) = tasks.join_next().await {
        match result {
            Ok((worker, Ok(rows))) if rows > 0 => {
                debug!(worker, rows, "Index worker finished batch");
            }
            Ok((_, Ok(_))) => {}
            Ok((worker, Err(e))) => {
                warn!(worker, error = %e, "Index worker failed");
            }
            Err(e) => {
                error!(error = ?e, "Index worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use image::{Rgb, RgbImage};
    use tempfile::TempDir;
    use vfs_core::{digest_bytes, shard_path, HashRepository};
    use vfs_db::{MemoryHashRepository, ObjectStore};

    fn scheduler(dir: &TempDir, repo: Arc<MemoryHashRepository>, config: IndexerConfig) -> Scheduler {
        let store = ObjectStore::new(dir.path());
        let indexer = Indexer::new(repo.clone(), store, &config);
        let scanner = Scanner::new(repo, dir.path(), vec!["test".into()]);
        Scheduler::new(indexer, scanner, config)
    }

    fn put_image(dir: &TempDir, digest: &str) {
        let path = dir.path().join(format!("{}.png", shard_path(digest)));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(6, 4, Rgb([1, 2, 3])).save(&path).unwrap();
    }

    #[tokio::test]
    async fn test_disabled_scheduler_does_not_start() {
        let dir = TempDir::new().unwrap();
        let s = scheduler(
            &dir,
            Arc::new(MemoryHashRepository::new()),
            IndexerConfig::default().with_enabled(false),
        );
        assert!(!s.start().await);
        assert!(!s.is_running().await);
        s.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_joins() {
        let dir = TempDir::new().unwrap();
        let s = scheduler(
            &dir,
            Arc::new(MemoryHashRepository::new()),
            IndexerConfig::default().with_enabled(true).with_interval(10),
        );
        assert!(s.start().await);
        assert!(!s.start().await);
        assert!(s.is_running().await);

        s.stop().await.unwrap();
        assert!(!s.is_running().await);
        assert!(s.start().await);
        s.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_ticks_index_scanned_objects() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(MemoryHashRepository::new());
        let digests: Vec<String> = (0..5u8).map(|i| digest_bytes(&[i])).collect();
        for d in &digests {
            put_image(&dir, d);
        }

        let s = scheduler(
            &dir,
            repo.clone(),
            IndexerConfig::default()
                .with_enabled(true)
                .with_workers(2)
                .with_batch_size(2)
                .with_interval(10),
        );
        let stats = s.scan().await.unwrap();
        assert_eq!(stats.added, 5);

        s.start().await;
        for _ in 0..200 {
            if repo.records().iter().all(|r| r.indexed_at.is_some()) {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        s.stop().await.unwrap();

        for d in &digests {
            let row = repo.get(d, "default").await.unwrap().unwrap();
            assert!(row.is_indexed(), "{d}");
            assert_eq!((row.width, row.height), (6, 4));
        }
    }
}
