//! Indexer and scheduler configuration.

use vfs_core::defaults::{INDEX_BATCH_SIZE, INDEX_INTERVAL_MS};

/// Configuration for the indexing scheduler.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Whether the scheduler ticks at all.
    pub enabled: bool,
    /// Compute the perceptual fingerprint while indexing.
    pub blurhash: bool,
    /// Concurrent batches launched per tick.
    pub workers: usize,
    /// Rows claimed per batch.
    pub batch_size: i64,
    /// Tick interval in milliseconds.
    pub interval_ms: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            blurhash: true,
            workers: default_workers(),
            batch_size: INDEX_BATCH_SIZE,
            interval_ms: INDEX_INTERVAL_MS,
        }
    }
}

impl IndexerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `INDEX_ENABLED` | `false` | Run the indexing scheduler |
    /// | `INDEX_BLURHASH` | `true` | Compute blurhash for indexed images |
    /// | `INDEX_WORKERS` | half the CPUs | Batches per tick |
    /// | `INDEX_BATCH_SIZE` | `64` | Rows claimed per batch |
    /// | `INDEX_INTERVAL_MS` | `5000` | Tick interval |
    pub fn from_env() -> Self {
        let enabled = std::env::var("INDEX_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let blurhash = std::env::var("INDEX_BLURHASH")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let workers = std::env::var("INDEX_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or_else(default_workers)
            .max(1);

        let batch_size = std::env::var("INDEX_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(INDEX_BATCH_SIZE)
            .max(1);

        let interval_ms = std::env::var("INDEX_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(INDEX_INTERVAL_MS);

        Self {
            enabled,
            blurhash,
            workers,
            batch_size,
            interval_ms,
        }
    }

    /// Enable or disable the scheduler.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Enable or disable blurhash computation.
    pub fn with_blurhash(mut self, blurhash: bool) -> Self {
        self.blurhash = blurhash;
        self
    }

    /// Set batches per tick.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set rows claimed per batch.
    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the tick interval.
    pub fn with_interval(mut self, ms: u64) -> Self {
        self.interval_ms = ms;
        self
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexer_config_default() {
        let config = IndexerConfig::default();
        assert!(!config.enabled);
        assert!(config.blurhash);
        assert!(config.workers >= 1);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.interval_ms, 5000);
    }

    #[test]
    fn test_indexer_config_builder() {
        let config = IndexerConfig::default()
            .with_enabled(true)
            .with_blurhash(false)
            .with_workers(3)
            .with_batch_size(10)
            .with_interval(250);

        assert!(config.enabled);
        assert!(!config.blurhash);
        assert_eq!(config.workers, 3);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.interval_ms, 250);
    }

    #[test]
    fn test_default_workers_at_least_one() {
        assert!(default_workers() >= 1);
    }
}
