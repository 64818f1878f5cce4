//! # vfs-jobs
//!
//! Background work for vfs.
//!
//! This crate provides:
//! - The bulk ingest scan (filesystem walk feeding the staging-table load)
//! - The indexing work queue (dimensions and blurhash per claimed row)
//! - Image header, blurhash and preview rendering helpers
//! - The fixed-interval scheduler that drives indexing
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vfs_db::{Database, ObjectStore};
//! use vfs_jobs::{Indexer, IndexerConfig, Scanner, Scheduler};
//!
//! let db = Database::connect("postgres://...").await?;
//! let hashes = Arc::new(db.hashes.clone());
//! let store = ObjectStore::new("testdata");
//! let config = IndexerConfig::from_env();
//!
//! let scheduler = Scheduler::new(
//!     Indexer::new(hashes.clone(), store, &config),
//!     Scanner::new(hashes, "testdata", vec!["items".into()]),
//!     config,
//! );
//! scheduler.start().await;
//! let stats = scheduler.scan().await?;
//! scheduler.stop().await?;
//! ```

pub mod config;
pub mod imaging;
pub mod indexer;
pub mod scanner;
pub mod scheduler;
pub mod single_flight;

pub use config::IndexerConfig;
pub use imaging::{analyze, preview_height, read_dimensions, render_preview, ImageInfo};
pub use indexer::{IndexError, Indexer};
pub use scanner::Scanner;
pub use scheduler::Scheduler;
pub use single_flight::{SingleFlight, SingleFlightGuard};
