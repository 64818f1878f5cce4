//! # vfs-db
//!
//! PostgreSQL metadata store and filesystem object store for vfs.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for hash records, folders, and files
//! - The staging-table bulk load and skip-locked batch claiming
//! - In-memory repository variants for tests
//! - The sharded filesystem object store and the folder/file tree services
//!
//! ## Example
//!
//! ```rust,ignore
//! use vfs_db::{Database, HashRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/vfs").await?;
//!     let record = db.hashes.get("64a9f060983200709061894cc5f69f83", "default").await?;
//!     println!("{record:?}");
//!     Ok(())
//! }
//! ```

pub mod files;
pub mod folders;
pub mod hashes;
pub mod memory;
pub mod object_store;
pub mod pool;
pub mod test_fixtures;
pub mod tree;

pub use files::PgFileRepository;
pub use folders::PgFolderRepository;
pub use hashes::{PgClaimedBatch, PgHashRepository};
pub use memory::{MemoryFileRepository, MemoryFolderRepository, MemoryHashRepository};
pub use object_store::{ObjectStore, StagedObject, StoredObject};
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use tree::{FileTree, FolderTree, TreeUpload};

// Re-export core types for convenience
pub use vfs_core::*;

use sqlx::PgPool;

/// Database handle with all PostgreSQL repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: PgPool,
    /// Hash-addressed object metadata.
    pub hashes: PgHashRepository,
    /// Folder tree.
    pub folders: PgFolderRepository,
    /// Tree-organized files.
    pub files: PgFileRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            hashes: PgHashRepository::new(pool.clone()),
            folders: PgFolderRepository::new(pool.clone()),
            files: PgFileRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
