//! Shared application state.

use std::sync::Arc;

use vfs_core::{FileRepository, FolderRepository, HashRepository};
use vfs_db::{
    Database, FileTree, FolderTree, MemoryFileRepository, MemoryFolderRepository,
    MemoryHashRepository, ObjectStore,
};
use vfs_jobs::{Indexer, IndexerConfig, Scanner, Scheduler};

use crate::config::{ServerConfig, StorageConfig};
use crate::services::PreviewCache;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub hashes: Arc<dyn HashRepository>,
    pub store: ObjectStore,
    pub folders: FolderTree,
    pub files: FileTree,
    pub scheduler: Arc<Scheduler>,
    pub previews: PreviewCache,
    pub storage: Arc<StorageConfig>,
    pub server: Arc<ServerConfig>,
    /// Present when backed by PostgreSQL; used by the health check.
    pub db: Option<Database>,
}

impl AppState {
    /// Wire services over the given repositories.
    pub fn new(
        hashes: Arc<dyn HashRepository>,
        folders: Arc<dyn FolderRepository>,
        files: Arc<dyn FileRepository>,
        server: ServerConfig,
        storage: StorageConfig,
        indexer: IndexerConfig,
    ) -> Self {
        let store = storage.object_store().with_max_size(server.max_upload_size);
        let tree = FolderTree::new(folders);
        let scheduler = Scheduler::new(
            Indexer::new(hashes.clone(), store.clone(), &indexer),
            Scanner::new(hashes.clone(), storage.path.clone(), storage.namespaces.clone()),
            indexer,
        );

        Self {
            previews: PreviewCache::new(hashes.clone(), server.preview_cache_size),
            files: FileTree::new(files, tree.clone(), store.clone()),
            folders: tree,
            hashes,
            store,
            scheduler: Arc::new(scheduler),
            storage: Arc::new(storage),
            server: Arc::new(server),
            db: None,
        }
    }

    /// State over the PostgreSQL repositories.
    pub fn with_database(
        db: Database,
        server: ServerConfig,
        storage: StorageConfig,
        indexer: IndexerConfig,
    ) -> Self {
        let mut state = Self::new(
            Arc::new(db.hashes.clone()),
            Arc::new(db.folders.clone()),
            Arc::new(db.files.clone()),
            server,
            storage,
            indexer,
        );
        state.db = Some(db);
        state
    }

    /// State over fresh in-memory repositories.
    pub fn in_memory(server: ServerConfig, storage: StorageConfig, indexer: IndexerConfig) -> Self {
        Self::new(
            Arc::new(MemoryHashRepository::new()),
            Arc::new(MemoryFolderRepository::new()),
            Arc::new(MemoryFileRepository::new()),
            server,
            storage,
            indexer,
        )
    }
}
