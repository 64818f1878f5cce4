//! Folder/file tree operations with root protection and move-cycle checks.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info, warn};

use vfs_core::defaults::{PUBLIC_NAMESPACE, ROOT_FOLDER_ID, SALT_LEN};
use vfs_core::{
    is_valid_physical_name, Error, File, FileRepository, Folder, FolderRepository,
    FolderWithChildren, ListFilesRequest, NewFile, PathMove, Result, Status,
};

use crate::object_store::{ObjectStore, StagedObject};

/// Folder tree service.
#[derive(Clone)]
pub struct FolderTree {
    folders: Arc<dyn FolderRepository>,
}

impl FolderTree {
    pub fn new(folders: Arc<dyn FolderRepository>) -> Self {
        Self { folders }
    }

    /// Existing, non-deleted folder or `NotFound`.
    pub async fn folder(&self, id: i32) -> Result<Folder> {
        self.folders
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("folder {id}")))
    }

    /// Reparent `id` under `destination_id`.
    ///
    /// Rejects the root, a self-move, unknown folders, and any destination
    /// inside the subtree of `id`. Only the parent pointer is written.
    pub async fn move_folder(&self, id: i32, destination_id: i32) -> Result<()> {
        if id == ROOT_FOLDER_ID || id == 0 || destination_id == 0 || id == destination_id {
            return Err(Error::InvalidInput(format!(
                "cannot move folder {id} to {destination_id}"
            )));
        }

        let folder = self.folder(id).await?;
        let destination = self.folder(destination_id).await?;

        if let Err(e) = self.folders.reparent(folder.id, destination.id).await {
            if matches!(e, Error::Conflict(_)) {
                debug!(
                    subsystem = "db",
                    component = "tree",
                    op = "move_folder",
                    folder_id = id,
                    destination_id,
                    "Rejected move into own subtree"
                );
            }
            return Err(e);
        }
        info!(
            subsystem = "db",
            component = "tree",
            op = "move_folder",
            folder_id = id,
            destination_id,
            "Folder moved"
        );
        Ok(())
    }

    /// Folder with its direct children.
    pub async fn folder_with_children(&self, id: i32) -> Result<FolderWithChildren> {
        let folder = self.folder(id).await?;
        let folders = self.folders.children(folder.id).await?;
        Ok(FolderWithChildren { folder, folders })
    }

    /// Chain from the root down to `id`.
    pub async fn branch(&self, id: i32) -> Result<Vec<Folder>> {
        let folder = self.folder(id).await?;
        self.folders.ancestors(folder.id).await
    }

    pub async fn create(&self, parent_id: i32, title: &str) -> Result<Folder> {
        let parent = self.folder(parent_id).await?;
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("folder title is empty".into()));
        }
        self.folders.create(parent.id, title).await
    }

    pub async fn rename(&self, id: i32, title: &str) -> Result<()> {
        let title = title.trim();
        if id == 0 || id == ROOT_FOLDER_ID || title.is_empty() {
            return Err(Error::InvalidInput(format!("cannot rename folder {id}")));
        }
        self.folder(id).await?;
        self.folders.rename(id, title).await
    }

    /// Soft delete.
    pub async fn delete(&self, id: i32) -> Result<()> {
        let folder = self.folder(id).await?;
        if folder.id == ROOT_FOLDER_ID {
            return Err(Error::InvalidInput("root folder cannot be deleted".into()));
        }
        self.folders.set_status(folder.id, Status::Deleted).await
    }

    pub async fn favorites(&self) -> Result<Vec<Folder>> {
        self.folders.favorites().await
    }

    pub async fn set_favorite(&self, id: i32, favorite: bool) -> Result<()> {
        if id == 0 || id == ROOT_FOLDER_ID {
            return Err(Error::InvalidInput(format!("folder {id} cannot be a favorite")));
        }
        self.folder(id).await?;
        self.folders.set_favorite(id, favorite).await
    }
}

/// Staged bytes plus the metadata a tree file is created with.
#[derive(Debug)]
pub struct TreeUpload {
    pub staged: StagedObject,
    /// Display title, usually the client file name without extension.
    pub title: String,
    /// Pixel size when the upload is a decodable image.
    pub dimensions: Option<(u32, u32)>,
    /// Append a random suffix to the stored name.
    pub salted: bool,
}

fn random_salt(len: usize) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Tree file service.
#[derive(Clone)]
pub struct FileTree {
    files: Arc<dyn FileRepository>,
    tree: FolderTree,
    store: ObjectStore,
}

impl FileTree {
    pub fn new(files: Arc<dyn FileRepository>, tree: FolderTree, store: ObjectStore) -> Self {
        Self { files, tree, store }
    }

    /// Page of files in a folder plus the folder's total matching count.
    pub async fn list(&self, req: &ListFilesRequest) -> Result<(Vec<File>, i64)> {
        self.tree.folder(req.folder_id).await?;
        let files = self.files.list(req).await?;
        let total = self
            .files
            .count(req.folder_id, req.search.as_deref())
            .await?;
        Ok((files, total))
    }

    pub async fn move_files(&self, ids: &[i32], destination_id: i32) -> Result<u64> {
        let folder = self.tree.folder(destination_id).await?;
        if ids.is_empty() {
            return Err(Error::InvalidInput("no file ids".into()));
        }
        self.files.move_to_folder(ids, folder.id).await
    }

    /// Soft delete.
    pub async fn delete_files(&self, ids: &[i32]) -> Result<u64> {
        if ids.is_empty() {
            return Err(Error::InvalidInput("no file ids".into()));
        }
        self.files.set_status(ids, Status::Deleted).await
    }

    pub async fn folder_of_file(&self, file_id: i32) -> Result<Folder> {
        if file_id == 0 {
            return Err(Error::InvalidInput("file id is required".into()));
        }
        let file = self
            .files
            .get(file_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file {file_id}")))?;
        self.tree.folder(file.folder_id).await
    }

    /// Folder of the file stored at `path`; only the last directory and the
    /// file name of `path` are matched (`.../202601/1_2.jpg`).
    pub async fn folder_of_path(&self, path: &str) -> Result<Folder> {
        let mut parts = path.trim_end_matches('/').rsplit('/');
        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(Error::InvalidInput("file path is required".into()));
        }
        let search = match parts.next() {
            Some(dir) if !dir.is_empty() => format!("{dir}/{name}"),
            _ => name.to_string(),
        };
        let file = self
            .files
            .find_by_path(&search)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file {search}")))?;
        self.tree.folder(file.folder_id).await
    }

    /// Rename a file on disk and in the metadata store together.
    pub async fn set_physical_name(&self, file_id: i32, name: &str) -> Result<()> {
        if file_id == 0 || name.is_empty() {
            return Err(Error::InvalidInput("file id and name are required".into()));
        }
        let file = self
            .files
            .get(file_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file {file_id}")))?;
        if !is_valid_physical_name(name) {
            return Err(Error::InvalidInput(format!("invalid file name: {name}")));
        }

        let new_path = match file.path.rfind('/') {
            Some(i) => format!("{}/{}", &file.path[..i], name),
            None => name.to_string(),
        };
        let to = self.store.file_path(PUBLIC_NAMESPACE, &new_path);
        if self.store.exists(&to).await? {
            return Err(Error::Conflict(format!("{new_path} already exists")));
        }

        let store = self.store.clone();
        let (old_path, moved_path) = (file.path.clone(), new_path.clone());
        let apply: PathMove = Box::pin(async move {
            store
                .move_file(PUBLIC_NAMESPACE, &old_path, &moved_path)
                .await
        });
        self.files.set_path(file.id, &new_path, apply).await?;

        info!(
            subsystem = "db",
            component = "tree",
            op = "set_physical_name",
            file_id,
            path = %new_path,
            "File renamed"
        );
        Ok(())
    }

    /// Store a staged upload as a file of `folder_id`.
    ///
    /// The file lands at `<yyyymm>/<folder>_<id>[_salt].<ext>` in the public
    /// namespace; the id is reserved before the move so it can appear in the
    /// name.
    pub async fn add_upload(&self, folder_id: i32, upload: TreeUpload) -> Result<File> {
        let folder = self.tree.folder(folder_id).await?;
        let id = self.files.next_id().await?;

        let salt = if upload.salted {
            format!("_{}", random_salt(SALT_LEN))
        } else {
            String::new()
        };
        let rel = format!(
            "{}/{}_{}{}.{}",
            Utc::now().format("%Y%m"),
            folder.id,
            id,
            salt,
            upload.staged.extension()
        );

        let mime_type = upload.staged.mime_type().to_string();
        let file_size = i32::try_from(upload.staged.size()).unwrap_or(i32::MAX);
        let dest = self
            .store
            .commit_at(PUBLIC_NAMESPACE, upload.staged, &rel)
            .await?;

        let inserted = self
            .files
            .insert(NewFile {
                id,
                folder_id: folder.id,
                title: upload.title,
                path: rel,
                width: upload.dimensions.and_then(|(w, _)| i32::try_from(w).ok()),
                height: upload.dimensions.and_then(|(_, h)| i32::try_from(h).ok()),
                mime_type,
                file_size,
            })
            .await;

        match inserted {
            Ok(file) => {
                debug!(
                    subsystem = "db",
                    component = "tree",
                    op = "add_upload",
                    file_id = file.id,
                    folder_id = folder.id,
                    path = %file.path,
                    "File stored"
                );
                Ok(file)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&dest).await {
                    warn!(path = %dest.display(), error = %rm, "tree: orphan file not removed");
                }
                Err(e)
            }
        }
    }
}
