//! Server and storage configuration.

use std::path::PathBuf;

use vfs_core::defaults::{
    MAX_UPLOAD_SIZE, PREVIEW_CACHE_SIZE, SERVER_HOST, SERVER_PORT, UPLOAD_FORM_NAME, VFS_EXTENSIONS,
    VFS_MIME_TYPES, VFS_NAMESPACES, VFS_PATH, VFS_PREVIEW_PATH, VFS_WEB_PATH,
};
use vfs_core::{shard_path, Error, Result};
use vfs_db::ObjectStore;

/// HTTP listener and database settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Upload body limit in bytes.
    pub max_upload_size: u64,
    /// Rendered previews kept in memory.
    pub preview_cache_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: SERVER_HOST.to_string(),
            port: SERVER_PORT,
            database_url: "postgres://localhost/vfs".to_string(),
            max_upload_size: MAX_UPLOAD_SIZE,
            preview_cache_size: PREVIEW_CACHE_SIZE,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HOST` | `0.0.0.0` | Listen address |
    /// | `PORT` | `9999` | Listen port |
    /// | `DATABASE_URL` | `postgres://localhost/vfs` | Metadata store |
    /// | `MAX_UPLOAD_SIZE` | `33554432` | Upload limit in bytes |
    /// | `PREVIEW_CACHE_SIZE` | `1024` | Cached previews |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            max_upload_size: std::env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_upload_size),
            preview_cache_size: std::env::var("PREVIEW_CACHE_SIZE")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(defaults.preview_cache_size)
                .max(1),
        }
    }

    pub fn with_max_upload_size(mut self, bytes: u64) -> Self {
        self.max_upload_size = bytes;
        self
    }

    pub fn with_preview_cache_size(mut self, entries: usize) -> Self {
        self.preview_cache_size = entries;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Object root, allow-lists and public URL layout.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub web_path: String,
    pub preview_path: String,
    pub namespaces: Vec<String>,
    pub extensions: Vec<String>,
    pub mime_types: Vec<String>,
    /// Append a random suffix to tree file names.
    pub salted_filenames: bool,
    /// Start even when `path` does not exist yet.
    pub skip_folder_verify: bool,
    pub upload_form_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(VFS_PATH),
            web_path: VFS_WEB_PATH.to_string(),
            preview_path: VFS_PREVIEW_PATH.to_string(),
            namespaces: to_strings(VFS_NAMESPACES),
            extensions: to_strings(VFS_EXTENSIONS),
            mime_types: to_strings(VFS_MIME_TYPES),
            salted_filenames: false,
            skip_folder_verify: false,
            upload_form_name: UPLOAD_FORM_NAME.to_string(),
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `VFS_PATH` | `testdata` |
    /// | `VFS_WEB_PATH` | `/media/` |
    /// | `VFS_PREVIEW_PATH` | `/media/small/` |
    /// | `VFS_NAMESPACES` | `items,test` |
    /// | `VFS_EXTENSIONS` | `jpg,jpeg,png,gif` |
    /// | `VFS_MIME_TYPES` | `image/jpeg,image/png,image/gif` |
    /// | `VFS_SALTED_FILENAMES` | `false` |
    /// | `VFS_SKIP_FOLDER_VERIFY` | `false` |
    /// | `VFS_UPLOAD_FORM_NAME` | `file` |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let flag = |name: &str| {
            std::env::var(name)
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false)
        };
        let list = |name: &str, default: Vec<String>| {
            std::env::var(name)
                .ok()
                .map(|v| parse_list(&v))
                .unwrap_or(default)
        };

        Self {
            path: std::env::var("VFS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            web_path: std::env::var("VFS_WEB_PATH").unwrap_or(defaults.web_path),
            preview_path: std::env::var("VFS_PREVIEW_PATH").unwrap_or(defaults.preview_path),
            namespaces: list("VFS_NAMESPACES", defaults.namespaces),
            extensions: list("VFS_EXTENSIONS", defaults.extensions),
            mime_types: list("VFS_MIME_TYPES", defaults.mime_types),
            salted_filenames: flag("VFS_SALTED_FILENAMES"),
            skip_folder_verify: flag("VFS_SKIP_FOLDER_VERIFY"),
            upload_form_name: std::env::var("VFS_UPLOAD_FORM_NAME")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.upload_form_name),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_salted_filenames(mut self, salted: bool) -> Self {
        self.salted_filenames = salted;
        self
    }

    /// Fail unless the object root exists (or verification is skipped).
    pub fn verify(&self) -> Result<()> {
        if self.skip_folder_verify || self.path.is_dir() {
            return Ok(());
        }
        Err(Error::Config(format!(
            "storage path {} does not exist",
            self.path.display()
        )))
    }

    /// Object store over this root and these allow-lists.
    pub fn object_store(&self) -> ObjectStore {
        ObjectStore::new(self.path.clone())
            .with_namespaces(self.namespaces.iter().cloned())
            .with_extensions(self.extensions.iter().cloned())
            .with_mime_types(self.mime_types.iter().cloned())
    }

    /// Public URL of a hash object: `webPath/ns/[type/]X/YY/hash.ext`.
    pub fn web_hash_path(&self, ns: &str, media_type: &str, rel_path: &str) -> String {
        join_url(&[&self.web_path, ns, media_type, rel_path])
    }

    /// `X/YY/<digest>.<ext>` for a digest that may be shorter than a real one.
    pub fn rel_hash_path(digest: &str, ext: &str) -> String {
        format!("{}.{}", shard_path(digest), vfs_core::normalize_extension(ext))
    }
}

/// Join URL segments, skipping empty ones and collapsing duplicate slashes.
fn join_url(parts: &[&str]) -> String {
    let segments: Vec<&str> = parts
        .iter()
        .flat_map(|p| p.split('/'))
        .filter(|s| !s.is_empty())
        .collect();
    let rooted = parts.first().is_some_and(|p| p.starts_with('/'));
    let joined = segments.join("/");
    if rooted {
        format!("/{joined}")
    } else {
        joined
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
