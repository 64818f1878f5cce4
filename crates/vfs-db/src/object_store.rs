//! Filesystem object store.
//!
//! Objects live under `<root>/<namespace>/X/YY/<digest>.<ext>`; the public
//! namespace is the root itself. Uploads are hashed while they are copied
//! into a temp file created inside the root, so that committing is a
//! same-volume rename.
//!
//! ## Example
//!
//! ```rust,ignore
//! use vfs_db::ObjectStore;
//!
//! let store = ObjectStore::new("/var/vfs")
//!     .with_namespaces(["items"])
//!     .with_extensions(["jpg", "png"])
//!     .with_mime_types(["image/jpeg", "image/png"]);
//! let staged = store.stage("items", "png", &bytes[..]).await?;
//! let stored = store.commit("items", staged).await?;
//! ```

use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use vfs_core::defaults::FILE_MODE;
use vfs_core::{
    detect_content_type, is_allowed_extension, is_allowed_mime_type, normalize_extension,
    ContentFingerprint, DigestWriter, Error, Result,
};

/// Bytes read per copy iteration.
const COPY_BUF_SIZE: usize = 64 * 1024;

/// Leading bytes kept for magic-byte sniffing.
const SNIFF_LEN: usize = 8192;

/// Upload written to a temp file inside the storage root, not yet committed.
///
/// Dropping it removes the temp file.
#[derive(Debug)]
pub struct StagedObject {
    temp: TempPath,
    digest: String,
    size: u64,
    mime_type: String,
    extension: String,
}

impl StagedObject {
    pub fn path(&self) -> &Path {
        &self.temp
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Normalized extension (`jpeg` and empty become `jpg`).
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

/// Committed hash-addressed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub fingerprint: ContentFingerprint,
    pub namespace: String,
    pub size: u64,
    pub mime_type: String,
    pub path: PathBuf,
}

/// Filesystem store for hash-addressed and tree-organized objects.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
    namespaces: Vec<String>,
    extensions: Vec<String>,
    mime_types: Vec<String>,
    /// Staging aborts once an upload exceeds this many bytes.
    max_size: Option<u64>,
}

impl ObjectStore {
    /// Create a store rooted at `root` with empty allow-lists.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            namespaces: Vec::new(),
            extensions: Vec::new(),
            mime_types: Vec::new(),
            max_size: None,
        }
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    pub fn with_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mime_types<I, S>(mut self, mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mime_types = mime_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// The public namespace is always valid.
    pub fn validate_namespace(&self, ns: &str) -> Result<()> {
        if ns.is_empty() || self.namespaces.iter().any(|n| n == ns) {
            Ok(())
        } else {
            Err(Error::InvalidNamespace)
        }
    }

    pub fn validate_extension(&self, ext: &str) -> Result<()> {
        if is_allowed_extension(&self.extensions, ext) {
            Ok(())
        } else {
            Err(Error::InvalidExtension)
        }
    }

    pub fn validate_mime_type(&self, mime: &str) -> Result<()> {
        if is_allowed_mime_type(&self.mime_types, mime) {
            Ok(())
        } else {
            Err(Error::InvalidMimeType)
        }
    }

    /// Directory of a namespace (the root for the public namespace).
    pub fn namespace_dir(&self, ns: &str) -> PathBuf {
        if ns.is_empty() {
            self.root.clone()
        } else {
            self.root.join(ns)
        }
    }

    /// Absolute path of a hash-addressed object.
    pub fn object_path(&self, ns: &str, fingerprint: &ContentFingerprint) -> PathBuf {
        self.namespace_dir(ns).join(fingerprint.rel_path())
    }

    /// Absolute path of a file relative to its namespace directory.
    pub fn file_path(&self, ns: &str, rel: &str) -> PathBuf {
        self.namespace_dir(ns).join(rel)
    }

    /// Validate namespace and extension, copy `reader` into a temp file
    /// while hashing it, then check the sniffed MIME type.
    ///
    /// A MIME rejection happens after the bytes are on disk; the temp file
    /// is discarded with the returned error.
    pub async fn stage<R>(&self, ns: &str, ext: &str, reader: R) -> Result<StagedObject>
    where
        R: AsyncRead + Unpin,
    {
        self.validate_namespace(ns)?;
        self.validate_extension(ext)?;

        let staged = self.write_temp(ext, reader).await?;
        if let Err(e) = self.validate_mime_type(&staged.mime_type) {
            debug!(
                subsystem = "storage",
                component = "object_store",
                op = "stage",
                mime_type = %staged.mime_type,
                "Rejected upload by sniffed MIME type"
            );
            return Err(e);
        }
        Ok(staged)
    }

    async fn write_temp<R>(&self, ext: &str, mut reader: R) -> Result<StagedObject>
    where
        R: AsyncRead + Unpin,
    {
        fs::create_dir_all(&self.root).await?;

        let named = tempfile::Builder::new()
            .prefix(".upload-")
            .tempfile_in(&self.root)?;
        let (std_file, temp) = named.into_parts();
        let mut file = fs::File::from_std(std_file);

        let mut hasher = DigestWriter::new();
        let mut head: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut written: u64 = 0;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            written += n as u64;
            if let Some(max) = self.max_size.filter(|max| written > *max) {
                return Err(Error::PayloadTooLarge(max));
            }
            let chunk = &buf[..n];
            hasher.update(chunk);
            if head.len() < SNIFF_LEN {
                let take = (SNIFF_LEN - head.len()).min(n);
                head.extend_from_slice(&chunk[..take]);
            }
            file.write_all(chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let (digest, size) = hasher.finish();
        Ok(StagedObject {
            temp,
            digest,
            size,
            mime_type: detect_content_type(&head),
            extension: normalize_extension(ext),
        })
    }

    /// Move a staged upload to its sharded path.
    ///
    /// Committing the same bytes twice lands on the same path.
    pub async fn commit(&self, ns: &str, staged: StagedObject) -> Result<StoredObject> {
        let fingerprint = ContentFingerprint::new(staged.digest.clone(), &staged.extension)?;
        let dest = self.object_path(ns, &fingerprint);
        let (size, mime_type) = (staged.size, staged.mime_type.clone());

        self.persist(staged, &dest).await?;

        debug!(
            subsystem = "storage",
            component = "object_store",
            op = "commit",
            hash = %fingerprint.digest(),
            namespace = ns,
            file_size = size,
            "Object committed"
        );

        Ok(StoredObject {
            fingerprint,
            namespace: ns.to_string(),
            size,
            mime_type,
            path: dest,
        })
    }

    /// Move a staged upload to `rel` inside the namespace directory.
    pub async fn commit_at(&self, ns: &str, staged: StagedObject, rel: &str) -> Result<PathBuf> {
        let dest = self.file_path(ns, rel);
        self.persist(staged, &dest).await?;
        Ok(dest)
    }

    async fn persist(&self, staged: StagedObject, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "object_store: create_dir_all failed");
                e
            })?;
        }

        fs::rename(&staged.temp, dest).await.map_err(|e| {
            warn!(from = %staged.temp.display(), to = %dest.display(), error = %e, "object_store: rename failed");
            e
        })?;
        // The path now names the committed object; it must outlive the guard.
        let _ = staged.temp.keep();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dest, std::fs::Permissions::from_mode(FILE_MODE)).await?;
        }

        sync_parent(dest).await
    }

    /// Rename a tree file inside a namespace, creating destination directories.
    pub async fn move_file(&self, ns: &str, old_rel: &str, new_rel: &str) -> Result<()> {
        let from = self.file_path(ns, old_rel);
        let to = self.file_path(ns, new_rel);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&from, &to).await.map_err(|e| {
            warn!(from = %from.display(), to = %to.display(), error = %e, "object_store: move failed");
            e
        })?;
        sync_parent(&to).await
    }

    /// Delete a hash-addressed object; missing objects are `NotFound`.
    pub async fn remove(&self, ns: &str, fingerprint: &ContentFingerprint) -> Result<()> {
        let path = self.object_path(ns, fingerprint);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("object {fingerprint}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }
}

/// Flush the directory entry of a freshly renamed file.
#[cfg(unix)]
async fn sync_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::File::open(parent).await?.sync_all().await?;
    }
    Ok(())
}

#[cfg(not(unix))]
async fn sync_parent(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::PNG_1X1;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ObjectStore {
        ObjectStore::new(dir.path())
            .with_namespaces(["items", "test"])
            .with_extensions(["jpg", "jpeg", "png", "gif"])
            .with_mime_types(["image/jpeg", "image/png", "image/gif"])
    }

    fn temp_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".upload-"))
            .count()
    }

    #[tokio::test]
    async fn test_commit_writes_sharded_path() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let staged = store.stage("items", "png", PNG_1X1).await.unwrap();
        assert_eq!(staged.mime_type(), "image/png");
        assert_eq!(staged.size(), PNG_1X1.len() as u64);

        let stored = store.commit("items", staged).await.unwrap();
        let digest = vfs_core::digest_bytes(PNG_1X1);
        assert_eq!(stored.fingerprint.digest(), digest);
        let expected = dir
            .path()
            .join("items")
            .join(format!("{}/{}/{}.png", &digest[..1], &digest[1..3], digest));
        assert_eq!(stored.path, expected);
        assert_eq!(std::fs::read(&expected).unwrap(), PNG_1X1);
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_commit_sets_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let staged = store.stage("", "png", PNG_1X1).await.unwrap();
        let stored = store.commit("", staged).await.unwrap();

        let mode = std::fs::metadata(&stored.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, FILE_MODE);
    }

    #[tokio::test]
    async fn test_identical_uploads_share_path() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let first = store
            .commit("", store.stage("", "png", PNG_1X1).await.unwrap())
            .await
            .unwrap();
        let second = store
            .commit("", store.stage("", "png", PNG_1X1).await.unwrap())
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_validation_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let err = store.stage("nope", "exe", PNG_1X1).await.unwrap_err();
        assert!(matches!(err, Error::InvalidNamespace));

        let err = store.stage("items", "exe", PNG_1X1).await.unwrap_err();
        assert!(matches!(err, Error::InvalidExtension));

        let err = store
            .stage("items", "png", &b"definitely not an image"[..])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMimeType));
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_jpeg_extension_normalized() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).with_mime_types(["application/octet-stream"]);
        let staged = store.stage("", "jpeg", &b"abc"[..]).await.unwrap();
        assert_eq!(staged.extension(), "jpg");
    }

    #[tokio::test]
    async fn test_wildcard_mime_type_accepts_any_content() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path())
            .with_extensions(["png", "txt"])
            .with_mime_types(["*"]);

        let staged = store.stage("", "png", PNG_1X1).await.unwrap();
        assert_eq!(staged.mime_type(), "image/png");

        let staged = store.stage("", "txt", &b"plain text"[..]).await.unwrap();
        assert_eq!(staged.mime_type(), vfs_core::defaults::UNKNOWN_MIME_TYPE);
    }

    #[tokio::test]
    async fn test_oversized_stream_is_rejected_while_copying() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).with_max_size(16);

        let err = store.stage("", "png", PNG_1X1).await.unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge(16)));
        assert_eq!(temp_files(dir.path()), 0);

        let store = store.with_max_size(PNG_1X1.len() as u64);
        assert!(store.stage("", "png", PNG_1X1).await.is_ok());
    }

    #[tokio::test]
    async fn test_move_file_creates_directories() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let staged = store.stage("items", "png", PNG_1X1).await.unwrap();
        store
            .commit_at("items", staged, "202601/1_1.png")
            .await
            .unwrap();

        store
            .move_file("items", "202601/1_1.png", "202602/2_1.png")
            .await
            .unwrap();
        assert!(dir.path().join("items/202602/2_1.png").exists());
        assert!(!dir.path().join("items/202601/1_1.png").exists());
    }

    #[tokio::test]
    async fn test_remove_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let fp = ContentFingerprint::new("64a9f060983200709061894cc5f69f83", "jpg").unwrap();
        assert!(matches!(
            store.remove("", &fp).await,
            Err(Error::NotFound(_))
        ));
    }
}
