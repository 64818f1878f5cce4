//! Centralized default constants for the vfs storage service.
//!
//! **This module is the single source of truth** for shared default values.
//! Config structs in every crate fall back to these constants when the
//! corresponding environment variable is unset.

// =============================================================================
// NAMESPACES & LAYOUT
// =============================================================================

/// Public namespace as seen on the filesystem (objects live at the root).
pub const PUBLIC_NAMESPACE: &str = "";

/// Public namespace as stored in the metadata tables.
pub const DB_DEFAULT_NAMESPACE: &str = "default";

/// Extension applied when none is given or when `jpeg` is supplied.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Hex length of a content digest (md5).
pub const DIGEST_LEN: usize = 32;

/// Maximum digest length accepted by the bulk-load staging table.
pub const STAGING_HASH_MAX_LEN: usize = 40;

/// Length of a canonical relative path `X/YY/<digest>` without extension.
pub const CANONICAL_PATH_LEN: usize = 37;

/// Permissions applied to committed objects.
pub const FILE_MODE: u32 = 0o644;

/// Sentinel MIME type returned when magic bytes are not recognized.
pub const UNKNOWN_MIME_TYPE: &str = "application/octet-stream";

// =============================================================================
// FOLDER TREE
// =============================================================================

/// Immutable root folder id seeded by the initial migration.
pub const ROOT_FOLDER_ID: i32 = 1;

// =============================================================================
// STORAGE CONFIG
// =============================================================================

/// Default object root directory.
pub const VFS_PATH: &str = "testdata";

/// Public URL prefix of original objects.
pub const VFS_WEB_PATH: &str = "/media/";

/// Public URL prefix of rendered previews.
pub const VFS_PREVIEW_PATH: &str = "/media/small/";

/// Namespaces accepted besides the public one.
pub const VFS_NAMESPACES: &[&str] = &["items", "test"];

/// Accepted upload extensions.
pub const VFS_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Accepted sniffed MIME types.
pub const VFS_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif"];

/// Multipart field carrying the uploaded bytes.
pub const UPLOAD_FORM_NAME: &str = "file";

/// Length of the random salt appended to tree file names.
pub const SALT_LEN: usize = 8;

// =============================================================================
// SERVER
// =============================================================================

/// Default bind host.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default bind port.
pub const SERVER_PORT: u16 = 9999;

/// Maximum accepted upload body in bytes (32 MiB).
pub const MAX_UPLOAD_SIZE: u64 = 32 << 20;

/// Number of rendered previews kept in memory.
pub const PREVIEW_CACHE_SIZE: usize = 1024;

/// Preview raster width in pixels.
pub const PREVIEW_WIDTH: u32 = 32;

/// Preview height is capped at this multiple of the preview width.
pub const PREVIEW_MAX_ASPECT: u32 = 16;

/// Cache-Control header attached to previews.
pub const PREVIEW_CACHE_CONTROL: &str = "public, max-age=31536000";

// =============================================================================
// INDEXER
// =============================================================================

/// Rows claimed per indexing batch.
pub const INDEX_BATCH_SIZE: i64 = 64;

/// Interval between scheduler ticks in milliseconds.
pub const INDEX_INTERVAL_MS: u64 = 5_000;

/// Blurhash component counts (x, y).
pub const BLURHASH_COMPONENTS_X: u32 = 4;
pub const BLURHASH_COMPONENTS_Y: u32 = 3;

/// Bounded capacity of the scan producer/consumer channel.
pub const SCAN_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// DATABASE POOL
// =============================================================================

/// Maximum pool connections.
pub const POOL_MAX_CONNECTIONS: u32 = 20;

/// Minimum idle pool connections.
pub const POOL_MIN_CONNECTIONS: u32 = 2;

/// Seconds to wait for a connection before failing.
pub const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Seconds before an idle connection is closed.
pub const POOL_IDLE_TIMEOUT_SECS: u64 = 600;

/// Seconds before a connection is recycled.
pub const POOL_MAX_LIFETIME_SECS: u64 = 1800;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for file listings.
pub const PAGE_LIMIT: i64 = 50;

/// Upper bound on a single page.
pub const PAGE_LIMIT_MAX: i64 = 500;
