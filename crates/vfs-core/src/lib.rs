//! # vfs-core
//!
//! Core types, traits, and content addressing for the vfs storage service.
//!
//! This crate provides the data model, the error taxonomy, the sharded
//! path layout, and the repository traits that the database, jobs, and API
//! crates build on.

pub mod defaults;
pub mod error;
pub mod file_safety;
pub mod fingerprint;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use file_safety::{
    detect_content_type, is_allowed_extension, is_allowed_mime_type, is_valid_physical_name,
    title_from_filename,
};
pub use fingerprint::{
    digest_bytes, extension_of, is_canonical_hash_path, namespace_for_path, normalize_extension,
    shard_dir, shard_path, strip_extension, ContentFingerprint, DigestWriter,
};
pub use models::*;
pub use traits::*;
