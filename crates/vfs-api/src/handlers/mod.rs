//! HTTP handlers for vfs-api.

pub mod files;
pub mod folders;
pub mod hashes;
pub mod health;
pub mod preview;
pub mod scan;
pub mod upload;
