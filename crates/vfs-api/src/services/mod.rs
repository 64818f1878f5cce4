//! Services shared by the HTTP handlers.

pub mod preview_cache;

pub use preview_cache::{PreviewCache, PreviewEntry};
