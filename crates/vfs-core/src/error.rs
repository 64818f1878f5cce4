//! Error types for the vfs storage service.

use thiserror::Error;

/// Result type alias using vfs's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for vfs operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Namespace is neither public nor in the configured allow-list
    #[error("invalid namespace")]
    InvalidNamespace,

    /// Extension is not in the configured allow-list
    #[error("invalid extension")]
    InvalidExtension,

    /// Sniffed MIME type is not in the configured allow-list
    #[error("invalid mime type")]
    InvalidMimeType,

    /// A filesystem scan is already running in this process
    #[error("already scanning")]
    AlreadyScanning,

    /// Upload body exceeds the configured limit
    #[error("file size exceed {0} bytes")]
    PayloadTooLarge(u64),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation conflicts with current state (folder cycle, existing target)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding failed
    #[error("Image error: {0}")]
    Image(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors caused by caller input, validated before any write.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidNamespace
                | Error::InvalidExtension
                | Error::InvalidMimeType
                | Error::InvalidInput(_)
                | Error::PayloadTooLarge(_)
        )
    }

    /// True when the underlying cause is a missing file.
    pub fn is_not_found_io(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(e.to_string())
    }
}
