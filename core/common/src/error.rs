//! Common error types for omnistore.

use std::io;

use thiserror::Error;

/// Top-level error type for storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The key does not exist on the backend.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A copy or stream was interrupted part way.
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// A URL could not be signed.
    #[error("Signing error: {0}")]
    Signing(String),

    /// Opaque failure reported by the vendor transport.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backend configuration is invalid or incomplete.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backend an object belongs to has been dropped.
    #[error("Detached: {0}")]
    Detached(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Map an I/O error, turning `ErrorKind::NotFound` into [`Error::NotFound`].
    pub fn from_io(err: io::Error, context: impl AsRef<str>) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Error::NotFound(context.as_ref().to_string())
        } else {
            Error::Io(err)
        }
    }

    /// Whether this error means the key is absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
