//! Error types for container access.

use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by a decoder backend.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// I/O error while reading the container
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The container path does not exist or cannot be opened as a container
    #[error("Container not found: {path:?}")]
    FileNotFound {
        /// Path that was requested
        path: PathBuf,
    },

    /// Corrupt record, invalid handle or otherwise unreadable content
    #[error("Malformed container data: {message}")]
    Malformed {
        /// Description of the problem
        message: String,
    },

    /// A record stored in an element type this crate cannot represent
    #[error("Unsupported element type in {path:?}")]
    UnsupportedType {
        /// File holding the record
        path: PathBuf,
    },
}

impl DecodeError {
    /// Create a malformed-data error with a message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create a file-not-found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }
}

/// Outcome of attaching to a named record inside an open session.
///
/// `NotFound` is what drives the fallback from the SD interface to the VS
/// interface; every other failure is carried in `Decode`.
#[derive(Error, Debug)]
pub enum AttachError {
    /// No record with this name exists in the session
    #[error("Record not found: {name}")]
    NotFound {
        /// The requested record name
        name: String,
    },

    /// Any other decoder failure
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl AttachError {
    /// Create a not-found error for `name`.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }
}

/// Errors returned by [`Container`](crate::Container).
#[derive(Error, Debug)]
pub enum Error {
    /// The name resolves in neither the SD nor the VS interface
    #[error("Nonexistent data set: {name}")]
    DatasetNotFound {
        /// The requested dataset name
        name: String,
    },

    /// Decoder failure, passed through unchanged
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl Error {
    /// Create a dataset-not-found error for `name`.
    pub fn dataset_not_found(name: impl Into<String>) -> Self {
        Self::DatasetNotFound { name: name.into() }
    }

    /// Whether this is a [`Error::DatasetNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::DatasetNotFound { .. })
    }
}

/// Convenience alias for container results.
pub type Result<T, E = Error> = std::result::Result<T, E>;
