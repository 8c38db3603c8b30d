//! Error types for transfer operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{Backend, Locator};

/// Errors that can occur while operating on a single item.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Source item does not exist.
    #[error("{path} not found")]
    NotFound { path: String },

    /// Target name is already taken.
    #[error("{path} already exists")]
    AlreadyExists { path: String },

    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: String },

    /// The backend cannot perform the requested operation.
    #[error("{operation} is not supported on {backend} storage")]
    Unsupported {
        backend: Backend,
        operation: &'static str,
    },

    /// No transport has been registered for a backend.
    #[error("No transport registered for {backend} storage")]
    NoTransport { backend: Backend },

    /// A busy/locked/timeout condition worth retrying.
    #[error("Transient I/O error at {path}: {source}")]
    TransientIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Credentials are missing or were rejected.
    #[error("Authentication required for {provider}: {message}")]
    AuthenticationRequired { provider: String, message: String },

    /// The requested name is not usable.
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Source and target are the same item, or the target lies inside the source.
    #[error("Cannot copy {path} into itself")]
    SelfTarget { path: String },

    /// A path is already inside a trash directory.
    #[error("{path} is already in the trash")]
    AlreadyTrashed { path: String },

    /// The copy landed but the source could not be removed afterwards.
    #[error("Failed to delete source {path} after copy: {source}")]
    SourceRetained {
        path: String,
        #[source]
        source: Box<TransferError>,
    },

    /// The operation was cancelled before this item started.
    #[error("Cancelled before {path} was processed")]
    Cancelled { path: String },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Other error reported by a backend.
    #[error("{message}")]
    Other { message: String },
}

impl TransferError {
    /// Create an I/O error with path context.
    pub fn io(path: impl ToString, source: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;

        let path = path.to_string();
        match source.kind() {
            Io::PermissionDenied => Self::PermissionDenied { path },
            Io::NotFound => Self::NotFound { path },
            Io::AlreadyExists => Self::AlreadyExists { path },
            Io::Interrupted | Io::WouldBlock | Io::TimedOut | Io::ResourceBusy => {
                Self::TransientIo { path, source }
            }
            _ => Self::Io { path, source },
        }
    }

    pub fn not_found(path: impl ToString) -> Self {
        Self::NotFound {
            path: path.to_string(),
        }
    }

    pub fn already_exists(path: impl ToString) -> Self {
        Self::AlreadyExists {
            path: path.to_string(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// The taxonomy bucket this error falls into.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::Unsupported { .. } | Self::NoTransport { .. } => ErrorKind::Unsupported,
            Self::TransientIo { .. } => ErrorKind::TransientIo,
            Self::AuthenticationRequired { .. } => ErrorKind::AuthenticationRequired,
            Self::InvalidName { .. } | Self::SelfTarget { .. } | Self::AlreadyTrashed { .. } => {
                ErrorKind::InvalidInput
            }
            Self::SourceRetained { source, .. } => source.kind(),
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Io { .. } | Self::Other { .. } => ErrorKind::Unknown,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientIo { .. })
    }
}

/// Error taxonomy shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    /// The backend does not support the operation (e.g. soft delete on SMB).
    Unsupported,
    /// Busy, locked or timed out; safe to retry.
    TransientIo,
    AuthenticationRequired,
    InvalidInput,
    Cancelled,
    Unknown,
}

/// A per-item failure, collected rather than raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    /// Name of the item that failed.
    pub file_name: String,
    /// The source locator.
    pub source: Locator,
    /// The destination locator, when the operation has one.
    pub destination: Option<Locator>,
    /// Taxonomy bucket.
    pub kind: ErrorKind,
    /// Full message, including the underlying cause.
    pub message: String,
}

impl FileError {
    /// Record `error` against `source` (and `destination` if any).
    pub fn new(source: &Locator, destination: Option<&Locator>, error: &TransferError) -> Self {
        Self {
            file_name: source.file_name(),
            source: source.clone(),
            destination: destination.cloned(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// An error that concerns the whole operation rather than one item.
    pub fn operation(source: &Locator, error: &TransferError) -> Self {
        Self::new(source, None, error)
    }
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.file_name, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_io() {
        let err = TransferError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, TransferError::PermissionDenied { .. }));

        let err = TransferError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"),
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_source_retained_keeps_cause() {
        let err = TransferError::SourceRetained {
            path: "/a/b.jpg".into(),
            source: Box::new(TransferError::PermissionDenied {
                path: "/a/b.jpg".into(),
            }),
        };
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        let message = err.to_string();
        assert!(message.contains("after copy"));
        assert!(message.contains("Permission denied"));
    }

    #[test]
    fn test_file_error_message() {
        let source = Locator::new("/photos/a.jpg");
        let err = FileError::new(&source, None, &TransferError::not_found("/photos/a.jpg"));
        assert_eq!(err.file_name, "a.jpg");
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.to_string(), "a.jpg: /photos/a.jpg not found");
    }
}
