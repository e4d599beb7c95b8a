// src/error.rs

//! Crate-wide error type
//!
//! Transfer operations surface every failure through [`Error`]. Operations that
//! are idempotent by contract (existence checks, recursive deletes) do not use
//! errors to signal absence; they return `bool` or [`crate::remote::Removal`].

use std::fmt;
use thiserror::Error;

/// Which remote backend produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Object store (S3)
    ObjectStore,
    /// Agency directory server (SFTP)
    Directory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectStore => write!(f, "S3"),
            Self::Directory => write!(f, "SFTP"),
        }
    }
}

/// Errors raised by the lifecycle and transfer engine
#[derive(Error, Debug)]
pub enum Error {
    /// A file or remote path does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// No package matches the requested name
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    /// Missing or invalid configuration (bucket, credentials, hosts)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Opaque failure reported by a remote backend
    #[error("{backend} error: {message}")]
    BackendError { backend: Backend, message: String },

    /// Download produced an empty package after filtering
    #[error("No files downloaded from {0}")]
    NoFilesDownloaded(String),

    /// A glob pattern could not be compiled
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Packing or unpacking an archive failed
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// Local filesystem failure with context
    #[error("I/O error: {0}")]
    IoError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for an object store failure
    pub fn s3(message: impl Into<String>) -> Self {
        Self::BackendError {
            backend: Backend::ObjectStore,
            message: message.into(),
        }
    }

    /// Shorthand for a directory server failure
    pub fn sftp(message: impl Into<String>) -> Self {
        Self::BackendError {
            backend: Backend::Directory,
            message: message.into(),
        }
    }

    /// True for the "does not exist" family of errors
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::PackageNotFound(_))
    }
}

/// Result alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;
