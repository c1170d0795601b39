//! Error types for the download core
//!
//! [`JobError`] covers one attempt of one song; [`ErrorKind`] is what the
//! retry loop and the failure log reason about. [`DownloadError`] is
//! reserved for failures that end the whole batch.

use bridge_traits::catalog::{CatalogError, CollectionKind};
use bridge_traits::error::BridgeError;
use core_metadata::MetadataError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure taxonomy shared by job outcomes and failure-log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Transport,
    Malformed,
    RightsRestricted,
    IntegrityMismatch,
    TagError,
    NotFound,
    Unauthorized,
    Io,
    CollectionExpansionError,
    /// A worker task died without producing an outcome.
    Internal,
}

impl ErrorKind {
    /// Whether another attempt may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Transport | ErrorKind::Malformed | ErrorKind::IntegrityMismatch
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "Transport",
            ErrorKind::Malformed => "Malformed",
            ErrorKind::RightsRestricted => "RightsRestricted",
            ErrorKind::IntegrityMismatch => "IntegrityMismatch",
            ErrorKind::TagError => "TagError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Io => "Io",
            ErrorKind::CollectionExpansionError => "CollectionExpansionError",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single job attempt.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The audio stream could not be opened or broke off mid-body.
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Integrity mismatch: expected {expected} bytes, wrote {actual}")]
    IntegrityMismatch { expected: u64, actual: u64 },

    #[error("Tag injection failed: {0}")]
    Tag(#[from] MetadataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Catalog(error) => match error {
                CatalogError::NotFound(_) => ErrorKind::NotFound,
                CatalogError::Unauthorized(_) => ErrorKind::Unauthorized,
                CatalogError::Malformed(_) => ErrorKind::Malformed,
                CatalogError::Transport(_) => ErrorKind::Transport,
                CatalogError::RightsRestricted(_) => ErrorKind::RightsRestricted,
                CatalogError::CollectionExpansion(_) => ErrorKind::CollectionExpansionError,
            },
            JobError::Stream(_) => ErrorKind::Transport,
            JobError::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            JobError::Tag(_) => ErrorKind::TagError,
            JobError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<BridgeError> for JobError {
    fn from(error: BridgeError) -> Self {
        JobError::Stream(error.to_string())
    }
}

/// Batch-level failures; these abort the run.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Failed to expand {kind} {id}: {source}")]
    Expansion {
        kind: CollectionKind,
        id: String,
        #[source]
        source: CatalogError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DownloadError>;
