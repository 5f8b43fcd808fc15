//! Library error types
//!
//! Removal distinguishes "nothing there" (`Ok(false)` from
//! [`crate::LibraryStore::remove`]) from a partial failure where the index
//! entry is gone but the file is still on disk.

use media_downloader::MediaId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),

    /// The media is already in the library under `existing`
    #[error("{filename} conflicts with library file {existing}")]
    Conflict { filename: String, existing: String },

    /// The filename is in use by a different media
    #[error("{filename} is already used by another media")]
    FilenameTaken {
        filename: String,
        owner: Option<MediaId>,
    },

    #[error("removed {filename} from the library but could not delete the file")]
    PartialRemoval {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error during {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("library index at {path} is unreadable")]
    Index {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LibraryError {
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        LibraryError::Io {
            operation: operation.into(),
            source,
        }
    }

    /// The library file that won a registration race, if this is a conflict
    pub fn conflicting_file(&self) -> Option<&str> {
        match self {
            LibraryError::Conflict { existing, .. } => Some(existing),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
