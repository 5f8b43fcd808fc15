//! Errors surfaced by the orchestrator's entry points.
//!
//! Failures inside a running job never come back through these; they are
//! stored on the job as a [`crate::JobFailure`].

use media_downloader::DownloadError;
use media_library::LibraryError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("could not resolve media: {0}")]
    Resolution(#[source] DownloadError),

    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("already downloaded as {existing_file}")]
    Duplicate { existing_file: String },

    #[error("download job not found: {0}")]
    JobNotFound(String),

    #[error(transparent)]
    Library(#[from] LibraryError),
}

impl OrchestratorError {
    pub fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        OrchestratorError::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn existing_file(&self) -> Option<&str> {
        match self {
            OrchestratorError::Duplicate { existing_file } => Some(existing_file),
            _ => None,
        }
    }

    /// True for unknown jobs and missing library files
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OrchestratorError::JobNotFound(_) | OrchestratorError::Library(LibraryError::NotFound(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
