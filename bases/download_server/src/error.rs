// bases/download_server/src/error.rs
//! Mapping of orchestrator errors onto JSON error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use download_orchestrator::OrchestratorError;
use media_library::LibraryError;
use serde::Serialize;
use tracing::error;

const DUPLICATE_MESSAGE: &str = "This video has already been downloaded!";

/// Error returned by every JSON handler
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    existing_file: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    existing_file: Option<&'a str>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            existing_file: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::InvalidUrl { .. } => Self::bad_request(err.to_string()),
            OrchestratorError::Resolution(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            OrchestratorError::Duplicate { existing_file } => Self {
                status: StatusCode::CONFLICT,
                message: DUPLICATE_MESSAGE.to_string(),
                existing_file: Some(existing_file),
            },
            OrchestratorError::JobNotFound(_) => Self::not_found("Download not found"),
            OrchestratorError::Library(LibraryError::NotFound(_)) => {
                Self::not_found("File not found")
            }
            OrchestratorError::Library(LibraryError::InvalidFilename(_)) => {
                Self::bad_request(err.to_string())
            }
            // The index no longer lists the file but it is still on disk
            OrchestratorError::Library(LibraryError::PartialRemoval { ref filename, .. }) => {
                Self::internal(format!(
                    "{} was removed from the library but could not be deleted from disk",
                    filename
                ))
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            error!("Request failed: {}", self.message);
        }

        let body = ErrorBody {
            success: false,
            error: &self.message,
            existing_file: self.existing_file.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_downloader::DownloadError;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case(OrchestratorError::invalid_url("x", "relative URL without a base"), StatusCode::BAD_REQUEST)]
    #[case(
        OrchestratorError::Resolution(DownloadError::ResolutionFailed("private video".into())),
        StatusCode::UNPROCESSABLE_ENTITY
    )]
    #[case(OrchestratorError::Duplicate { existing_file: "a.mp3".into() }, StatusCode::CONFLICT)]
    #[case(OrchestratorError::JobNotFound("1".into()), StatusCode::NOT_FOUND)]
    #[case(OrchestratorError::Library(LibraryError::NotFound("a.mp3".into())), StatusCode::NOT_FOUND)]
    #[case(OrchestratorError::Library(LibraryError::InvalidFilename("../a".into())), StatusCode::BAD_REQUEST)]
    #[case(
        OrchestratorError::Library(LibraryError::PartialRemoval {
            filename: "a.mp3".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        }),
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    #[case(
        OrchestratorError::Timeout { operation: "metadata lookup", after: Duration::from_secs(60) },
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    fn test_status_mapping(#[case] err: OrchestratorError, #[case] expected: StatusCode) {
        assert_eq!(ApiError::from(err).status(), expected);
    }

    #[test]
    fn test_duplicate_carries_existing_file() {
        let err = ApiError::from(OrchestratorError::Duplicate {
            existing_file: "Song [youtube-abc].mp3".into(),
        });
        assert_eq!(err.existing_file.as_deref(), Some("Song [youtube-abc].mp3"));
        assert!(err.message.contains("already been downloaded"));
    }

    #[test]
    fn test_partial_removal_is_distinct_from_not_found() {
        let partial = ApiError::from(OrchestratorError::Library(LibraryError::PartialRemoval {
            filename: "Song [youtube-abc].mp3".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        }));
        let missing = ApiError::from(OrchestratorError::Library(LibraryError::NotFound(
            "Song [youtube-abc].mp3".into(),
        )));

        assert_eq!(partial.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert!(partial.message.contains("could not be deleted from disk"));
        assert!(partial.message.contains("Song [youtube-abc].mp3"));
        assert_ne!(partial.message, missing.message);
    }
}
