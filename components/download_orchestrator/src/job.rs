use media_downloader::MediaId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

/// Opaque job identifier handed out by `start_download`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Queued,
    Downloading,
    Converting,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Position in the lifecycle; both terminal states share the last step
    pub(crate) fn step(&self) -> u8 {
        match self {
            JobState::Queued => 0,
            JobState::Downloading => 1,
            JobState::Converting => 2,
            JobState::Completed | JobState::Failed => 3,
        }
    }

    /// Status string reported to clients. A queued job has not started
    /// yet but is reported as downloading at 0%.
    pub fn status(&self) -> &'static str {
        match self {
            JobState::Queued | JobState::Downloading => "downloading",
            JobState::Converting => "converting",
            JobState::Completed => "completed",
            JobState::Failed => "error",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Queued => "queued",
            JobState::Downloading => "downloading",
            JobState::Converting => "converting",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Resolution,
    /// The media is already in the library
    Duplicate { existing_file: String },
    Fetch,
    Transcode,
    Timeout,
    Cancelled,
    Io,
}

/// Why a job ended in [`JobState::Failed`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            format!("{:?} failure", kind)
        } else {
            message
        };
        Self { kind, message }
    }

    pub fn duplicate(existing_file: impl Into<String>) -> Self {
        let existing_file = existing_file.into();
        Self {
            message: format!("Already downloaded as {}", existing_file),
            kind: FailureKind::Duplicate { existing_file },
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "Download cancelled")
    }

    pub fn existing_file(&self) -> Option<&str> {
        match &self.kind {
            FailureKind::Duplicate { existing_file } => Some(existing_file),
            _ => None,
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Snapshot of one download job
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub url: Url,
    /// Known up front for URLs that probe, otherwise after resolution
    pub media_id: Option<MediaId>,
    pub title: Option<String>,
    pub state: JobState,
    /// Overall percentage, 0 to 100
    pub progress: f64,
    pub error: Option<JobFailure>,
    pub result_filename: Option<String>,
    pub(crate) finished_at: Option<Instant>,
}

impl Job {
    pub(crate) fn new(id: JobId, url: Url, media_id: Option<MediaId>) -> Self {
        Self {
            id,
            url,
            media_id,
            title: None,
            state: JobState::Queued,
            progress: 0.0,
            error: None,
            result_filename: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }
}
