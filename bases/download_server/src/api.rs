// bases/download_server/src/api.rs
//! JSON request and response bodies. Field names are what the web client reads.

use download_orchestrator::{InfoReport, Job, JobId};
use media_library::{LibraryEntry, LibraryStats};
use serde::{Deserialize, Serialize};
use time_primitives::{format_timestamp, local_time, unix_seconds};

#[derive(Debug, Deserialize)]
pub struct UrlRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub success: bool,
    pub title: String,
    pub uploader: String,
    /// `MM:SS` or `HH:MM:SS`
    pub duration: String,
    pub thumbnail: String,
    pub view_count: u64,
    pub already_downloaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_file: Option<String>,
}

impl From<InfoReport> for InfoResponse {
    fn from(report: InfoReport) -> Self {
        let already_downloaded = report.already_downloaded();
        let info = report.info;
        Self {
            success: true,
            title: info.title,
            uploader: info.uploader.unwrap_or_else(|| "Unknown".to_string()),
            duration: info.duration.to_string(),
            thumbnail: info.thumbnail_url.unwrap_or_default(),
            view_count: info.view_count.unwrap_or(0),
            already_downloaded,
            existing_file: report.existing_file,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StartedResponse {
    pub success: bool,
    pub download_id: JobId,
    pub message: &'static str,
}

impl StartedResponse {
    pub fn new(download_id: JobId) -> Self {
        Self {
            success: true,
            download_id,
            message: "Download started",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub status: &'static str,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_file: Option<String>,
}

impl From<&Job> for ProgressResponse {
    fn from(job: &Job) -> Self {
        Self {
            status: job.state.status(),
            progress: (job.progress * 10.0).round() / 10.0,
            title: job.title.clone(),
            filename: job.result_filename.clone(),
            error: job.error.as_ref().map(|e| e.message.clone()),
            existing_file: job
                .error
                .as_ref()
                .and_then(|e| e.existing_file())
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DownloadItem {
    pub filename: String,
    pub name: String,
    pub size: u64,
    pub size_formatted: String,
    pub duration: u64,
    pub duration_formatted: String,
    /// Seconds since the unix epoch
    pub modified: f64,
    pub modified_formatted: String,
    pub url: String,
    pub play_url: String,
    pub source_url: String,
}

impl From<LibraryEntry> for DownloadItem {
    fn from(entry: LibraryEntry) -> Self {
        let duration_formatted = if entry.duration.is_zero() {
            "Unknown".to_string()
        } else {
            entry.duration.to_string()
        };
        Self {
            url: format!("/download-file/{}", entry.filename),
            play_url: format!("/play-audio/{}", entry.filename),
            name: entry.display_name,
            size: entry.size.bytes(),
            size_formatted: entry.size.to_string(),
            duration: entry.duration.secs(),
            duration_formatted,
            modified: unix_seconds(entry.modified_at),
            modified_formatted: format_timestamp(&local_time(entry.modified_at)),
            source_url: entry.source_url.unwrap_or_default(),
            filename: entry.filename,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DownloadsResponse {
    pub success: bool,
    pub downloads: Vec<DownloadItem>,
}

#[derive(Debug, Serialize)]
pub struct StatsBody {
    pub total_downloads: usize,
    pub total_size: u64,
    pub total_size_formatted: String,
    pub history_entries: usize,
}

impl From<LibraryStats> for StatsBody {
    fn from(stats: LibraryStats) -> Self {
        Self {
            total_downloads: stats.total_downloads,
            total_size: stats.total_size.bytes(),
            total_size_formatted: stats.total_size.to_string(),
            history_entries: stats.history_entries,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: StatsBody,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    /// False when the job had already finished
    pub cancelled: bool,
}
