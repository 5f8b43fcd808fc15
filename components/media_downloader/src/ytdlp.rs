// components/media_downloader/src/ytdlp.rs
use crate::process::run_streaming;
use crate::progress::{parse_ytdlp_progress, YTDLP_PROGRESS_TEMPLATE};
use crate::types::{
    DownloadError, MediaFetcher, MediaId, MediaInfo, MediaResolver, ProgressSender,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time_primitives::MediaDuration;
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

/// Stem of the file yt-dlp writes into the work directory
const SOURCE_STEM: &str = "source";

#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// Program name or path of the yt-dlp executable
    pub binary: PathBuf,
    /// Network timeout handed to yt-dlp for each socket operation
    pub socket_timeout: Duration,
    /// Retries yt-dlp performs on transient network errors
    pub retries: u32,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            socket_timeout: Duration::from_secs(30),
            retries: 10,
        }
    }
}

/// Metadata resolver and audio fetcher backed by the yt-dlp command line tool
#[derive(Debug, Clone, Default)]
pub struct YtDlp {
    config: YtDlpConfig,
}

impl YtDlp {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.config.binary);
        command
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("--socket-timeout")
            .arg(self.config.socket_timeout.as_secs().max(1).to_string());
        command
    }

    fn available(&self) -> Result<(), DownloadError> {
        which::which(&self.config.binary)
            .map(|_| ())
            .map_err(|_| DownloadError::DependencyNotFound(self.config.binary.display().to_string()))
    }
}

#[async_trait]
impl MediaResolver for YtDlp {
    async fn check_available(&self) -> Result<(), DownloadError> {
        self.available()
    }

    async fn resolve(&self, url: &Url) -> Result<MediaInfo, DownloadError> {
        debug!("Resolving metadata for {}", url);

        let mut command = self.command();
        command.arg("--dump-json").arg("--no-download").arg(url.as_str());
        let output = command.kill_on_drop(true).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or("yt-dlp could not read this URL")
                .to_string();
            return Err(DownloadError::ResolutionFailed(reason));
        }

        let meta: YtDlpMetadata = serde_json::from_slice(&output.stdout)
            .map_err(|e| DownloadError::ResolutionFailed(format!("unreadable metadata: {}", e)))?;

        let info = meta.into_media_info(url);
        info!("Resolved {} as {} ({})", url, info.media_id, info.title);
        Ok(info)
    }
}

#[async_trait]
impl MediaFetcher for YtDlp {
    async fn check_available(&self) -> Result<(), DownloadError> {
        self.available()
    }

    async fn fetch(
        &self,
        url: &Url,
        work_dir: &Path,
        progress: ProgressSender,
    ) -> Result<PathBuf, DownloadError> {
        let abs_work_dir = dunce::canonicalize(work_dir)?;
        let template = abs_work_dir.join(format!("{}.%(ext)s", SOURCE_STEM));
        debug!("Fetching {} into {}", url, abs_work_dir.display());

        let mut command = self.command();
        command
            .arg("--format")
            .arg("bestaudio/best")
            .arg("--retries")
            .arg(self.config.retries.to_string())
            .arg("--newline")
            .arg("--progress-template")
            .arg(YTDLP_PROGRESS_TEMPLATE)
            .arg("--no-part")
            .arg("-o")
            .arg(&template)
            .arg(url.as_str())
            .current_dir(&abs_work_dir);

        let run = run_streaming(command, |line| {
            if let Some(pct) = parse_ytdlp_progress(line) {
                // The receiver only goes away when the job is already over
                let _ = progress.send(pct);
            }
        })
        .await?;

        if !run.status.success() {
            return Err(DownloadError::DownloadFailed(run.failure_reason()));
        }

        find_fetched_file(&abs_work_dir).await
    }
}

/// Locate the file yt-dlp wrote; its extension depends on the source stream
async fn find_fetched_file(work_dir: &Path) -> Result<PathBuf, DownloadError> {
    let mut entries = tokio::fs::read_dir(work_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_source = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem == SOURCE_STEM);
        let is_partial = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext == "part" || ext == "ytdl");

        if is_source && !is_partial && entry.file_type().await?.is_file() {
            return Ok(path);
        }
    }

    warn!("yt-dlp reported success but left no file in {}", work_dir.display());
    Err(DownloadError::DownloadFailed(
        "yt-dlp finished without producing a file".to_string(),
    ))
}

#[derive(Debug, Deserialize)]
struct YtDlpMetadata {
    id: String,
    #[serde(default)]
    extractor_key: Option<String>,
    #[serde(default)]
    extractor: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    view_count: Option<u64>,
    #[serde(default)]
    webpage_url: Option<String>,
}

impl YtDlpMetadata {
    fn into_media_info(self, requested: &Url) -> MediaInfo {
        let extractor = self
            .extractor_key
            .or(self.extractor)
            .unwrap_or_else(|| "generic".to_string());
        let duration = self
            .duration
            .and_then(|secs| MediaDuration::from_secs_f64(secs).ok())
            .unwrap_or_default();

        MediaInfo {
            media_id: MediaId::new(&extractor, &self.id),
            title: self.title.unwrap_or_else(|| "Unknown".to_string()),
            uploader: self.uploader,
            duration,
            thumbnail_url: self.thumbnail,
            view_count: self.view_count,
            webpage_url: self.webpage_url.unwrap_or_else(|| requested.to_string()),
        }
    }
}
