// components/media_downloader/src/ffmpeg.rs
use crate::process::run_streaming;
use crate::progress::{parse_ffmpeg_progress, position_percent, FfmpegProgress};
use crate::types::{AudioFormat, DownloadError, ProgressSender, Transcoder};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time_primitives::MediaDuration;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    /// Program name or path of the ffmpeg executable
    pub binary: PathBuf,
    pub format: AudioFormat,
    /// Encoder bitrate, e.g. `192k`; ignored for lossless formats
    pub bitrate: String,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            format: AudioFormat::Mp3,
            bitrate: "192k".to_string(),
        }
    }
}

/// Audio transcoder backed by the ffmpeg command line tool
#[derive(Debug, Clone, Default)]
pub struct Ffmpeg {
    config: FfmpegConfig,
}

impl Ffmpeg {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut command = Command::new(&self.config.binary);
        command
            .arg("-hide_banner")
            .arg("-nostdin")
            .arg("-nostats")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-vn")
            .arg("-map_metadata")
            .arg("0")
            .arg("-codec:a")
            .arg(self.config.format.codec());

        if !self.config.format.is_lossless() {
            command.arg("-b:a").arg(&self.config.bitrate);
        }

        command.arg("-progress").arg("pipe:1").arg(output);
        command
    }
}

#[async_trait]
impl Transcoder for Ffmpeg {
    async fn check_available(&self) -> Result<(), DownloadError> {
        which::which(&self.config.binary)
            .map(|_| ())
            .map_err(|_| DownloadError::DependencyNotFound(self.config.binary.display().to_string()))
    }

    fn format(&self) -> AudioFormat {
        self.config.format
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        duration: MediaDuration,
        progress: ProgressSender,
    ) -> Result<(), DownloadError> {
        debug!("Transcoding {} -> {}", input.display(), output.display());
        let total = Duration::from_secs(duration.secs());

        let run = run_streaming(self.command(input, output), |line| {
            let pct = match parse_ffmpeg_progress(line) {
                Some(FfmpegProgress::Position(position)) => position_percent(position, total),
                Some(FfmpegProgress::End) => Some(100.0),
                None => None,
            };
            if let Some(pct) = pct {
                let _ = progress.send(pct);
            }
        })
        .await?;

        if !run.status.success() {
            return Err(DownloadError::FormatError(run.failure_reason()));
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            Ok(_) => Err(DownloadError::FormatError("ffmpeg wrote an empty file".to_string())),
            Err(e) => Err(DownloadError::FormatError(format!(
                "ffmpeg produced no output at {}: {}",
                output.display(),
                e
            ))),
        }
    }
}
