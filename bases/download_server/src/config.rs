// bases/download_server/src/config.rs
use clap::Parser;
use download_orchestrator::OrchestratorConfig;
use media_downloader::{AudioFormat, DownloadError, FfmpegConfig, YtDlpConfig};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid --audio-format")]
    AudioFormat(#[source] DownloadError),

    #[error("--max-concurrent-jobs must be at least 1")]
    NoWorkers,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Directory holding the finished audio files
    pub library_dir: PathBuf,
    pub static_dir: PathBuf,
    pub ytdlp: YtDlpConfig,
    pub ffmpeg: FfmpegConfig,
    pub orchestrator: OrchestratorConfig,
}

/// Convert media URLs into a local audio library
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    #[arg(long, default_value = "static/downloads")]
    pub library_dir: PathBuf,

    /// Served under /static
    #[arg(long, default_value = "static")]
    pub static_dir: PathBuf,

    /// yt-dlp executable
    #[arg(long = "yt-dlp", default_value = "yt-dlp")]
    pub yt_dlp: PathBuf,

    /// ffmpeg executable
    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// mp3, m4a, opus, flac or wav
    #[arg(long, default_value = "mp3")]
    pub audio_format: String,

    /// Encoder bitrate for lossy formats
    #[arg(long, default_value = "192k")]
    pub audio_quality: String,

    #[arg(long, default_value_t = 60)]
    pub resolve_timeout_secs: u64,

    #[arg(long, default_value_t = 1800)]
    pub fetch_timeout_secs: u64,

    #[arg(long, default_value_t = 900)]
    pub transcode_timeout_secs: u64,

    /// How long finished jobs stay pollable
    #[arg(long, default_value_t = 300)]
    pub job_retention_secs: u64,

    #[arg(long, default_value_t = 4)]
    pub max_concurrent_jobs: usize,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let format: AudioFormat = args.audio_format.parse().map_err(ConfigError::AudioFormat)?;
        if args.max_concurrent_jobs == 0 {
            return Err(ConfigError::NoWorkers);
        }

        Ok(Self {
            host: args.host,
            port: args.port,
            library_dir: args.library_dir,
            static_dir: args.static_dir,
            ytdlp: YtDlpConfig {
                binary: args.yt_dlp,
                ..YtDlpConfig::default()
            },
            ffmpeg: FfmpegConfig {
                binary: args.ffmpeg,
                format,
                bitrate: args.audio_quality,
            },
            orchestrator: OrchestratorConfig {
                resolve_timeout: Duration::from_secs(args.resolve_timeout_secs),
                fetch_timeout: Duration::from_secs(args.fetch_timeout_secs),
                transcode_timeout: Duration::from_secs(args.transcode_timeout_secs),
                job_retention: Duration::from_secs(args.job_retention_secs),
                max_concurrent_jobs: args.max_concurrent_jobs,
                ..OrchestratorConfig::default()
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
