// bases/download_cli/src/args.rs
use clap::Parser;
use std::path::PathBuf;

/// Download the audio track behind a media URL into a local library
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Library directory to store downloaded files
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// URL to download from
    pub url: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Print metadata and exit without downloading
    #[arg(long)]
    pub info: bool,

    /// mp3, m4a, opus, flac or wav
    #[arg(long, default_value = "mp3")]
    pub audio_format: String,

    #[arg(long = "yt-dlp", default_value = "yt-dlp")]
    pub yt_dlp: PathBuf,

    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,
}
