// components/media_downloader/src/lib.rs
//! Wrappers around the external media tools.
//!
//! The resolver, fetcher and transcoder contracts are async traits so the
//! orchestrator can run against fakes; [`YtDlp`] and [`Ffmpeg`] are the
//! production implementations.

mod ffmpeg;
mod process;
mod progress;
mod types;
mod utils;
mod ytdlp;

pub use ffmpeg::{Ffmpeg, FfmpegConfig};
pub use progress::{parse_ffmpeg_progress, parse_ytdlp_progress, FfmpegProgress};
pub use types::{
    AudioFormat, DownloadError, MediaFetcher, MediaId, MediaInfo, MediaResolver, ProgressSender,
    Transcoder,
};
pub use utils::{generate_filename, parse_file_stem, sanitize_title};
pub use ytdlp::{YtDlp, YtDlpConfig};
