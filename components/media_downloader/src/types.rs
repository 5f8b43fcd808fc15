// components/media_downloader/src/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use time_primitives::MediaDuration;
use tokio::sync::mpsc;
use url::Url;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Required dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Could not resolve media: {0}")]
    ResolutionFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Format conversion failed: {0}")]
    FormatError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Canonical identifier of a piece of remote media, `<extractor>:<id>`.
///
/// Two URLs that point at the same video (`youtu.be/x`, `youtube.com/watch?v=x`)
/// share one `MediaId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    pub fn new(extractor: &str, id: &str) -> Self {
        let extractor: String = extractor
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let extractor = if extractor.is_empty() { "generic".to_string() } else { extractor };
        Self(format!("{}:{}", extractor, id))
    }

    pub fn extractor(&self) -> &str {
        self.0.split_once(':').map(|(e, _)| e).unwrap_or("")
    }

    pub fn id(&self) -> &str {
        self.0.split_once(':').map(|(_, id)| id).unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the id from well-known URL shapes without asking the extractor.
    pub fn probe(url: &Url) -> Option<Self> {
        let host = url.host_str()?.to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        let host = host.strip_prefix("m.").unwrap_or(host);

        let candidate = match host {
            "youtu.be" => url.path_segments()?.next().map(str::to_string),
            "youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => {
                let mut segments = url.path_segments()?;
                match segments.next() {
                    Some("watch") => url
                        .query_pairs()
                        .find(|(k, _)| k == "v")
                        .map(|(_, v)| v.into_owned()),
                    Some("shorts") | Some("embed") | Some("live") | Some("v") => {
                        segments.next().map(str::to_string)
                    }
                    _ => None,
                }
            }
            _ => None,
        }?;

        is_plain_video_id(&candidate).then(|| Self::new("youtube", &candidate))
    }
}

fn is_plain_video_id(id: &str) -> bool {
    (1..=64).contains(&id.len())
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the extractor knows about a URL before anything is downloaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub media_id: MediaId,
    pub title: String,
    pub uploader: Option<String>,
    pub duration: MediaDuration,
    pub thumbnail_url: Option<String>,
    pub view_count: Option<u64>,
    /// Canonical page URL reported by the extractor
    pub webpage_url: String,
}

/// Target audio container produced by the transcoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    M4a,
    Opus,
    Flac,
    Wav,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Opus => "opus",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Opus => "audio/ogg",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Wav => "audio/wav",
        }
    }

    /// ffmpeg encoder name
    pub fn codec(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "libmp3lame",
            AudioFormat::M4a => "aac",
            AudioFormat::Opus => "libopus",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "pcm_s16le",
        }
    }

    /// Lossless formats ignore the bitrate setting
    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioFormat::Flac | AudioFormat::Wav)
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()?.to_str()?.parse().ok()
    }
}

impl FromStr for AudioFormat {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "m4a" | "aac" => Ok(AudioFormat::M4a),
            "opus" | "ogg" => Ok(AudioFormat::Opus),
            "flac" => Ok(AudioFormat::Flac),
            "wav" => Ok(AudioFormat::Wav),
            other => Err(DownloadError::FormatError(format!("unsupported audio format: {}", other))),
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Percentages (0–100) reported by a running tool
pub type ProgressSender = mpsc::UnboundedSender<f64>;

#[async_trait::async_trait]
pub trait MediaResolver: Send + Sync {
    /// Check if the resolver is available and has all required dependencies
    async fn check_available(&self) -> Result<(), DownloadError> {
        Ok(())
    }

    /// Fetch metadata about a URL without downloading it
    async fn resolve(&self, url: &Url) -> Result<MediaInfo, DownloadError>;
}

#[async_trait::async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn check_available(&self) -> Result<(), DownloadError> {
        Ok(())
    }

    /// Download the best audio stream for `url` into `work_dir`, returning the file written
    async fn fetch(
        &self,
        url: &Url,
        work_dir: &Path,
        progress: ProgressSender,
    ) -> Result<PathBuf, DownloadError>;
}

#[async_trait::async_trait]
pub trait Transcoder: Send + Sync {
    async fn check_available(&self) -> Result<(), DownloadError> {
        Ok(())
    }

    /// Format written by [`Transcoder::transcode`]
    fn format(&self) -> AudioFormat;

    /// Convert `input` into `output`. `duration` is used to turn the
    /// encoder's position into a percentage; zero means unknown.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        duration: MediaDuration,
        progress: ProgressSender,
    ) -> Result<(), DownloadError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case("https://youtu.be/dQw4w9WgXcQ")]
    #[case("https://youtu.be/dQw4w9WgXcQ?t=42")]
    #[case("https://www.youtube.com/watch?v=dQw4w9WgXcQ")]
    #[case("https://m.youtube.com/watch?feature=share&v=dQw4w9WgXcQ")]
    #[case("https://music.youtube.com/watch?v=dQw4w9WgXcQ&list=RD")]
    #[case("https://www.youtube.com/shorts/dQw4w9WgXcQ")]
    #[case("https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ")]
    fn test_probe_youtube_variants(#[case] url: &str) {
        let url = Url::parse(url).unwrap();
        let id = MediaId::probe(&url).expect("should probe");
        assert_eq!(id.as_str(), "youtube:dQw4w9WgXcQ");
        assert_eq!(id.extractor(), "youtube");
        assert_eq!(id.id(), "dQw4w9WgXcQ");
    }

    #[rstest]
    #[case("https://youtu.be/")]
    #[case("https://youtu.be/a%20b")]
    #[case("https://www.youtube.com/channel/UCxyz")]
    #[case("https://soundcloud.com/artist/track")]
    #[case("https://example.com/watch?v=dQw4w9WgXcQ")]
    fn test_probe_unknown_shapes(#[case] url: &str) {
        let url = Url::parse(url).unwrap();
        assert_eq!(MediaId::probe(&url), None);
    }

    #[test]
    fn test_probe_short_share_link() {
        let url = Url::parse("https://youtu.be/abc123").unwrap();
        assert_eq!(MediaId::probe(&url).unwrap().as_str(), "youtube:abc123");
    }

    #[test]
    fn test_media_id_normalizes_extractor() {
        let id = MediaId::new("SoundCloud", "12345");
        assert_eq!(id.as_str(), "soundcloud:12345");
        assert_eq!(MediaId::new("", "x").as_str(), "generic:x");
    }

    #[test]
    fn test_audio_format_parsing() {
        assert_eq!("MP3".parse::<AudioFormat>().unwrap(), AudioFormat::Mp3);
        assert_eq!(AudioFormat::from_path(Path::new("song [youtube-x].flac")), Some(AudioFormat::Flac));
        assert_matches!("xyz".parse::<AudioFormat>(), Err(DownloadError::FormatError(_)));
    }
}
