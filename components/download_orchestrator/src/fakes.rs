//! Scripted stand-ins for the external tools

use async_trait::async_trait;
use media_downloader::{
    AudioFormat, DownloadError, MediaFetcher, MediaId, MediaInfo, MediaResolver, ProgressSender,
    Transcoder,
};
use media_library::{LibraryStore, NewEntry};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use time_primitives::MediaDuration;
use tokio::sync::Notify;
use url::Url;

pub(crate) const UNAVAILABLE_HOST: &str = "unavailable.test";

/// Resolves any URL without touching the network. YouTube shapes get their
/// probed id; other URLs use `?media=` or their last path segment.
#[derive(Default)]
pub(crate) struct FakeResolver {
    pub calls: AtomicUsize,
}

pub(crate) fn fake_media_id(url: &Url) -> MediaId {
    if let Some(id) = MediaId::probe(url) {
        return id;
    }
    let id = url
        .query_pairs()
        .find(|(k, _)| k == "media")
        .map(|(_, v)| v.into_owned())
        .or_else(|| url.path_segments()?.last().map(str::to_string))
        .unwrap_or_default();
    MediaId::new("generic", &id)
}

#[async_trait]
impl MediaResolver for FakeResolver {
    async fn resolve(&self, url: &Url) -> Result<MediaInfo, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url.host_str() == Some(UNAVAILABLE_HOST) {
            return Err(DownloadError::ResolutionFailed("Video unavailable".into()));
        }

        let media_id = fake_media_id(url);
        Ok(MediaInfo {
            title: format!("Track {}", media_id.id()),
            uploader: Some("Fake Uploader".into()),
            duration: MediaDuration::from_secs(180),
            thumbnail_url: Some("https://img.test/thumb.jpg".into()),
            view_count: Some(42),
            webpage_url: url.to_string(),
            media_id,
        })
    }
}

#[derive(Default)]
pub(crate) struct FakeFetcher {
    /// Percentages reported before the gate
    pub progress: Vec<f64>,
    /// When set, the fetch waits for a permit after reporting progress
    pub gate: Option<Arc<Notify>>,
    /// Never finish
    pub hang: bool,
    pub fail_with: Option<String>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(
        &self,
        url: &Url,
        work_dir: &Path,
        progress: ProgressSender,
    ) -> Result<PathBuf, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = work_dir.join("source.webm");
        tokio::fs::write(&path, b"partial").await?;

        for percent in &self.progress {
            let _ = progress.send(*percent);
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(reason) = &self.fail_with {
            return Err(DownloadError::DownloadFailed(reason.clone()));
        }

        tokio::fs::write(&path, format!("audio from {}", url)).await?;
        Ok(path)
    }
}

#[derive(Default)]
pub(crate) struct FakeTranscoder {
    pub progress: Vec<f64>,
    pub fail_with: Option<String>,
    /// Registers a competing file for this media before returning
    pub rival: Option<(Arc<LibraryStore>, MediaId)>,
    pub calls: AtomicUsize,
}

pub(crate) const RIVAL_FILE: &str = "Rival Upload [youtube-rival].mp3";

#[async_trait]
impl Transcoder for FakeTranscoder {
    fn format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _duration: MediaDuration,
        progress: ProgressSender,
    ) -> Result<(), DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let source = tokio::fs::read(input).await?;

        for percent in &self.progress {
            let _ = progress.send(*percent);
        }
        if let Some(reason) = &self.fail_with {
            tokio::fs::write(output, b"half an mp3").await?;
            return Err(DownloadError::FormatError(reason.clone()));
        }

        let mut encoded = b"mp3:".to_vec();
        encoded.extend_from_slice(&source);
        tokio::fs::write(output, encoded).await?;

        if let Some((library, media_id)) = &self.rival {
            let staged = library.staging_dir().join("rival.mp3");
            tokio::fs::write(&staged, b"rival bytes").await?;
            library
                .register(NewEntry {
                    staged_path: staged,
                    filename: RIVAL_FILE.to_string(),
                    display_name: "Rival Upload".to_string(),
                    media_id: media_id.clone(),
                    source_url: "https://youtu.be/rival".to_string(),
                    duration: MediaDuration::from_secs(180),
                })
                .await
                .map_err(|e| DownloadError::FormatError(e.to_string()))?;
        }
        Ok(())
    }
}
