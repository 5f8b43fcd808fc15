//! Executes one job: resolve, dedup gate, fetch, transcode, register.

use crate::config::OrchestratorConfig;
use crate::job::{FailureKind, Job, JobFailure, JobId, JobState};
use crate::locks::MediaLocks;
use crate::registry::JobRegistry;
use media_downloader::{
    generate_filename, DownloadError, MediaFetcher, MediaInfo, MediaResolver, Transcoder,
};
use media_library::{LibraryError, LibraryStore, NewEntry};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time_primitives::MediaDuration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Share of the overall progress taken by the download phase
const DOWNLOAD_SHARE: f64 = 90.0;
const TRANSCODE_SHARE: f64 = 100.0 - DOWNLOAD_SHARE;

const OUTPUT_STEM: &str = "output";

#[derive(Clone)]
pub(crate) struct PipelineRunner {
    resolver: Arc<dyn MediaResolver>,
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Arc<dyn Transcoder>,
    library: Arc<LibraryStore>,
    registry: JobRegistry,
    locks: MediaLocks,
    permits: Arc<Semaphore>,
    config: OrchestratorConfig,
}

impl PipelineRunner {
    pub(crate) fn new(
        config: OrchestratorConfig,
        registry: JobRegistry,
        library: Arc<LibraryStore>,
        resolver: Arc<dyn MediaResolver>,
        fetcher: Arc<dyn MediaFetcher>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            resolver,
            fetcher,
            transcoder,
            library,
            registry,
            locks: MediaLocks::default(),
            config,
        }
    }

    pub(crate) async fn check_tools(&self) -> Result<(), DownloadError> {
        self.resolver.check_available().await?;
        self.fetcher.check_available().await?;
        self.transcoder.check_available().await
    }

    /// Drive a job to a terminal state
    pub(crate) async fn run(self, id: JobId, url: Url, cancel: CancellationToken) {
        let outcome = self.execute(id, &url, &cancel).await;

        let stored = match outcome {
            Ok(filename) => {
                info!("Job {} completed: {}", id, filename);
                self.registry.update(&id, |job| {
                    job.state = JobState::Completed;
                    job.result_filename = Some(filename);
                })
            }
            Err(failure) => {
                match failure.kind {
                    FailureKind::Duplicate { .. } | FailureKind::Cancelled => {
                        info!("Job {} stopped: {}", id, failure)
                    }
                    _ => warn!("Job {} failed: {}", id, failure),
                }
                self.registry.update(&id, |job| {
                    job.state = JobState::Failed;
                    job.error = Some(failure);
                })
            }
        };

        if let Err(e) = stored {
            error!("Could not record the outcome of job {}: {}", id, e);
        }
    }

    async fn execute(
        &self,
        id: JobId,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<String, JobFailure> {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JobFailure::cancelled()),
            permit = Arc::clone(&self.permits).acquire_owned() => permit
                .map_err(|_| JobFailure::new(FailureKind::Cancelled, "Downloads are shutting down"))?,
        };
        self.advance(id, |job| job.state = JobState::Downloading);

        let info = self
            .bounded(
                cancel,
                "Metadata lookup",
                self.config.resolve_timeout,
                FailureKind::Resolution,
                self.resolver.resolve(url),
            )
            .await?;
        debug!("Job {} resolved {} ({})", id, info.media_id, info.title);
        self.advance(id, |job| {
            job.media_id = Some(info.media_id.clone());
            job.title = Some(info.title.clone());
        });

        // Held until the file is registered so no other job can pass the
        // dedup gate for this media in the meantime
        let _media = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JobFailure::cancelled()),
            guard = self.locks.lock(&info.media_id) => guard,
        };

        if let Some(existing) = self.library.find(&info.media_id).await {
            info!(
                "Job {}: {} is already in the library as {}",
                id, info.media_id, existing.filename
            );
            return Err(JobFailure::duplicate(existing.filename));
        }

        let staging = tempfile::Builder::new()
            .prefix(&format!("job-{}-", id))
            .tempdir_in(self.library.staging_dir())
            .map_err(|e| {
                JobFailure::new(
                    FailureKind::Io,
                    format!("Could not create a staging directory: {}", e),
                )
            })?;

        let outcome = self.produce(id, url, &info, staging.path(), cancel).await;

        let staging_path = staging.path().to_owned();
        if let Err(e) = staging.close() {
            warn!(
                "Job {} left an orphaned staging directory {}: {}",
                id,
                staging_path.display(),
                e
            );
        }
        outcome
    }

    /// Fetch, transcode and register inside the job's staging directory
    async fn produce(
        &self,
        id: JobId,
        url: &Url,
        info: &MediaInfo,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, JobFailure> {
        let fetched = self.fetch(id, url, work_dir, cancel).await?;
        self.advance(id, |job| {
            job.state = JobState::Converting;
            job.progress = DOWNLOAD_SHARE;
        });

        let format = self.transcoder.format();
        let output = work_dir.join(format!("{}.{}", OUTPUT_STEM, format.extension()));
        self.transcode(id, &fetched, &output, info.duration, cancel)
            .await?;

        let entry = NewEntry {
            staged_path: output,
            filename: generate_filename(&info.title, &info.media_id, format),
            display_name: info.title.clone(),
            media_id: info.media_id.clone(),
            source_url: url.to_string(),
            duration: info.duration,
        };

        match self.library.register(entry).await {
            Ok(entry) => Ok(entry.filename),
            Err(LibraryError::Conflict { existing, .. }) => {
                info!(
                    "Job {}: {} was registered concurrently, reusing {}",
                    id, info.media_id, existing
                );
                Ok(existing)
            }
            Err(LibraryError::FilenameTaken { filename, owner }) => {
                warn!(
                    "Job {}: {} is taken by {:?}, not {}",
                    id, filename, owner, info.media_id
                );
                Err(JobFailure::new(
                    FailureKind::Io,
                    format!("{} already belongs to another track", filename),
                ))
            }
            Err(e) => Err(JobFailure::new(FailureKind::Io, e.to_string())),
        }
    }

    async fn fetch(
        &self,
        id: JobId,
        url: &Url,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, JobFailure> {
        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = self.forward_progress(id, rx, 0.0, DOWNLOAD_SHARE);

        let fetched = self
            .bounded(
                cancel,
                "Download",
                self.config.fetch_timeout,
                FailureKind::Fetch,
                self.fetcher.fetch(url, work_dir, tx),
            )
            .await;

        settle(id, forwarder).await;
        fetched
    }

    async fn transcode(
        &self,
        id: JobId,
        input: &Path,
        output: &Path,
        duration: MediaDuration,
        cancel: &CancellationToken,
    ) -> Result<(), JobFailure> {
        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = self.forward_progress(id, rx, DOWNLOAD_SHARE, TRANSCODE_SHARE);

        let transcoded = self
            .bounded(
                cancel,
                "Conversion",
                self.config.transcode_timeout,
                FailureKind::Transcode,
                self.transcoder.transcode(input, output, duration, tx),
            )
            .await;

        settle(id, forwarder).await;
        transcoded
    }

    /// Await an external call, giving up on cancellation or after `limit`
    async fn bounded<T>(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        limit: Duration,
        kind: FailureKind,
        call: impl Future<Output = Result<T, DownloadError>>,
    ) -> Result<T, JobFailure> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(JobFailure::cancelled()),
            result = tokio::time::timeout(limit, call) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(JobFailure::new(kind, e.to_string())),
                Err(_) => Err(JobFailure::new(
                    FailureKind::Timeout,
                    format!("{} timed out after {}s", operation, limit.as_secs()),
                )),
            },
        }
    }

    /// Forward tool percentages for one phase into the job's progress
    fn forward_progress(
        &self,
        id: JobId,
        rx: mpsc::UnboundedReceiver<f64>,
        base: f64,
        span: f64,
    ) -> JoinHandle<()> {
        let registry = self.registry.clone();
        forward_progress(rx, base, span, self.config.progress_interval, move |overall| {
            let _ = registry.update(&id, |job| job.progress = overall);
        })
    }

    fn advance(&self, id: JobId, mutator: impl FnOnce(&mut Job)) {
        if let Err(e) = self.registry.update(&id, mutator) {
            debug!("Job {} vanished while running: {}", id, e);
        }
    }
}

/// Map tool percentages onto `base..base + span` and hand them to `write`,
/// at most once per `interval`. A value held back by the throttle is written
/// once the interval has passed, even if the tool goes quiet, and the last
/// one is flushed when the sender side is dropped.
fn forward_progress(
    mut rx: mpsc::UnboundedReceiver<f64>,
    base: f64,
    span: f64,
    interval: Duration,
    mut write: impl FnMut(f64) + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_write: Option<Instant> = None;
        let mut pending: Option<f64> = None;

        loop {
            let flush_at = match (pending, last_write) {
                (Some(_), Some(at)) => Some(at + interval),
                _ => None,
            };

            tokio::select! {
                received = rx.recv() => {
                    let Some(percent) = received else { break };
                    let overall = base + span * percent.clamp(0.0, 100.0) / 100.0;
                    if last_write.is_some_and(|at| at.elapsed() < interval) {
                        pending = Some(overall);
                        continue;
                    }
                    write(overall);
                    last_write = Some(Instant::now());
                    pending = None;
                }
                _ = tokio::time::sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_at.is_some() => {
                    if let Some(overall) = pending.take() {
                        write(overall);
                        last_write = Some(Instant::now());
                    }
                }
            }
        }

        if let Some(overall) = pending {
            write(overall);
        }
    })
}

async fn settle(id: JobId, forwarder: JoinHandle<()>) {
    if let Err(e) = forwarder.await {
        warn!("Progress forwarding for job {} ended abnormally: {}", id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<f64>>>, impl FnMut(f64) + Send + 'static) {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&writes);
        (writes, move |overall| sink.lock().push(overall))
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_progress_is_coalesced() {
        let (writes, sink) = recorder();
        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = forward_progress(rx, 0.0, DOWNLOAD_SHARE, Duration::from_millis(250), sink);

        for percent in 1..=100 {
            tx.send(percent as f64).unwrap();
        }
        drop(tx);
        forwarder.await.unwrap();

        let writes = writes.lock().clone();
        assert_eq!(writes, vec![0.9, DOWNLOAD_SHARE]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_stay_within_the_interval() {
        let (writes, sink) = recorder();
        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = forward_progress(rx, 0.0, 100.0, Duration::from_millis(250), sink);

        // 40 reports over one second
        for percent in 1..=40 {
            tx.send(percent as f64 * 2.5).unwrap();
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        drop(tx);
        forwarder.await.unwrap();

        let writes = writes.lock().clone();
        assert!(writes.len() <= 6, "{} writes: {:?}", writes.len(), writes);
        assert!(writes.windows(2).all(|w| w[0] < w[1]), "{:?}", writes);
        assert_eq!(writes.last(), Some(&100.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_back_value_is_flushed_when_the_tool_stalls() {
        let (writes, sink) = recorder();
        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = forward_progress(rx, 0.0, 100.0, Duration::from_millis(250), sink);

        tx.send(10.0).unwrap();
        tx.send(37.0).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*writes.lock(), vec![10.0]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*writes.lock(), vec![10.0, 37.0]);

        drop(tx);
        forwarder.await.unwrap();
        assert_eq!(*writes.lock(), vec![10.0, 37.0]);
    }
}
