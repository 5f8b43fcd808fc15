use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::job::{Job, JobId};
use crate::registry::{Admission, JobRegistry};
use crate::runner::PipelineRunner;
use media_downloader::{
    DownloadError, MediaFetcher, MediaId, MediaInfo, MediaResolver, Transcoder,
};
use media_library::{LibraryEntry, LibraryError, LibraryStats, LibraryStore};
use std::sync::Arc;
use tokio::fs::File;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

/// Metadata for a URL plus whether the library already holds it
#[derive(Debug, Clone, PartialEq)]
pub struct InfoReport {
    pub info: MediaInfo,
    pub existing_file: Option<String>,
}

impl InfoReport {
    pub fn already_downloaded(&self) -> bool {
        self.existing_file.is_some()
    }
}

/// Entry point for everything the transport layers need
#[derive(Clone)]
pub struct Orchestrator {
    registry: JobRegistry,
    library: Arc<LibraryStore>,
    resolver: Arc<dyn MediaResolver>,
    runner: PipelineRunner,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        library: Arc<LibraryStore>,
        resolver: Arc<dyn MediaResolver>,
        fetcher: Arc<dyn MediaFetcher>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        let registry = JobRegistry::new();
        let runner = PipelineRunner::new(
            config.clone(),
            registry.clone(),
            Arc::clone(&library),
            Arc::clone(&resolver),
            fetcher,
            transcoder,
        );

        Self {
            registry,
            library,
            resolver,
            runner,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Fail if any external tool is missing
    pub async fn check_tools(&self) -> std::result::Result<(), DownloadError> {
        self.runner.check_tools().await
    }

    pub async fn get_info(&self, url: &str) -> Result<InfoReport> {
        let url = parse_url(url)?;

        let limit = self.config.resolve_timeout;
        let info = tokio::time::timeout(limit, self.resolver.resolve(&url))
            .await
            .map_err(|_| OrchestratorError::Timeout {
                operation: "metadata lookup",
                after: limit,
            })?
            .map_err(OrchestratorError::Resolution)?;

        let existing_file = self.library.find(&info.media_id).await.map(|e| e.filename);
        Ok(InfoReport {
            info,
            existing_file,
        })
    }

    /// Queue a download and return its job id without waiting for it.
    ///
    /// URLs whose media id can be read off the URL itself are checked
    /// against the library and the running jobs first: a library hit fails
    /// with [`OrchestratorError::Duplicate`], a running job is returned as is.
    pub async fn start_download(&self, url: &str) -> Result<JobId> {
        let url = parse_url(url)?;
        let probed = MediaId::probe(&url);

        if let Some(media_id) = &probed {
            if let Some(existing) = self.library.find(media_id).await {
                info!("{} is already in the library as {}", media_id, existing.filename);
                return Err(OrchestratorError::Duplicate {
                    existing_file: existing.filename,
                });
            }
        }

        match self.registry.admit(url.clone(), probed) {
            Admission::Joined(id) => {
                info!("{} is already downloading as job {}", url, id);
                Ok(id)
            }
            Admission::Created { id, cancel } => {
                info!("Created job {} for {}", id, url);
                tokio::spawn(self.runner.clone().run(id, url, cancel));
                Ok(id)
            }
        }
    }

    pub fn get_progress(&self, id: &JobId) -> Result<Job> {
        self.registry.get(id)
    }

    /// Stream of snapshots for one job, starting with the current one
    pub fn watch_progress(&self, id: &JobId) -> Result<watch::Receiver<Job>> {
        self.registry.subscribe(id)
    }

    /// Interrupt a job. Returns false if it had already finished.
    pub fn cancel(&self, id: &JobId) -> Result<bool> {
        let cancelled = self.registry.cancel(id)?;
        if cancelled {
            info!("Cancelling job {}", id);
        }
        Ok(cancelled)
    }

    pub async fn list_library(&self) -> Vec<LibraryEntry> {
        self.library.list().await
    }

    pub async fn fetch_file(&self, filename: &str) -> Result<(LibraryEntry, File)> {
        Ok(self.library.fetch(filename).await?)
    }

    pub async fn delete_file(&self, filename: &str) -> Result<()> {
        if self.library.remove(filename).await? {
            Ok(())
        } else {
            Err(LibraryError::NotFound(filename.to_string()).into())
        }
    }

    pub async fn stats(&self) -> LibraryStats {
        self.library.stats().await
    }

    /// Periodically drop finished jobs older than the retention window
    pub fn spawn_sweeper(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let retention = self.config.job_retention;
        let period = self.config.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = registry.sweep(retention);
                        if removed > 0 {
                            debug!("Retired {} finished jobs", removed);
                        }
                    }
                }
            }
        })
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(OrchestratorError::invalid_url(raw, "URL is required"));
    }

    let url = Url::parse(raw).map_err(|e| OrchestratorError::invalid_url(raw, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(OrchestratorError::invalid_url(
            raw,
            format!("unsupported scheme {}", other),
        )),
    }
}
