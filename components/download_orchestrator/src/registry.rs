use crate::error::{OrchestratorError, Result};
use crate::job::{FailureKind, Job, JobFailure, JobId, JobState};
use media_downloader::MediaId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

struct Slot {
    job: Job,
    cancel: CancellationToken,
    updates: watch::Sender<Job>,
}

/// Outcome of [`JobRegistry::admit`]
#[derive(Debug)]
pub enum Admission {
    Created { id: JobId, cancel: CancellationToken },
    /// A job for the same media is already in flight
    Joined(JobId),
}

/// In-memory table of live and recently finished jobs.
///
/// Every write goes through [`JobRegistry::update`], which keeps each job's
/// state moving forward and its progress from ever going down, so readers
/// only ever see monotonic snapshots.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, Slot>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, url: Url, media_id: Option<MediaId>) -> (JobId, CancellationToken) {
        let mut jobs = self.jobs.write();
        Self::insert(&mut jobs, url, media_id)
    }

    /// Create a job unless one for the same media is still running
    pub fn admit(&self, url: Url, media_id: Option<MediaId>) -> Admission {
        let mut jobs = self.jobs.write();

        if let Some(media_id) = &media_id {
            let running = jobs
                .values()
                .find(|slot| slot.job.is_in_flight() && slot.job.media_id.as_ref() == Some(media_id));
            if let Some(slot) = running {
                return Admission::Joined(slot.job.id);
            }
        }

        let (id, cancel) = Self::insert(&mut jobs, url, media_id);
        Admission::Created { id, cancel }
    }

    fn insert(
        jobs: &mut HashMap<JobId, Slot>,
        url: Url,
        media_id: Option<MediaId>,
    ) -> (JobId, CancellationToken) {
        let id = JobId::new();
        let job = Job::new(id, url, media_id);
        let cancel = CancellationToken::new();
        let (updates, _) = watch::channel(job.clone());

        jobs.insert(
            id,
            Slot {
                job,
                cancel: cancel.clone(),
                updates,
            },
        );
        (id, cancel)
    }

    pub fn get(&self, id: &JobId) -> Result<Job> {
        self.jobs
            .read()
            .get(id)
            .map(|slot| slot.job.clone())
            .ok_or_else(|| OrchestratorError::JobNotFound(id.to_string()))
    }

    /// Receive every snapshot written for a job from now on
    pub fn subscribe(&self, id: &JobId) -> Result<watch::Receiver<Job>> {
        self.jobs
            .read()
            .get(id)
            .map(|slot| slot.updates.subscribe())
            .ok_or_else(|| OrchestratorError::JobNotFound(id.to_string()))
    }

    /// Atomically modify one job and return the stored result.
    ///
    /// The mutator works on a copy which is then reconciled with the current
    /// snapshot: terminal jobs are frozen, states never move backwards,
    /// progress never decreases, and `error` / `result_filename` only
    /// survive in the state they belong to.
    pub fn update(&self, id: &JobId, mutator: impl FnOnce(&mut Job)) -> Result<Job> {
        let mut jobs = self.jobs.write();
        let slot = jobs
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::JobNotFound(id.to_string()))?;

        if slot.job.is_terminal() {
            return Ok(slot.job.clone());
        }

        let mut next = slot.job.clone();
        mutator(&mut next);
        let next = reconcile(&slot.job, next);

        if next.state != slot.job.state {
            debug!("Job {} {} -> {}", id, slot.job.state, next.state);
        }
        slot.job = next.clone();
        slot.updates.send_replace(next.clone());
        Ok(next)
    }

    /// Ask a running job to stop. Returns false if it already finished.
    pub fn cancel(&self, id: &JobId) -> Result<bool> {
        let jobs = self.jobs.read();
        let slot = jobs
            .get(id)
            .ok_or_else(|| OrchestratorError::JobNotFound(id.to_string()))?;

        if slot.job.is_terminal() {
            return Ok(false);
        }
        slot.cancel.cancel();
        Ok(true)
    }

    pub fn find_in_flight(&self, media_id: &MediaId) -> Option<JobId> {
        self.jobs
            .read()
            .values()
            .find(|slot| slot.job.is_in_flight() && slot.job.media_id.as_ref() == Some(media_id))
            .map(|slot| slot.job.id)
    }

    /// Drop finished jobs whose terminal state is at least `older_than` old
    pub fn sweep(&self, older_than: Duration) -> usize {
        let now = Instant::now();
        let mut jobs = self.jobs.write();
        let before = jobs.len();

        jobs.retain(|_, slot| match slot.job.finished_at {
            Some(finished) => now.duration_since(finished) < older_than,
            None => true,
        });

        let removed = before - jobs.len();
        if removed > 0 {
            debug!("Swept {} finished jobs", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

fn reconcile(current: &Job, mut next: Job) -> Job {
    next.id = current.id;
    next.url = current.url.clone();

    if next.state.step() < current.state.step() {
        next.state = current.state;
    }

    let progress = if next.progress.is_finite() {
        next.progress.clamp(0.0, 100.0)
    } else {
        current.progress
    };
    next.progress = progress.max(current.progress);

    match next.state {
        JobState::Completed => {
            next.progress = 100.0;
            next.error = None;
        }
        JobState::Failed => {
            next.result_filename = None;
            if next.error.is_none() {
                next.error = Some(JobFailure::new(
                    FailureKind::Io,
                    "Job failed without a recorded cause",
                ));
            }
        }
        _ => {
            next.error = None;
            next.result_filename = None;
        }
    }

    if next.state.is_terminal() {
        next.finished_at = Some(Instant::now());
    }
    next
}
