use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Ceiling for one metadata lookup
    pub resolve_timeout: Duration,
    pub fetch_timeout: Duration,
    pub transcode_timeout: Duration,
    /// How long finished jobs stay pollable
    pub job_retention: Duration,
    /// Jobs allowed to fetch and transcode at the same time
    pub max_concurrent_jobs: usize,
    /// Minimum spacing between progress writes for one job
    pub progress_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            resolve_timeout: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(30 * 60),
            transcode_timeout: Duration::from_secs(15 * 60),
            job_retention: Duration::from_secs(5 * 60),
            max_concurrent_jobs: 4,
            progress_interval: Duration::from_millis(250),
        }
    }
}

impl OrchestratorConfig {
    /// Sweep often enough that a finished job outlives its retention by at most a quarter
    pub fn sweep_interval(&self) -> Duration {
        (self.job_retention / 4).max(Duration::from_secs(1))
    }
}
