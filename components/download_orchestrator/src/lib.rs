//! Download job orchestration.
//!
//! [`Orchestrator`] accepts URLs, deduplicates them against the running
//! jobs and the [`media_library::LibraryStore`], and runs each accepted job
//! through resolve, fetch, transcode and register on its own task. Progress
//! is published through the [`JobRegistry`] and only ever moves forward.

mod config;
mod error;
mod job;
mod locks;
mod orchestrator;
mod registry;
mod runner;

#[cfg(test)]
mod fakes;

pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};
pub use job::{FailureKind, Job, JobFailure, JobId, JobState};
pub use orchestrator::{InfoReport, Orchestrator};
pub use registry::{Admission, JobRegistry};
