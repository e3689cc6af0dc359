//! Core job types and errors.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use retention_core::ConfigError;

use super::scheduler::SchedulerError;

/// Unique identifier of one archiver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the scheduler remembers about a job between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// When the last run finished, if any run ever did.
    pub last_finished: Option<DateTime<Utc>>,
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobLifecycle {
    /// No schedule registered
    Stopped,
    /// Registered with the scheduler, waiting for the next wakeup
    Scheduled,
    /// A batch run is active
    Running,
}

impl std::fmt::Display for JobLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobLifecycle::Stopped => "stopped",
            JobLifecycle::Scheduled => "scheduled",
            JobLifecycle::Running => "running",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot start channel archiver: {0}")]
    Schedule(#[from] SchedulerError),

    #[error("error closing job: {0}")]
    Close(SchedulerError),

    #[error("waiting on job to stop timed out after {0:?}")]
    StopTimeout(Duration),

    #[error("job `{0}` already registered")]
    Duplicate(String),

    #[error("{}", join_errors(.0))]
    Multiple(Vec<JobError>),
}

impl JobError {
    /// Fold collected errors: none is `Ok`, one is itself, more are [`JobError::Multiple`].
    pub fn aggregate(mut errors: Vec<JobError>) -> Result<(), JobError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(JobError::Multiple(errors)),
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            JobError::StopTimeout(_) => true,
            JobError::Multiple(errors) => errors.iter().any(JobError::is_timeout),
            _ => false,
        }
    }
}

fn join_errors(errors: &[JobError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
