//! Scheduling seam and an in-process scheduler.
//!
//! ## Design
//!
//! - A [`ClusterScheduler`] owns *when* a job runs; the job owns *what* runs
//! - The scheduler asks the task for its next wait after every run and keeps
//!   per-job [`JobMetadata`] (last finish time) across reschedules
//! - Closing a schedule stops future wakeups only; an in-flight run is left
//!   to the job's own stop logic
//!
//! A multi-node deployment plugs in a scheduler that also guarantees only one
//! node runs a given job id at a time. [`LocalScheduler`] is the single-process
//! version.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::types::JobMetadata;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job `{0}` is already scheduled")]
    AlreadyScheduled(String),

    #[error("job `{0}` is not scheduled")]
    NotScheduled(String),

    #[error("no async runtime available to schedule job `{0}`")]
    NoRuntime(String),

    #[error("scheduler backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

/// The two callbacks a scheduler drives.
#[async_trait]
pub trait ScheduledTask: Send + Sync + 'static {
    /// How long to wait from `now` until the next run.
    fn next_wait_interval(&self, now: DateTime<Utc>, metadata: &JobMetadata) -> Duration;

    /// Invoked when the job is due.
    async fn run(&self);
}

/// A registered schedule.
pub trait ScheduleHandle: Send + Sync {
    /// Stop future wakeups. Does not wait for or interrupt an active run.
    fn close(&self) -> Result<(), SchedulerError>;
}

pub trait ClusterScheduler: Send + Sync + 'static {
    fn schedule(
        &self,
        job_id: &str,
        task: Arc<dyn ScheduledTask>,
    ) -> Result<Box<dyn ScheduleHandle>, SchedulerError>;
}

#[derive(Debug, Default)]
struct SchedulerState {
    metadata: HashMap<String, JobMetadata>,
    active: HashSet<String>,
}

/// In-process scheduler: one tokio task per scheduled job.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct LocalScheduler {
    state: Arc<Mutex<SchedulerState>>,
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&self, job_id: &str) -> JobMetadata {
        self.lock()
            .metadata
            .get(job_id)
            .copied()
            .unwrap_or_default()
    }

    /// Seed the last finish time, e.g. from a previous process.
    pub fn set_last_finished(&self, job_id: &str, at: DateTime<Utc>) {
        self.lock()
            .metadata
            .entry(job_id.to_string())
            .or_default()
            .last_finished = Some(at);
    }

    pub fn is_scheduled(&self, job_id: &str) -> bool {
        self.lock().active.contains(job_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ClusterScheduler for LocalScheduler {
    fn schedule(
        &self,
        job_id: &str,
        task: Arc<dyn ScheduledTask>,
    ) -> Result<Box<dyn ScheduleHandle>, SchedulerError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| SchedulerError::NoRuntime(job_id.to_string()))?;

        if !self.lock().active.insert(job_id.to_string()) {
            return Err(SchedulerError::AlreadyScheduled(job_id.to_string()));
        }

        let cancel = CancellationToken::new();
        runtime.spawn(schedule_loop(
            self.clone(),
            job_id.to_string(),
            task,
            cancel.clone(),
        ));
        info!(job_id, "job scheduled");

        Ok(Box::new(LocalScheduleHandle {
            scheduler: self.clone(),
            job_id: job_id.to_string(),
            cancel,
        }))
    }
}

async fn schedule_loop(
    scheduler: LocalScheduler,
    job_id: String,
    task: Arc<dyn ScheduledTask>,
    cancel: CancellationToken,
) {
    loop {
        let metadata = scheduler.metadata(&job_id);
        let wait = task.next_wait_interval(Utc::now(), &metadata);
        debug!(job_id = %job_id, wait_secs = wait.as_secs(), "waiting for next run");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        // Closed while the wakeup was being delivered.
        if cancel.is_cancelled() {
            break;
        }

        task.run().await;

        scheduler
            .lock()
            .metadata
            .entry(job_id.clone())
            .or_default()
            .last_finished = Some(Utc::now());
    }
    debug!(job_id = %job_id, "schedule loop exited");
}

struct LocalScheduleHandle {
    scheduler: LocalScheduler,
    job_id: String,
    cancel: CancellationToken,
}

impl ScheduleHandle for LocalScheduleHandle {
    fn close(&self) -> Result<(), SchedulerError> {
        if self.cancel.is_cancelled() {
            return Err(SchedulerError::NotScheduled(self.job_id.clone()));
        }
        self.cancel.cancel();
        self.scheduler.lock().active.remove(&self.job_id);
        info!(job_id = %self.job_id, "job schedule closed");
        Ok(())
    }
}
