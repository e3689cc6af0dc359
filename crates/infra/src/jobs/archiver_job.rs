//! The recurring channel archiver job.
//!
//! ## Design
//!
//! - One live copy of [`RecurrenceSettings`], replaced wholesale on
//!   configuration change; each run works on its own snapshot
//! - At most one run per job at a time: the run callback refuses to start
//!   while another run holds the active-run slot
//! - Supervisor state (settings, schedule handle, active run) sits behind one
//!   lock that is never held across an await
//! - `stop` cancels the active run and waits a bounded time for it to exit;
//!   from the moment it takes the lock until the next schedule is registered,
//!   late wakeups are refused

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use retention_core::{ArchiveResult, ExitReason, RecurrenceSettings, StaleResourceQuery};

use crate::channels::{ArchiverOpts, BatchArchiver};

use super::runner::RunInstance;
use super::scheduler::{ClusterScheduler, ScheduleHandle, ScheduledTask};
use super::types::{JobError, JobLifecycle, JobMetadata, RunId};

pub const CHANNEL_ARCHIVER_JOB_ID: &str = "channel_archiver_job";

/// How long a configuration change waits for an active run to exit.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct JobState {
    settings: RecurrenceSettings,
    schedule: Option<Box<dyn ScheduleHandle>>,
    runner: Option<RunInstance>,
    last_result: Option<ArchiveResult>,
    /// Set when the schedule is torn down; cleared only when a new schedule is
    /// registered. Runs that fire in between are refused.
    halted: bool,
}

struct JobInner {
    id: String,
    scheduler: Arc<dyn ClusterScheduler>,
    archiver: BatchArchiver,
    stop_timeout: Duration,
    state: Mutex<JobState>,
}

/// Supervises the recurring archiver: schedule, single-flight run, stop.
#[derive(Clone)]
pub struct ChannelArchiverJob {
    inner: Arc<JobInner>,
}

impl std::fmt::Debug for ChannelArchiverJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelArchiverJob")
            .field("id", &self.inner.id)
            .field("lifecycle", &self.lifecycle())
            .finish_non_exhaustive()
    }
}

impl ChannelArchiverJob {
    pub fn new(scheduler: Arc<dyn ClusterScheduler>, archiver: BatchArchiver) -> Self {
        Self::with_stop_timeout(scheduler, archiver, STOP_TIMEOUT)
    }

    /// `stop_timeout` bounds how long a configuration change waits for an
    /// active run to exit.
    pub fn with_stop_timeout(
        scheduler: Arc<dyn ClusterScheduler>,
        archiver: BatchArchiver,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(JobInner {
                id: CHANNEL_ARCHIVER_JOB_ID.to_string(),
                scheduler,
                archiver,
                stop_timeout,
                state: Mutex::new(JobState::default()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Apply new settings: stop the current run and schedule, then reschedule
    /// unless disabled.
    pub async fn on_configuration_change(
        &self,
        settings: RecurrenceSettings,
    ) -> Result<(), JobError> {
        settings.validate()?;
        info!(job_id = %self.inner.id, settings = %settings, "channel archiver configuration changed");

        // New settings land in the same critical section that halts the job.
        let enabled = settings.enabled;
        if let Err(err) = self
            .halt(self.inner.stop_timeout, Some(settings.clone()))
            .await
        {
            error!(job_id = %self.inner.id, error = %err, "error stopping channel archiver");
        }

        if !enabled {
            info!(job_id = %self.inner.id, "channel archiver disabled");
            return Ok(());
        }

        self.start(settings)
    }

    fn start(&self, settings: RecurrenceSettings) -> Result<(), JobError> {
        // A concurrent configuration change may have scheduled in between.
        // Its handle is closed outside the lock; a scheduler may call back
        // into the job while closing.
        let previous = {
            let mut state = self.inner.lock_state();
            state.halted = true;
            state.schedule.take()
        };
        if let Some(old) = previous {
            if let Err(err) = old.close() {
                warn!(job_id = %self.inner.id, error = %err, "error closing previous schedule");
            }
        }

        let mut state = self.inner.lock_state();
        state.settings = settings;

        let task: Arc<dyn ScheduledTask> = self.inner.clone();
        let handle = self.inner.scheduler.schedule(&self.inner.id, task)?;
        state.schedule = Some(handle);
        state.halted = false;

        info!(job_id = %self.inner.id, "channel archiver scheduled");
        Ok(())
    }

    /// Close the schedule and cancel the active run, waiting up to `timeout`.
    ///
    /// On timeout the run is still finishing in the background.
    pub async fn stop(&self, timeout: Duration) -> Result<(), JobError> {
        self.halt(timeout, None).await
    }

    async fn halt(
        &self,
        timeout: Duration,
        next_settings: Option<RecurrenceSettings>,
    ) -> Result<(), JobError> {
        let (schedule, runner) = {
            let mut state = self.inner.lock_state();
            state.halted = true;
            if let Some(settings) = next_settings {
                state.settings = settings;
            }
            (state.schedule.take(), state.runner.take())
        };

        let mut errors = Vec::new();

        if let Some(schedule) = schedule {
            if let Err(err) = schedule.close() {
                errors.push(JobError::Close(err));
            }
        }

        if let Some(runner) = runner {
            debug!(job_id = %self.inner.id, run_id = %runner.id, "stopping active run");
            if let Err(err) = runner.stop(timeout).await {
                errors.push(err);
            }
        }

        JobError::aggregate(errors)
    }

    pub fn lifecycle(&self) -> JobLifecycle {
        let state = self.inner.lock_state();
        if state.runner.is_some() {
            JobLifecycle::Running
        } else if state.schedule.is_some() {
            JobLifecycle::Scheduled
        } else {
            JobLifecycle::Stopped
        }
    }

    pub fn current_settings(&self) -> RecurrenceSettings {
        self.inner.lock_state().settings.clone()
    }

    /// Result of the most recent finished run.
    pub fn last_result(&self) -> Option<ArchiveResult> {
        self.inner.lock_state().last_result.clone()
    }

    /// Run the archiver now, unless a run is already active.
    pub async fn run(&self) {
        self.inner.run().await;
    }

    pub fn next_wait_interval(&self, now: DateTime<Utc>, metadata: &JobMetadata) -> Duration {
        self.inner.next_wait_interval(now, metadata)
    }
}

impl JobInner {
    fn lock_state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the active-run slot when the run finishes, unless a newer run
/// already owns it.
struct ActiveRunSlot<'a> {
    inner: &'a JobInner,
    run_id: RunId,
}

impl Drop for ActiveRunSlot<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        if state.runner.as_ref().is_some_and(|r| r.id == self.run_id) {
            state.runner = None;
        }
    }
}

#[async_trait]
impl ScheduledTask for JobInner {
    fn next_wait_interval(&self, now: DateTime<Utc>, metadata: &JobMetadata) -> Duration {
        let settings = self.lock_state().settings.clone();
        let last = metadata.last_finished.unwrap_or(now);

        let next = settings.frequency.calc_next(
            &last,
            settings.target_weekday,
            &settings.time_of_day,
        );
        let wait = (next.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO);

        debug!(
            job_id = %self.id,
            last_finished = %last,
            next_run = %next,
            wait_secs = wait.as_secs(),
            "computed next channel archiver run"
        );
        wait
    }

    async fn run(&self) {
        let (settings, cancel, run_id, _exit) = {
            let mut state = self.lock_state();
            if let Some(active) = &state.runner {
                error!(job_id = %self.id, active_run = %active.id, "channel archiver run skipped: a run is already active");
                return;
            }
            if !state.settings.enabled {
                error!(job_id = %self.id, "channel archiver run skipped: job is disabled");
                return;
            }
            if state.halted {
                error!(job_id = %self.id, "channel archiver run skipped: job is stopping");
                return;
            }

            let (instance, exit) = RunInstance::new();
            let cancel = instance.cancel_token();
            let run_id = instance.id;
            state.runner = Some(instance);
            (state.settings.clone(), cancel, run_id, exit)
        };
        let _slot = ActiveRunSlot {
            inner: self,
            run_id,
        };

        info!(job_id = %self.id, run_id = %run_id, settings = %settings, "channel archiver run started");

        let opts = ArchiverOpts::new(StaleResourceQuery::from_settings(&settings))
            .with_batch_size(settings.batch_size);
        let progress = move |partial: &ArchiveResult| {
            debug!(
                run_id = %run_id,
                archived = partial.archived.len(),
                warnings = partial.warnings.len(),
                "channel archiver progress"
            );
        };

        let result = self.archiver.run(&cancel, &opts, Some(&progress)).await;
        log_result(&self.id, run_id, &result);

        self.lock_state().last_result = Some(result);
    }
}

fn log_result(job_id: &str, run_id: RunId, result: &ArchiveResult) {
    let archived = result.archived.len();

    for warning in &result.warnings {
        warn!(job_id, run_id = %run_id, warning = %warning, "channel not archived");
    }

    match result.exit_reason {
        ExitReason::Done => info!(
            job_id,
            run_id = %run_id,
            archived,
            warnings = result.warnings.len(),
            duration = ?result.duration,
            "channel archiver run completed normally"
        ),
        ExitReason::Cancelled => info!(
            job_id,
            run_id = %run_id,
            archived,
            duration = ?result.duration,
            "channel archiver run canceled"
        ),
        ExitReason::Error => error!(
            job_id,
            run_id = %run_id,
            archived,
            duration = ?result.duration,
            error = result.error.as_deref().unwrap_or("unknown"),
            "channel archiver run failed"
        ),
    }
}
