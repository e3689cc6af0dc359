//! Recurring job supervision.
//!
//! ## Design
//!
//! - Jobs are registered by id with a [`JobManager`]
//! - A [`ClusterScheduler`] decides when a job is due and remembers when it
//!   last finished
//! - [`ChannelArchiverJob`] keeps at most one archiver run alive and
//!   re-derives its next wakeup from the recurrence settings
//!
//! ## Components
//!
//! - `ChannelArchiverJob`: the channel archiver supervisor
//! - `ClusterScheduler` / `LocalScheduler`: scheduling seam and in-process impl
//! - `JobManager`: configuration fan-out and shutdown

pub mod archiver_job;
pub mod manager;
mod runner;
pub mod scheduler;
pub mod types;

pub use archiver_job::{CHANNEL_ARCHIVER_JOB_ID, ChannelArchiverJob, STOP_TIMEOUT};
pub use manager::{JobManager, ManagedJob};
pub use scheduler::{
    ClusterScheduler, LocalScheduler, ScheduleHandle, ScheduledTask, SchedulerError,
};
pub use types::{JobError, JobLifecycle, JobMetadata, RunId};
