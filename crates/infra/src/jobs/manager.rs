//! Registry of recurring jobs.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::RawConfiguration;

use super::archiver_job::ChannelArchiverJob;
use super::types::JobError;

/// A job the manager can configure and shut down.
#[async_trait]
pub trait ManagedJob: Send + Sync {
    fn id(&self) -> &str;

    async fn apply_configuration(&self, raw: &RawConfiguration) -> Result<(), JobError>;

    async fn shutdown(&self, timeout: Duration) -> Result<(), JobError>;
}

#[async_trait]
impl ManagedJob for ChannelArchiverJob {
    fn id(&self) -> &str {
        ChannelArchiverJob::id(self)
    }

    async fn apply_configuration(&self, raw: &RawConfiguration) -> Result<(), JobError> {
        let settings = raw.to_settings()?;
        self.on_configuration_change(settings).await
    }

    async fn shutdown(&self, timeout: Duration) -> Result<(), JobError> {
        self.stop(timeout).await
    }
}

#[derive(Default)]
pub struct JobManager {
    jobs: Mutex<Vec<Arc<dyn ManagedJob>>>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job(&self, job: Arc<dyn ManagedJob>) -> Result<(), JobError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if jobs.iter().any(|j| j.id() == job.id()) {
            return Err(JobError::Duplicate(job.id().to_string()));
        }
        info!(job_id = job.id(), "job registered");
        jobs.push(job);
        Ok(())
    }

    pub fn job_ids(&self) -> Vec<String> {
        self.snapshot().iter().map(|j| j.id().to_string()).collect()
    }

    /// Hand new configuration to every job; one job failing does not stop the rest.
    pub async fn on_configuration_change(&self, raw: &RawConfiguration) -> Result<(), JobError> {
        let mut errors = Vec::new();
        for job in self.snapshot() {
            if let Err(err) = job.apply_configuration(raw).await {
                error!(job_id = job.id(), error = %err, "cannot apply configuration");
                errors.push(err);
            }
        }
        JobError::aggregate(errors)
    }

    /// Stop every job, waiting up to `timeout` for each.
    pub async fn close(&self, timeout: Duration) -> Result<(), JobError> {
        let mut errors = Vec::new();
        for job in self.snapshot() {
            if let Err(err) = job.shutdown(timeout).await {
                error!(job_id = job.id(), error = %err, "error stopping job");
                errors.push(err);
            }
        }
        JobError::aggregate(errors)
    }

    fn snapshot(&self) -> Vec<Arc<dyn ManagedJob>> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use retention_core::ConfigError;

    struct FakeJob {
        id: String,
        fail_config: bool,
        fail_shutdown: bool,
        applied: AtomicUsize,
        shutdowns: AtomicUsize,
    }

    impl FakeJob {
        fn new(id: &str) -> Self {
            Self {
                id: id.to_string(),
                fail_config: false,
                fail_shutdown: false,
                applied: AtomicUsize::new(0),
                shutdowns: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ManagedJob for FakeJob {
        fn id(&self) -> &str {
            &self.id
        }

        async fn apply_configuration(&self, _raw: &RawConfiguration) -> Result<(), JobError> {
            self.applied.fetch_add(1, Ordering::SeqCst);
            if self.fail_config {
                Err(ConfigError::InvalidFrequency("hourly".into()).into())
            } else {
                Ok(())
            }
        }

        async fn shutdown(&self, timeout: Duration) -> Result<(), JobError> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.fail_shutdown {
                Err(JobError::StopTimeout(timeout))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let manager = JobManager::new();
        manager.add_job(Arc::new(FakeJob::new("a"))).unwrap();
        manager.add_job(Arc::new(FakeJob::new("b"))).unwrap();

        let err = manager.add_job(Arc::new(FakeJob::new("a"))).unwrap_err();
        assert!(matches!(err, JobError::Duplicate(id) if id == "a"));
        assert_eq!(manager.job_ids(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn configuration_reaches_every_job_despite_failures() {
        let manager = JobManager::new();
        let failing = Arc::new(FakeJob {
            fail_config: true,
            ..FakeJob::new("failing")
        });
        let healthy = Arc::new(FakeJob::new("healthy"));
        manager.add_job(failing.clone()).unwrap();
        manager.add_job(healthy.clone()).unwrap();

        let err = manager
            .on_configuration_change(&RawConfiguration::default())
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Config(ConfigError::InvalidFrequency(_))));
        assert_eq!(failing.applied.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.applied.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_aggregates_shutdown_errors() {
        let manager = JobManager::new();
        for id in ["a", "b", "c"] {
            manager
                .add_job(Arc::new(FakeJob {
                    fail_shutdown: id != "b",
                    ..FakeJob::new(id)
                }))
                .unwrap();
        }

        let err = manager.close(Duration::from_secs(2)).await.unwrap_err();
        match err {
            JobError::Multiple(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected aggregated errors, got {other:?}"),
        }
    }
}
