//! Batch archiver: pages through stale channels and archives them.
//!
//! - Pages are fetched `batch_size` at a time; the source signals further pages
//! - A failed archive is a warning; the batch continues (see [`ItemFailurePolicy`])
//! - A failed page fetch ends the run with [`ExitReason::Error`]
//! - Cancellation is checked before every fetch and every channel, and ends
//!   any pause early; work already done is kept
//! - Any panic inside the run is caught and reported as an error result
//!
//! [`ExitReason::Error`]: retention_core::ExitReason::Error

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use retention_core::{
    ActionError, ArchiveResult, DEFAULT_BATCH_SIZE, FetchError, ResourceRef, StaleResourceQuery,
};

use super::source::{ActionExecutor, Notifier, StaleResourceSource};

/// Receives the in-progress result after each page of an archiving run.
pub type ProgressFn = dyn Fn(&ArchiveResult) + Send + Sync;

/// What to do when archiving a single channel fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemFailurePolicy {
    /// Record a warning and move on to the next channel.
    #[default]
    Continue,
    /// End the run with an error.
    Abort,
}

/// Backpressure pauses between destructive actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// After each successfully archived channel.
    pub item_pause: Duration,
    /// After each page; longer so the host can settle.
    pub page_pause: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            item_pause: Duration::from_millis(50),
            page_pause: Duration::from_millis(500),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            item_pause: Duration::ZERO,
            page_pause: Duration::ZERO,
        }
    }
}

/// Options for one archiving run.
#[derive(Debug, Clone)]
pub struct ArchiverOpts {
    pub query: StaleResourceQuery,
    pub batch_size: usize,
    /// Only report candidates; never archive or notify.
    pub list_only: bool,
    pub on_item_failure: ItemFailurePolicy,
}

impl ArchiverOpts {
    pub fn new(query: StaleResourceQuery) -> Self {
        Self {
            query,
            batch_size: DEFAULT_BATCH_SIZE,
            list_only: false,
            on_item_failure: ItemFailurePolicy::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn list_only(mut self) -> Self {
        self.list_only = true;
        self
    }

    pub fn with_item_failure_policy(mut self, policy: ItemFailurePolicy) -> Self {
        self.on_item_failure = policy;
        self
    }
}

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Action(#[from] ActionError),
}

/// Drives paginated fetch + per-channel archive.
#[derive(Clone)]
pub struct BatchArchiver {
    source: Arc<dyn StaleResourceSource>,
    executor: Arc<dyn ActionExecutor>,
    notifier: Option<Arc<dyn Notifier>>,
    pacing: Pacing,
}

impl core::fmt::Debug for BatchArchiver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BatchArchiver")
            .field("notifier", &self.notifier.is_some())
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}

impl BatchArchiver {
    pub fn new(source: Arc<dyn StaleResourceSource>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            source,
            executor,
            notifier: None,
            pacing: Pacing::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Run one archiving pass.
    ///
    /// Never fails: fetch errors, aborting item failures and panics all end up
    /// as an [`ExitReason::Error`](retention_core::ExitReason::Error) result
    /// carrying whatever was accumulated before the failure.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        opts: &ArchiverOpts,
        progress: Option<&ProgressFn>,
    ) -> ArchiveResult {
        let started = Instant::now();
        let mut results = ArchiveResult::new();

        let outcome = AssertUnwindSafe(self.archive_pages(cancel, opts, progress, &mut results))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(error = %err, "channel archiver run failed");
                results.mark_failed(format!("{err:#}"));
            }
            Err(panic) => {
                let cause = panic_message(panic.as_ref());
                error!(panic = %cause, "channel archiver run panicked");
                results.mark_failed(format!("panic recovered: {cause}"));
            }
        }

        results.duration = started.elapsed();
        results
    }

    async fn archive_pages(
        &self,
        cancel: &CancellationToken,
        opts: &ArchiverOpts,
        progress: Option<&ProgressFn>,
        results: &mut ArchiveResult,
    ) -> Result<(), RunError> {
        let batch_size = opts.batch_size.max(1);
        let mut offset = 0usize;
        let mut page_no = 0usize;

        loop {
            if cancel.is_cancelled() {
                results.mark_cancelled();
                return Ok(());
            }

            let mut page = self
                .source
                .get_stale_resources(&opts.query, offset, batch_size)
                .await
                .map_err(|e| FetchError::new(offset, e))?;

            // Trim a sentinel row if the source handed it back.
            if page.items.len() > batch_size {
                page.items.truncate(batch_size);
                page.has_more = true;
            }

            debug!(
                page = page_no,
                offset,
                count = page.items.len(),
                has_more = page.has_more,
                list_only = opts.list_only,
                "fetched stale channel page"
            );

            // Candidates from this page that will still match the query next time.
            let mut still_stale = 0usize;

            for resource in &page.items {
                if opts.list_only {
                    results.record_archived(resource.to_string());
                    still_stale += 1;
                    continue;
                }

                if cancel.is_cancelled() {
                    results.mark_cancelled();
                    return Ok(());
                }

                match self.archive_one(resource, opts.query.age_threshold_days).await {
                    Ok(()) => {
                        results.record_archived(resource.to_string());
                        if !pause(cancel, self.pacing.item_pause).await {
                            results.mark_cancelled();
                            return Ok(());
                        }
                    }
                    Err(err) => {
                        still_stale += 1;
                        match opts.on_item_failure {
                            ItemFailurePolicy::Continue => {
                                warn!(error = %err, "channel archive failed; continuing");
                                results.record_warning(&err);
                            }
                            ItemFailurePolicy::Abort => return Err(err.into()),
                        }
                    }
                }
            }

            if !opts.list_only {
                if let Some(progress) = progress {
                    progress(results);
                }
            }

            if !page.has_more {
                return Ok(());
            }

            offset += still_stale;
            page_no += 1;

            if !pause(cancel, self.pacing.page_pause).await {
                results.mark_cancelled();
                return Ok(());
            }
        }
    }

    async fn archive_one(&self, resource: &ResourceRef, age_days: u32) -> Result<(), ActionError> {
        if let Some(notifier) = &self.notifier {
            if let Err(err) = notifier.post(&resource.id, &archive_notice(age_days)).await {
                warn!(channel = %resource, error = %err, "cannot post archive notice");
            }
        }

        self.executor
            .archive(&resource.id)
            .await
            .map_err(|e| ActionError::new(resource.to_string(), e))
    }
}

fn archive_notice(age_days: u32) -> String {
    format!("This channel has had no activity for {age_days} days and is being archived.")
}

/// Sleep for `duration` unless cancelled first. Returns `false` on cancellation.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};

    use crate::channels::in_memory::{ChannelRecord, InMemoryChannelStore, InMemoryNotifier};
    use crate::channels::source::StalePage;
    use retention_core::{ExitReason, ResourceKind};

    fn store_with(n: usize) -> Arc<InMemoryChannelStore> {
        InMemoryChannelStore::arc((0..n).map(|i| {
            ChannelRecord::new(
                format!("ch{i:03}"),
                format!("stale-{i}"),
                ResourceKind::Open,
                Utc::now() - ChronoDuration::days(90),
            )
        }))
    }

    fn opts(batch_size: usize) -> ArchiverOpts {
        ArchiverOpts::new(StaleResourceQuery::new(30)).with_batch_size(batch_size)
    }

    /// Executor that fails for selected ids and can cancel after N successes.
    struct ScriptedExecutor {
        inner: Arc<InMemoryChannelStore>,
        fail_ids: HashSet<String>,
        cancel_after: Option<(usize, CancellationToken)>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn new(inner: Arc<InMemoryChannelStore>) -> Self {
            Self {
                inner,
                fail_ids: HashSet::new(),
                cancel_after: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ActionExecutor for ScriptedExecutor {
        async fn archive(&self, channel_id: &str) -> anyhow::Result<()> {
            let count = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(channel_id.to_string());
                calls.len()
            };
            if self.fail_ids.contains(channel_id) {
                return Err(anyhow!("permission denied"));
            }
            self.inner.archive(channel_id).await?;
            if let Some((n, token)) = &self.cancel_after {
                if count >= *n {
                    token.cancel();
                }
            }
            Ok(())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl StaleResourceSource for FailingSource {
        async fn get_stale_resources(
            &self,
            _query: &StaleResourceQuery,
            _offset: usize,
            _page_size: usize,
        ) -> anyhow::Result<StalePage> {
            Err(anyhow!("database is locked"))
        }
    }

    struct PanickingExecutor;

    #[async_trait]
    impl ActionExecutor for PanickingExecutor {
        async fn archive(&self, _channel_id: &str) -> anyhow::Result<()> {
            panic!("executor blew up");
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn post(&self, _channel_id: &str, _message: &str) -> anyhow::Result<()> {
            Err(anyhow!("bot is missing"))
        }
    }

    #[tokio::test]
    async fn archives_every_page_in_order() {
        let store = store_with(7);
        let archiver = BatchArchiver::new(store.clone(), store.clone()).with_pacing(Pacing::none());

        let result = archiver.run(&CancellationToken::new(), &opts(3), None).await;

        assert_eq!(result.exit_reason, ExitReason::Done);
        assert_eq!(result.archived.len(), 7);
        assert_eq!(result.archived[0], "ch000 (stale-0)");
        assert_eq!(result.archived[6], "ch006 (stale-6)");
        assert!(result.warnings.is_empty());
        // ceil(7 / 3)
        assert_eq!(store.fetch_count(), 3);
        assert_eq!(store.archived_ids().len(), 7);
    }

    #[tokio::test]
    async fn exact_multiple_of_batch_size_needs_no_extra_fetch() {
        let store = store_with(6);
        let archiver = BatchArchiver::new(store.clone(), store.clone()).with_pacing(Pacing::none());

        let result = archiver.run(&CancellationToken::new(), &opts(3), None).await;

        assert_eq!(result.archived.len(), 6);
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn list_only_never_archives_or_notifies() {
        let store = store_with(5);
        let notifier = Arc::new(InMemoryNotifier::new());
        let archiver = BatchArchiver::new(store.clone(), store.clone())
            .with_notifier(notifier.clone())
            .with_pacing(Pacing::none());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = move |r: &ArchiveResult| sink.lock().unwrap().push(r.archived.len());

        let result = archiver
            .run(&CancellationToken::new(), &opts(2).list_only(), Some(&progress))
            .await;

        assert_eq!(result.exit_reason, ExitReason::Done);
        assert_eq!(result.archived.len(), 5);
        assert_eq!(store.fetch_count(), 3);
        assert!(store.archived_ids().is_empty());
        assert!(notifier.posts().is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_failure_is_a_warning() {
        let store = store_with(5);
        let mut executor = ScriptedExecutor::new(store.clone());
        executor.fail_ids.insert("ch002".to_string());
        let executor = Arc::new(executor);
        let archiver = BatchArchiver::new(store.clone(), executor.clone()).with_pacing(Pacing::none());

        let result = archiver.run(&CancellationToken::new(), &opts(2), None).await;

        assert_eq!(result.exit_reason, ExitReason::Done);
        assert_eq!(result.archived.len(), 4);
        assert!(!result.archived.contains(&"ch002 (stale-2)".to_string()));
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].resource, "ch002 (stale-2)");
        // Every channel was attempted exactly once; the failed one was not skipped over twice.
        assert_eq!(executor.calls(), vec!["ch000", "ch001", "ch002", "ch003", "ch004"]);
    }

    #[tokio::test]
    async fn abort_policy_stops_on_first_failure() {
        let store = store_with(5);
        let mut executor = ScriptedExecutor::new(store.clone());
        executor.fail_ids.insert("ch001".to_string());
        let executor = Arc::new(executor);
        let archiver = BatchArchiver::new(store.clone(), executor.clone()).with_pacing(Pacing::none());

        let opts = opts(10).with_item_failure_policy(ItemFailurePolicy::Abort);
        let result = archiver.run(&CancellationToken::new(), &opts, None).await;

        assert_eq!(result.exit_reason, ExitReason::Error);
        assert_eq!(result.archived, vec!["ch000 (stale-0)".to_string()]);
        assert!(result.error.as_deref().unwrap().contains("permission denied"));
        assert_eq!(executor.calls().len(), 2);
    }

    #[tokio::test]
    async fn fetch_failure_is_fatal() {
        let store = store_with(1);
        let archiver = BatchArchiver::new(Arc::new(FailingSource), store.clone());

        let result = archiver.run(&CancellationToken::new(), &opts(10), None).await;

        assert_eq!(result.exit_reason, ExitReason::Error);
        assert!(result.archived.is_empty());
        assert!(result.error.as_deref().unwrap().contains("database is locked"));
        assert!(store.archived_ids().is_empty());
    }

    #[tokio::test]
    async fn cancellation_after_k_items_stops_further_actions() {
        let store = store_with(10);
        let token = CancellationToken::new();
        let mut executor = ScriptedExecutor::new(store.clone());
        executor.cancel_after = Some((3, token.clone()));
        let executor = Arc::new(executor);
        let archiver = BatchArchiver::new(store.clone(), executor.clone()).with_pacing(Pacing::none());

        let result = archiver.run(&token, &opts(4), None).await;

        assert_eq!(result.exit_reason, ExitReason::Cancelled);
        assert!(result.archived.len() <= 3);
        assert_eq!(executor.calls().len(), 3);
        // Applied actions are not rolled back.
        assert_eq!(store.archived_ids().len(), 3);
    }

    #[tokio::test]
    async fn cancelled_before_start_fetches_nothing() {
        let store = store_with(3);
        let archiver = BatchArchiver::new(store.clone(), store.clone());
        let token = CancellationToken::new();
        token.cancel();

        let result = archiver.run(&token, &opts(10), None).await;

        assert_eq!(result.exit_reason, ExitReason::Cancelled);
        assert_eq!(store.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_page_pause() {
        let store = store_with(4);
        let archiver = BatchArchiver::new(store.clone(), store.clone()).with_pacing(Pacing {
            item_pause: Duration::ZERO,
            page_pause: Duration::from_secs(3600),
        });
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                token.cancel();
            })
        };

        let result = archiver.run(&token, &opts(2), None).await;
        canceller.await.unwrap();

        assert_eq!(result.exit_reason, ExitReason::Cancelled);
        assert_eq!(result.archived.len(), 2);
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn panics_become_error_results() {
        let store = store_with(2);
        let archiver = BatchArchiver::new(store.clone(), Arc::new(PanickingExecutor));

        let result = archiver.run(&CancellationToken::new(), &opts(10), None).await;

        assert_eq!(result.exit_reason, ExitReason::Error);
        assert!(result.error.as_deref().unwrap().contains("executor blew up"));
    }

    #[tokio::test]
    async fn notifier_runs_first_and_its_failures_are_ignored() {
        let store = store_with(2);
        let notifier = Arc::new(InMemoryNotifier::new());
        let archiver = BatchArchiver::new(store.clone(), store.clone())
            .with_notifier(notifier.clone())
            .with_pacing(Pacing::none());

        let result = archiver.run(&CancellationToken::new(), &opts(10), None).await;
        assert_eq!(result.archived.len(), 2);
        let posts = notifier.posts();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].0, "ch000");
        assert!(posts[0].1.contains("30 days"));

        let store = store_with(2);
        let archiver = BatchArchiver::new(store.clone(), store.clone())
            .with_notifier(Arc::new(FailingNotifier))
            .with_pacing(Pacing::none());
        let result = archiver.run(&CancellationToken::new(), &opts(10), None).await;
        assert_eq!(result.exit_reason, ExitReason::Done);
        assert_eq!(result.archived.len(), 2);
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn progress_is_reported_after_each_page() {
        let store = store_with(5);
        let archiver = BatchArchiver::new(store.clone(), store.clone()).with_pacing(Pacing::none());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = move |r: &ArchiveResult| sink.lock().unwrap().push(r.archived.len());

        archiver
            .run(&CancellationToken::new(), &opts(2), Some(&progress))
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![2, 4, 5]);
    }
}
