//! Capability seams the archiver consumes from the host platform.
//!
//! Implementations report failures as opaque [`anyhow::Error`]s; the archiver
//! decides whether a failure is fatal (fetch) or a per-channel warning (action).

use async_trait::async_trait;

use retention_core::{ResourceRef, StaleResourceQuery};

/// One page of stale candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StalePage {
    /// Candidates in a stable order (by id).
    pub items: Vec<ResourceRef>,
    /// More candidates exist past this page.
    pub has_more: bool,
}

impl StalePage {
    pub fn new(items: Vec<ResourceRef>, has_more: bool) -> Self {
        Self { items, has_more }
    }
}

/// Paginated query for channels inactive beyond the query's age threshold.
#[async_trait]
pub trait StaleResourceSource: Send + Sync + 'static {
    /// Fetch up to `page_size` candidates starting at `offset`.
    ///
    /// Implementations should ask their backend for `page_size + 1` rows and
    /// use the extra row only to set `has_more`.
    async fn get_stale_resources(
        &self,
        query: &StaleResourceQuery,
        offset: usize,
        page_size: usize,
    ) -> anyhow::Result<StalePage>;
}

/// The destructive action applied to a stale channel.
#[async_trait]
pub trait ActionExecutor: Send + Sync + 'static {
    async fn archive(&self, channel_id: &str) -> anyhow::Result<()>;
}

/// Best-effort announcement posted to a channel before it is archived.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn post(&self, channel_id: &str, message: &str) -> anyhow::Result<()>;
}
