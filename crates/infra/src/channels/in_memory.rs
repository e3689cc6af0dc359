//! In-memory channel store and notifier for tests/dev.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use retention_core::{ResourceKind, ResourceRef, StaleResourceQuery};

use super::source::{ActionExecutor, Notifier, StalePage, StaleResourceSource};

/// A channel as the in-memory store sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub id: String,
    pub name: String,
    pub kind: ResourceKind,
    /// Newest post or reaction activity in the channel.
    pub last_activity: DateTime<Utc>,
    pub archived: bool,
}

impl ChannelRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ResourceKind,
        last_activity: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            last_activity,
            archived: false,
        }
    }

    pub fn to_resource_ref(&self) -> ResourceRef {
        ResourceRef::new(self.id.clone(), self.name.clone())
    }
}

/// Channel store backed by a vector.
///
/// Archived channels stop matching the stale query, the same way a real
/// backend filters on its delete marker.
#[derive(Debug, Default)]
pub struct InMemoryChannelStore {
    channels: RwLock<Vec<ChannelRecord>>,
    fetches: AtomicUsize,
}

impl InMemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channels(channels: impl IntoIterator<Item = ChannelRecord>) -> Self {
        Self {
            channels: RwLock::new(channels.into_iter().collect()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn arc(channels: impl IntoIterator<Item = ChannelRecord>) -> Arc<Self> {
        Arc::new(Self::with_channels(channels))
    }

    pub fn insert(&self, channel: ChannelRecord) {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(channel);
    }

    pub fn get(&self, id: &str) -> Option<ChannelRecord> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn archived_ids(&self) -> Vec<String> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.archived)
            .map(|c| c.id.clone())
            .collect()
    }

    /// Number of page fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn stale_at(&self, query: &StaleResourceQuery, now: DateTime<Utc>) -> Vec<ResourceRef> {
        let cutoff = query.cutoff(now);
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);

        let mut stale: Vec<ResourceRef> = channels
            .iter()
            .filter(|c| !c.archived)
            .filter(|c| query.includes(c.kind))
            .filter(|c| c.last_activity < cutoff)
            .map(ChannelRecord::to_resource_ref)
            .filter(|r| !query.is_excluded(r))
            .collect();
        stale.sort_by(|a, b| a.id.cmp(&b.id));
        stale
    }
}

#[async_trait]
impl StaleResourceSource for InMemoryChannelStore {
    async fn get_stale_resources(
        &self,
        query: &StaleResourceQuery,
        offset: usize,
        page_size: usize,
    ) -> anyhow::Result<StalePage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        // N+1 to check if there's a next page.
        let mut items: Vec<ResourceRef> = self
            .stale_at(query, Utc::now())
            .into_iter()
            .skip(offset)
            .take(page_size.saturating_add(1))
            .collect();

        let has_more = items.len() > page_size;
        items.truncate(page_size);
        Ok(StalePage::new(items, has_more))
    }
}

#[async_trait]
impl ActionExecutor for InMemoryChannelStore {
    async fn archive(&self, channel_id: &str) -> anyhow::Result<()> {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let channel = channels
            .iter_mut()
            .find(|c| c.id == channel_id)
            .ok_or_else(|| anyhow!("channel {channel_id} not found"))?;

        if channel.archived {
            bail!("channel {channel_id} is already archived");
        }
        channel.archived = true;
        Ok(())
    }
}

/// Notifier that records every post.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    posts: Mutex<Vec<(String, String)>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(channel_id, message)` pairs in posting order.
    pub fn posts(&self) -> Vec<(String, String)> {
        self.posts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn post(&self, channel_id: &str, message: &str) -> anyhow::Result<()> {
        self.posts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((channel_id.to_string(), message.to_string()));
        Ok(())
    }
}
