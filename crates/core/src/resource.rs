//! Channel references and the stale-channel query.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::RecurrenceSettings;

/// A channel as returned by the stale-channel source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// `true` when `entry` names this channel by id or by name.
    pub fn matches(&self, entry: &str) -> bool {
        self.id == entry || self.name == entry
    }
}

impl core::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.id, self.name)
    }
}

/// Channel types the query may include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Open,
    Private,
    Direct,
    Group,
}

/// Criteria used to ask the source for stale candidates.
///
/// Derived from [`RecurrenceSettings`]; pagination is passed separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleResourceQuery {
    /// Channels with no activity newer than this many days are stale.
    pub age_threshold_days: u32,
    pub include_open: bool,
    pub include_private: bool,
    pub include_direct: bool,
    pub include_group: bool,
    /// Channel names or ids that are never returned.
    pub excluded: BTreeSet<String>,
}

impl StaleResourceQuery {
    /// Query for open and private channels only.
    pub fn new(age_threshold_days: u32) -> Self {
        Self {
            age_threshold_days,
            include_open: true,
            include_private: true,
            include_direct: false,
            include_group: false,
            excluded: BTreeSet::new(),
        }
    }

    /// The query the scheduled job uses for `settings`.
    pub fn from_settings(settings: &RecurrenceSettings) -> Self {
        Self::new(settings.age_threshold_days).with_excluded(settings.excluded.iter().cloned())
    }

    pub fn with_excluded<I, S>(mut self, excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(excluded.into_iter().map(Into::into));
        self
    }

    pub fn with_kind(mut self, kind: ResourceKind, include: bool) -> Self {
        match kind {
            ResourceKind::Open => self.include_open = include,
            ResourceKind::Private => self.include_private = include,
            ResourceKind::Direct => self.include_direct = include,
            ResourceKind::Group => self.include_group = include,
        }
        self
    }

    pub fn includes(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Open => self.include_open,
            ResourceKind::Private => self.include_private,
            ResourceKind::Direct => self.include_direct,
            ResourceKind::Group => self.include_group,
        }
    }

    pub fn is_excluded(&self, resource: &ResourceRef) -> bool {
        self.excluded.iter().any(|entry| resource.matches(entry))
    }

    /// Activity older than this instant makes a channel stale.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::days(i64::from(self.age_threshold_days))
    }
}
