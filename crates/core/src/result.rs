//! Outcome of an archiver run: archived entries, warnings and exit reason.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ActionError;

/// Why an archiver run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// No further pages.
    Done,
    /// The cancellation signal was observed.
    Cancelled,
    /// A page fetch failed or the run faulted.
    Error,
}

impl core::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ExitReason::Done => "completed normally",
            ExitReason::Cancelled => "canceled",
            ExitReason::Error => "error",
        })
    }
}

/// A non-fatal, per-channel failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveWarning {
    pub resource: String,
    pub message: String,
}

impl From<&ActionError> for ArchiveWarning {
    fn from(err: &ActionError) -> Self {
        Self {
            resource: err.resource.clone(),
            message: format!("{:#}", err.source),
        }
    }
}

impl core::fmt::Display for ArchiveWarning {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.resource, self.message)
    }
}

/// Outcome of one archiver run.
///
/// `archived` holds "id (name)" entries in processing order. In list-only mode
/// it holds the candidates that would have been archived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveResult {
    pub archived: Vec<String>,
    pub exit_reason: ExitReason,
    pub duration: Duration,
    pub warnings: Vec<ArchiveWarning>,
    /// Cause of an [`ExitReason::Error`] exit.
    pub error: Option<String>,
}

impl ArchiveResult {
    pub fn new() -> Self {
        Self {
            archived: Vec::new(),
            exit_reason: ExitReason::Done,
            duration: Duration::ZERO,
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn record_archived(&mut self, entry: impl Into<String>) {
        self.archived.push(entry.into());
    }

    pub fn record_warning(&mut self, err: &ActionError) {
        self.warnings.push(ArchiveWarning::from(err));
    }

    pub fn mark_cancelled(&mut self) {
        self.exit_reason = ExitReason::Cancelled;
    }

    pub fn mark_failed(&mut self, cause: impl Into<String>) {
        self.exit_reason = ExitReason::Error;
        self.error = Some(cause.into());
    }

    pub fn is_done(&self) -> bool {
        self.exit_reason == ExitReason::Done
    }
}

impl Default for ArchiveResult {
    fn default() -> Self {
        Self::new()
    }
}
