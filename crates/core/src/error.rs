//! Error model for settings validation and collaborator failures.

use thiserror::Error;

/// Result type used when building or validating recurrence settings.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Invalid archiver settings.
///
/// Raised at configuration time only. The job does not start and the error is
/// surfaced to the administrator; it is never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The inactivity threshold is below the supported minimum.
    #[error("`Days of inactivity` cannot be less than {min}")]
    AgeTooSmall { min: u32 },

    #[error("invalid frequency: '{0}' is not a valid frequency")]
    InvalidFrequency(String),

    #[error("cannot parse `Day of week`: {0}")]
    InvalidWeekday(String),

    #[error("cannot parse `Time of day`: {0}")]
    InvalidTimeOfDay(String),

    #[error("`Batch size` cannot be less than {min} or more than {max}")]
    BatchSizeOutOfRange { min: usize, max: usize },
}

impl ConfigError {
    pub fn invalid_weekday(msg: impl Into<String>) -> Self {
        Self::InvalidWeekday(msg.into())
    }

    pub fn invalid_time_of_day(msg: impl Into<String>) -> Self {
        Self::InvalidTimeOfDay(msg.into())
    }
}

/// A page of stale candidates could not be fetched.
///
/// Fatal to the current run only; the next scheduled run still happens.
#[derive(Debug, Error)]
#[error("cannot fetch stale channels (page offset {offset}): {source}")]
pub struct FetchError {
    pub offset: usize,
    #[source]
    pub source: anyhow::Error,
}

impl FetchError {
    pub fn new(offset: usize, source: impl Into<anyhow::Error>) -> Self {
        Self {
            offset,
            source: source.into(),
        }
    }
}

/// The destructive action failed for a single resource.
///
/// Recorded as a warning on the run result; the batch keeps going.
#[derive(Debug, Error)]
#[error("cannot archive channel {resource}: {source}")]
pub struct ActionError {
    pub resource: String,
    #[source]
    pub source: anyhow::Error,
}

impl ActionError {
    pub fn new(resource: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            resource: resource.into(),
            source: source.into(),
        }
    }
}
