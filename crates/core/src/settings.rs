//! Typed archiver settings.

use std::collections::BTreeSet;

use chrono::{NaiveTime, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::recurrence::{Frequency, TimeOfDay};

pub const MIN_AGE_IN_DAYS: u32 = 1;
pub const MIN_BATCH_SIZE: usize = 5;
pub const MAX_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Settings for the recurring archiver job.
///
/// Values are replaced wholesale on configuration change. Running code always
/// works on its own clone, never on the supervisor's live copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceSettings {
    pub enabled: bool,
    pub age_threshold_days: u32,
    pub frequency: Frequency,
    /// Ignored for [`Frequency::Daily`].
    pub target_weekday: Weekday,
    pub time_of_day: TimeOfDay,
    /// Channel names or ids that are never archived.
    pub excluded: BTreeSet<String>,
    pub batch_size: usize,
}

impl RecurrenceSettings {
    /// Settings for a job that should not be scheduled.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            age_threshold_days: MIN_AGE_IN_DAYS,
            frequency: Frequency::Weekly,
            target_weekday: Weekday::Sun,
            time_of_day: TimeOfDay::new(NaiveTime::MIN, Utc.fix()),
            excluded: BTreeSet::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Check the invariants the job relies on.
    ///
    /// Disabled settings are always valid; nothing is scheduled from them.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.age_threshold_days < MIN_AGE_IN_DAYS {
            return Err(ConfigError::AgeTooSmall {
                min: MIN_AGE_IN_DAYS,
            });
        }
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(ConfigError::BatchSizeOutOfRange {
                min: MIN_BATCH_SIZE,
                max: MAX_BATCH_SIZE,
            });
        }
        Ok(())
    }
}

impl Default for RecurrenceSettings {
    fn default() -> Self {
        Self::disabled()
    }
}

impl core::fmt::Display for RecurrenceSettings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "enabled={}; ageDays={}; freq={}; dow={}; tod={}; batchSize={}; excludeLen={}",
            self.enabled,
            self.age_threshold_days,
            self.frequency,
            self.target_weekday,
            self.time_of_day,
            self.batch_size,
            self.excluded.len()
        )
    }
}
