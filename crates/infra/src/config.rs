//! Raw administrator configuration and its conversion to typed settings.
//!
//! The raw form mirrors what an administrator edits: strings and integers,
//! camelCase keys. [`RawConfiguration::to_settings`] is the only way to turn it
//! into a [`RecurrenceSettings`].

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use retention_core::{
    ConfigError, ConfigResult, DEFAULT_BATCH_SIZE, Frequency, MAX_BATCH_SIZE, MIN_AGE_IN_DAYS,
    MIN_BATCH_SIZE, RecurrenceSettings, TimeOfDay, weekday_from_index,
};

/// Prefix for environment overrides, e.g. `RETENTION_AGE_IN_DAYS`.
pub const ENV_PREFIX: &str = "RETENTION_";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("invalid configuration json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for {var}: {message}")]
    Env { var: String, message: String },

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawConfiguration {
    pub enable_channel_archiver: bool,
    pub age_in_days: i64,
    /// `daily`, `weekly` or `monthly`.
    pub frequency: String,
    /// 0 (Sunday) through 6 (Saturday).
    pub day_of_week: String,
    /// e.g. `1:00am -0700`.
    pub time_of_day: String,
    /// Channel names or ids, comma or space separated.
    pub exclude_channels: String,
    pub batch_size: i64,
}

impl Default for RawConfiguration {
    fn default() -> Self {
        Self {
            enable_channel_archiver: false,
            age_in_days: 30,
            frequency: Frequency::Weekly.as_str().to_string(),
            day_of_week: "0".to_string(),
            time_of_day: "1:00am UTC".to_string(),
            exclude_channels: String::new(),
            batch_size: DEFAULT_BATCH_SIZE as i64,
        }
    }
}

impl RawConfiguration {
    pub fn from_json(json: &str) -> Result<Self, ConfigLoadError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overridden by `RETENTION_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        Self::from_vars(std::env::vars())
    }

    /// Defaults overridden by `RETENTION_*` entries of `vars`.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigLoadError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        let get = |key: &str| vars.get(&format!("{ENV_PREFIX}{key}")).cloned();

        let mut cfg = Self::default();
        if let Some(v) = get("ENABLE_CHANNEL_ARCHIVER") {
            cfg.enable_channel_archiver = parse_env_bool("ENABLE_CHANNEL_ARCHIVER", &v)?;
        }
        if let Some(v) = get("AGE_IN_DAYS") {
            cfg.age_in_days = parse_env_int("AGE_IN_DAYS", &v)?;
        }
        if let Some(v) = get("FREQUENCY") {
            cfg.frequency = v;
        }
        if let Some(v) = get("DAY_OF_WEEK") {
            cfg.day_of_week = v;
        }
        if let Some(v) = get("TIME_OF_DAY") {
            cfg.time_of_day = v;
        }
        if let Some(v) = get("EXCLUDE_CHANNELS") {
            cfg.exclude_channels = v;
        }
        if let Some(v) = get("BATCH_SIZE") {
            cfg.batch_size = parse_env_int("BATCH_SIZE", &v)?;
        }
        Ok(cfg)
    }

    /// Validate and convert. A disabled configuration converts without
    /// looking at the other fields.
    pub fn to_settings(&self) -> ConfigResult<RecurrenceSettings> {
        if !self.enable_channel_archiver {
            return Ok(RecurrenceSettings::disabled());
        }

        if self.age_in_days < i64::from(MIN_AGE_IN_DAYS) {
            return Err(ConfigError::AgeTooSmall {
                min: MIN_AGE_IN_DAYS,
            });
        }
        let age_threshold_days =
            u32::try_from(self.age_in_days).map_err(|_| ConfigError::AgeTooSmall {
                min: MIN_AGE_IN_DAYS,
            })?;

        let frequency: Frequency = self.frequency.parse()?;

        let day_of_week: i64 = self
            .day_of_week
            .trim()
            .parse()
            .map_err(|e| ConfigError::invalid_weekday(format!("{e}")))?;
        let target_weekday = weekday_from_index(day_of_week)?;

        let time_of_day = TimeOfDay::parse(&self.time_of_day)?;

        let batch_size = usize::try_from(self.batch_size)
            .ok()
            .filter(|b| (MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(b))
            .ok_or(ConfigError::BatchSizeOutOfRange {
                min: MIN_BATCH_SIZE,
                max: MAX_BATCH_SIZE,
            })?;

        Ok(RecurrenceSettings {
            enabled: true,
            age_threshold_days,
            frequency,
            target_weekday,
            time_of_day,
            excluded: parse_exclusions(&self.exclude_channels),
            batch_size,
        })
    }
}

/// Split a comma and/or space separated list, dropping empty entries.
pub fn parse_exclusions(raw: &str) -> BTreeSet<String> {
    raw.split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env_bool(key: &str, value: &str) -> Result<bool, ConfigLoadError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigLoadError::Env {
            var: format!("{ENV_PREFIX}{key}"),
            message: format!("'{other}' is not a boolean"),
        }),
    }
}

fn parse_env_int(key: &str, value: &str) -> Result<i64, ConfigLoadError> {
    value.trim().parse().map_err(|e| ConfigLoadError::Env {
        var: format!("{ENV_PREFIX}{key}"),
        message: format!("{e}"),
    })
}
