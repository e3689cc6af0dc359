//! Recurrence calculation for the archiver schedule.
//!
//! All date arithmetic happens in the fixed UTC offset carried by the
//! configured [`TimeOfDay`]; the previous run time is converted into that
//! offset first, so "1:00am -0700" means 1:00am at -0700 regardless of where
//! the process runs.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Datelike, Days, FixedOffset, Months, NaiveTime, TimeZone, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// How often the archiver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }

    /// Compute the next run time after `last`.
    ///
    /// - Monthly: one calendar month after `last`'s date (clamped to the end of
    ///   the month), then moved forward to `target_weekday`.
    /// - Weekly: seven days after `last`'s date, then moved forward to
    ///   `target_weekday`.
    /// - Daily: the day after `last`'s date; `target_weekday` is ignored.
    ///
    /// The wall-clock time always comes from `time_of_day`. The result is
    /// strictly after `last` because the date advances by at least one day.
    pub fn calc_next<Tz: TimeZone>(
        self,
        last: &DateTime<Tz>,
        target_weekday: Weekday,
        time_of_day: &TimeOfDay,
    ) -> DateTime<FixedOffset> {
        let offset = time_of_day.offset();
        let last_date = last.with_timezone(&offset).date_naive();

        let date = match self {
            Frequency::Monthly => last_date + Months::new(1),
            Frequency::Weekly => last_date + Days::new(7),
            Frequency::Daily => last_date + Days::new(1),
        };

        let date = match self {
            Frequency::Daily => date,
            Frequency::Weekly | Frequency::Monthly => {
                date + Days::new(days_until(date.weekday(), target_weekday))
            }
        };

        let local = date.and_time(time_of_day.time());
        let utc = local - chrono::Duration::seconds(i64::from(offset.local_minus_utc()));
        offset.from_utc_datetime(&utc)
    }
}

/// Days to move forward from `from` to land on `to` (0..=6).
fn days_until(from: Weekday, to: Weekday) -> u64 {
    let from = from.num_days_from_sunday();
    let to = to.num_days_from_sunday();
    if from <= to {
        u64::from(to - from)
    } else {
        u64::from(to + 7 - from)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            _ => Err(ConfigError::InvalidFrequency(s.to_string())),
        }
    }
}

/// Parse a weekday given as 0 (Sunday) through 6 (Saturday).
pub fn weekday_from_index(index: i64) -> ConfigResult<Weekday> {
    match index {
        0 => Ok(Weekday::Sun),
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        other => Err(ConfigError::invalid_weekday(format!(
            "{other} is not between 0 and 6"
        ))),
    }
}

/// Wall-clock time of day with a fixed UTC offset, e.g. `1:00am -0700`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    time: NaiveTime,
    offset: FixedOffset,
}

impl TimeOfDay {
    pub fn new(time: NaiveTime, offset: FixedOffset) -> Self {
        Self { time, offset }
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Parse the `3:04pm -0700` layout. A missing offset, `UTC` or `Z` means UTC.
    pub fn parse(s: &str) -> ConfigResult<Self> {
        let trimmed = s.trim();
        let (clock, zone) = match trimmed.split_once(char::is_whitespace) {
            Some((clock, zone)) => (clock, zone.trim()),
            None => (trimmed, ""),
        };

        let time = NaiveTime::parse_from_str(clock, "%I:%M%p")
            .map_err(|e| ConfigError::invalid_time_of_day(format!("'{s}': {e}")))?;

        let offset = match zone {
            "" | "UTC" | "utc" | "Z" => FixedOffset::east_opt(0),
            zone => parse_offset(zone),
        }
        .ok_or_else(|| ConfigError::invalid_time_of_day(format!("'{s}': bad UTC offset")))?;

        Ok(Self { time, offset })
    }
}

/// Parses `-0700`, `+05:30` and friends.
fn parse_offset(zone: &str) -> Option<FixedOffset> {
    let (sign, digits) = match zone.as_bytes().first()? {
        b'+' => (1, &zone[1..]),
        b'-' => (-1, &zone[1..]),
        _ => return None,
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.offset.local_minus_utc();
        let sign = if secs < 0 { '-' } else { '+' };
        let secs = secs.abs();
        write!(
            f,
            "{} {}{:02}{:02}",
            self.time.format("%-I:%M%P"),
            sign,
            secs / 3600,
            (secs % 3600) / 60
        )
    }
}

impl FromStr for TimeOfDay {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}
