//! Scheduling and result primitives for the stale channel archiver.
//!
//! This crate contains **pure** logic (no runtime, storage or I/O concerns).

pub mod error;
pub mod recurrence;
pub mod resource;
pub mod result;
pub mod settings;

pub use error::{ActionError, ConfigError, ConfigResult, FetchError};
pub use recurrence::{Frequency, TimeOfDay, weekday_from_index};
pub use resource::{ResourceKind, ResourceRef, StaleResourceQuery};
pub use result::{ArchiveResult, ArchiveWarning, ExitReason};
pub use settings::{
    DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE, MIN_AGE_IN_DAYS, MIN_BATCH_SIZE, RecurrenceSettings,
};
