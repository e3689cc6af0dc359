//! Stale channel discovery and batch archiving.
//!
//! ## Components
//!
//! - `StaleResourceSource`, `ActionExecutor`, `Notifier`: collaborator seams
//! - `BatchArchiver`: paginated fetch + per-channel archive
//! - `InMemoryChannelStore`, `InMemoryNotifier`: in-process implementations

pub mod archiver;
pub mod in_memory;
pub mod source;

pub use archiver::{ArchiverOpts, BatchArchiver, ItemFailurePolicy, Pacing, ProgressFn};
pub use in_memory::{ChannelRecord, InMemoryChannelStore, InMemoryNotifier};
pub use source::{ActionExecutor, Notifier, StalePage, StaleResourceSource};
