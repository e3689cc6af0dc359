//! Runtime side of the stale channel archiver: collaborator seams, the batch
//! archiver, job supervision and configuration loading.

pub mod channels;
pub mod config;
pub mod jobs;
