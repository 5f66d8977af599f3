//! Background eviction for an on-disk cache of derived files.
//!
//! The surrounding cache reports hits and misses to a [`CleanupFacade`];
//! a single background worker per cache root trims folders back toward a
//! target size while the cache is quiet.

#[cfg(test)]
mod tests;

#[cfg(test)]
pub use tests::support;

pub mod cleanup;
pub mod config;
pub mod error;
pub mod index;
pub mod issues;
pub mod lock;
pub mod shutdown;

pub use cleanup::{CleanupFacade, CleanupStats, Collaborators, SchedulerState, WorkItem, WorkKind};
pub use config::{CleanupConfig, Config};
pub use error::CleanupError;
