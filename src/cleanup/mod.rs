//! Cleanup engine: work queue, eviction policy and the background worker.

pub mod candidates;
pub mod counters;
pub mod facade;
pub mod item;
pub mod policy;
pub mod queue;
pub mod scheduler;
pub mod tasks;
pub mod telemetry;


// Re-export main types
pub use counters::{CleanupStats, Counters};
pub use facade::{CleanupFacade, Collaborators};
pub use item::{CandidateSource, WorkItem, WorkKind};
pub use policy::{EvictionPolicy, OverTarget, RecencyWindow, Tier};
pub use queue::WorkQueue;
pub use scheduler::{CleanupScheduler, SchedulerState};
pub use tasks::TaskRunner;
