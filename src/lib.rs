//! Handle-indexed job scheduling and event dispatch substrate.
//!
//! Three layers build on each other:
//! - [`storage`] / [`handle`]: generational, lock-free fixed-capacity slots.
//! - [`job`] / [`sync_point`] / [`scheduler`] / [`job_batch`]: a priority job
//!   scheduler with dependency-based continuations.
//! - [`event`] / [`event_system`]: type-indexed pub/sub dispatch, optionally
//!   riding the scheduler for `Async` events.
//!
//! [`logger`], [`thread`], [`error`] and [`sync_cell`] are the ambient support
//! the rest of the crate is built on.

pub mod error;
pub mod event;
pub mod event_system;
pub mod handle;
pub mod job;
pub mod job_batch;
pub mod logger;
pub mod scheduler;
mod storage;
pub mod sync_cell;
pub mod sync_point;
pub mod thread;

pub use error::InitError;
pub use event::{Event, EventCategory, EventMetadata, EventTraits, EventTypeId, ExecutionMode, JobPriorityHint, SourceLocation};
pub use event_system::{DeferredEventStats, EventSystem, EventSystemConfig, EventSystemStats, Subscription};
pub use handle::Handle;
pub use job::{Job, JobAffinity, JobPriority, JobResult, JobState, JobStatus};
pub use job_batch::JobBatch;
pub use scheduler::{
    DefaultJobScheduler, JobScheduler, MainThreadJobStats, PerPriorityCounts, QueueLengths, SchedulerConfig,
    SchedulerStats, Submission, SubmissionResult, SubmitOutcome,
};
pub use sync_point::SyncPoint;
