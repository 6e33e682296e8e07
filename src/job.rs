//! Job data model: priority, affinity, lifecycle state, and the closure + result
//! a [`crate::scheduler::JobScheduler`] slot carries.

use crate::handle::Handle;
use crate::sync_point::SyncPoint;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum JobPriority {
    Low = 0,
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl JobPriority {
    pub const ALL: [JobPriority; 4] = [
        JobPriority::Critical,
        JobPriority::High,
        JobPriority::Normal,
        JobPriority::Low,
    ];

    pub(crate) fn slot(self) -> usize {
        match self {
            JobPriority::Critical => 0,
            JobPriority::High => 1,
            JobPriority::Normal => 2,
            JobPriority::Low => 3,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JobAffinity {
    AnyWorker,
    MainThreadOnly,
    SpecificWorker(u32),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum JobStatus {
    Success = 0,
    Failed = 1,
    Cancelled = 2,
}

impl JobStatus {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => JobStatus::Success,
            1 => JobStatus::Failed,
            _ => JobStatus::Cancelled,
        }
    }
}

#[derive(Clone, Debug)]
pub struct JobResult {
    pub status: JobStatus,
    pub error_message: String,
}

impl JobResult {
    pub fn success() -> Self {
        Self {
            status: JobStatus::Success,
            error_message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            error_message: message.into(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Cancelled,
            error_message: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}

/// Lifecycle marker for a job slot. `Completed`/`CompletedN1`/`CompletedN2` are the
/// only states eligible for eviction under storage pressure; aging between them is
/// driven by the scheduler's `begin_frame`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    Pending = 0,
    Ready = 1,
    Executing = 2,
    Completed = 3,
    CompletedN1 = 4,
    CompletedN2 = 5,
    Cancelled = 6,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => JobState::Pending,
            1 => JobState::Ready,
            2 => JobState::Executing,
            3 => JobState::Completed,
            4 => JobState::CompletedN1,
            5 => JobState::CompletedN2,
            _ => JobState::Cancelled,
        }
    }
}

#[derive(Default)]
pub(crate) struct JobTiming {
    pub submitted_at: Option<Instant>,
    pub started_at: Option<Instant>,
    pub completed_at: Option<Instant>,
}

pub(crate) type JobClosure = Box<dyn FnOnce() -> JobResult + Send>;

/// A unit of work owned exclusively by the scheduler's job `FixedStorage`. State is
/// atomic; the closure, result and timestamps live behind a mutex because, per the
/// storage's contract, slot contents are not otherwise protected from concurrent
/// access.
pub struct Job {
    state: AtomicU8,
    pub(crate) closure: Mutex<Option<JobClosure>>,
    pub(crate) signal_on_completion: Handle<SyncPoint>,
    pub(crate) priority: JobPriority,
    pub(crate) affinity: JobAffinity,
    pub(crate) result: Mutex<Option<JobResult>>,
    pub(crate) debug_name: String,
    pub(crate) timing: Mutex<JobTiming>,
}

impl Job {
    pub(crate) fn new(
        closure: JobClosure,
        signal_on_completion: Handle<SyncPoint>,
        priority: JobPriority,
        affinity: JobAffinity,
        debug_name: String,
    ) -> Self {
        Self {
            state: AtomicU8::new(JobState::Pending as u8),
            closure: Mutex::new(Some(closure)),
            signal_on_completion,
            priority,
            affinity,
            result: Mutex::new(None),
            debug_name,
            timing: Mutex::new(JobTiming {
                submitted_at: Some(Instant::now()),
                started_at: None,
                completed_at: None,
            }),
        }
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: JobState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn compare_exchange_state(&self, current: JobState, new: JobState) -> bool {
        self.state
            .compare_exchange(current as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn priority(&self) -> JobPriority {
        self.priority
    }

    pub fn affinity(&self) -> JobAffinity {
        self.affinity
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub fn result(&self) -> Option<JobResult> {
        self.result.lock().clone()
    }

    pub(crate) fn set_result(&self, result: JobResult) {
        *self.result.lock() = Some(result);
    }
}
