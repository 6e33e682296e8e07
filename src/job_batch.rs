//! Client-side convenience for fanning several jobs into one barrier without
//! hand-managing a sync point. Collects closures, then submits all of them
//! against a single freshly created [`SyncPoint`] sized to the batch.

use crate::handle::Handle;
use crate::job::{Job, JobAffinity, JobPriority, JobResult};
use crate::scheduler::JobScheduler;
use crate::sync_point::SyncPoint;

struct PendingJob {
    debug_name: String,
    priority: JobPriority,
    affinity: JobAffinity,
    closure: Box<dyn FnOnce() -> JobResult + Send>,
}

#[derive(Default)]
pub struct JobBatch {
    pending: Vec<PendingJob>,
}

impl JobBatch {
    pub fn new() -> Self {
        Self { pending: Vec::new() }
    }

    pub fn add(
        &mut self,
        debug_name: impl Into<String>,
        priority: JobPriority,
        affinity: JobAffinity,
        closure: impl FnOnce() -> JobResult + Send + 'static,
    ) -> &mut Self {
        self.pending.push(PendingJob {
            debug_name: debug_name.into(),
            priority,
            affinity,
            closure: Box::new(closure),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Submit every collected job against a new sync point sized to the batch.
    /// Returns `None` only if the sync point itself could not be allocated. If job
    /// storage runs out partway through, the barrier's target is corrected down to
    /// the number of jobs actually submitted and returned as `Some` — the caller
    /// still gets a barrier that signals correctly, just for fewer jobs than asked.
    pub fn submit<const MAX_JOBS: usize, const MAX_SYNC_POINTS: usize>(
        self,
        scheduler: &JobScheduler<MAX_JOBS, MAX_SYNC_POINTS>,
    ) -> Option<Handle<SyncPoint>> {
        if self.pending.is_empty() {
            return Some(scheduler.create_sync_point(0, "empty-batch"));
        }
        let barrier = scheduler.create_sync_point(self.pending.len() as u32, "job-batch");
        if !barrier.is_valid() {
            return None;
        }
        let total = self.pending.len() as u32;
        let mut submitted: Vec<Handle<Job>> = Vec::with_capacity(self.pending.len());
        for job in self.pending {
            match scheduler.submit_with_signal(barrier, job.debug_name, job.priority, job.affinity, job.closure) {
                Some(handle) => submitted.push(handle),
                None => {
                    // Ran out of job slots partway through. The barrier was sized for
                    // `total` decrements but only `submitted.len()` jobs were actually
                    // queued, so correct its target down to match — jobs already
                    // submitted (possibly already running) still decrement it exactly
                    // once each, and it reaches zero without anyone having to cancel it.
                    let unsubmitted = total - submitted.len() as u32;
                    scheduler.correct_sync_point_target(barrier, unsubmitted);
                    return Some(barrier);
                }
            }
        }
        Some(barrier)
    }

    /// Discard the batch without submitting anything.
    pub fn cancel(self) {
        drop(self);
    }
}
