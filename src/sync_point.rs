//! A reference-counted-by-dependency-count synchronization barrier. Continuations
//! are claimed lock-free into a small inline array; the rare case of more than
//! [`INLINE_CONTINUATIONS`] dependents spills into a mutex-protected overflow
//! list (the reference design uses a hand-rolled atomic spinlock here; a
//! `parking_lot::Mutex` is the idiomatic stand-in the rest of this crate already
//! leans on for every other lock).

use crate::job::{Job, JobResult, JobStatus};
use crate::handle::{Handle, INVALID_INDEX};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::time::Instant;

pub const INLINE_CONTINUATIONS: usize = 6;

fn invalid_bits() -> u32 {
    Handle::<Job>::invalid().to_bits()
}

pub struct SyncPoint {
    counter: AtomicU32,
    status: AtomicU8,
    inline: [AtomicU32; INLINE_CONTINUATIONS],
    inline_count: AtomicU32,
    overflow: Mutex<Vec<Handle<Job>>>,
    pub debug_name: String,
    pub creation_time: Instant,
}

impl SyncPoint {
    pub(crate) fn new(initial_count: u32, name: impl Into<String>) -> Self {
        Self {
            counter: AtomicU32::new(initial_count),
            status: AtomicU8::new(JobStatus::Success as u8),
            inline: std::array::from_fn(|_| AtomicU32::new(invalid_bits())),
            inline_count: AtomicU32::new(0),
            overflow: Mutex::new(Vec::new()),
            debug_name: name.into(),
            creation_time: Instant::now(),
        }
    }

    pub fn counter(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }

    pub fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_signaled(&self) -> bool {
        self.counter() == 0
    }

    /// Decrement the counter, degrading status first if `result` is not success.
    /// Returns `true` iff this call drove the counter from 1 to 0 — the caller is
    /// responsible for running completion processing exactly once in that case.
    pub(crate) fn decrement_and_check(&self, result: &JobResult) -> bool {
        if result.status != JobStatus::Success {
            self.propagate_failure(result.status);
        }
        let previous = self.counter.fetch_sub(1, Ordering::AcqRel);
        previous == 1
    }

    /// Force the counter to zero and stamp `Cancelled`, for user-initiated cancel.
    /// Returns whether this call is the one that drove the counter to zero, so the
    /// caller runs completion processing at most once even if the sync point had
    /// already signaled naturally.
    pub(crate) fn force_cancel(&self) -> bool {
        let previous = self.counter.swap(0, Ordering::AcqRel);
        if previous != 0 {
            self.status.store(JobStatus::Cancelled as u8, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Lower how many decrements this sync point is still waiting for, for when
    /// a caller that reserved `amount` extra slots up front (a batch submission)
    /// ends up never actually running some of them. Unlike [`Self::force_cancel`],
    /// this never touches `status` and never zeroes the counter outright — it
    /// only accounts for jobs that were never submitted, so jobs that already
    /// were submitted keep decrementing the same counter exactly once each.
    /// Using `force_cancel` here instead would zero a counter that already-running
    /// jobs are still going to decrement, underflowing it past zero.
    /// Returns whether this correction is the one that drove the counter to zero.
    pub(crate) fn reduce_target(&self, amount: u32) -> bool {
        if amount == 0 {
            return false;
        }
        let previous = self.counter.fetch_sub(amount, Ordering::AcqRel);
        previous == amount
    }

    fn propagate_failure(&self, failure_status: JobStatus) {
        let expected = JobStatus::Success as u8;
        let _ = self.status.compare_exchange(
            expected,
            failure_status as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        // A failed CAS means another job already degraded the status first; fine.
    }

    pub(crate) fn add_continuation(&self, handle: Handle<Job>) {
        let mut current = self.inline_count.load(Ordering::Relaxed);
        while (current as usize) < INLINE_CONTINUATIONS {
            match self.inline_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.inline[current as usize].store(handle.to_bits(), Ordering::Release);
                    return;
                }
                Err(actual) => current = actual,
            }
        }
        self.overflow.lock().push(handle);
    }

    /// Collect every continuation registered so far. Called exactly once, when
    /// the counter transitions 1 → 0.
    pub(crate) fn take_continuations(&self) -> Vec<Handle<Job>> {
        let count = (self.inline_count.load(Ordering::Acquire) as usize).min(INLINE_CONTINUATIONS);
        let mut result = Vec::with_capacity(count);
        for slot in self.inline.iter().take(count) {
            let bits = slot.load(Ordering::Acquire);
            let handle = Handle::<Job>::from_bits(bits);
            if handle.index() != INVALID_INDEX {
                result.push(handle);
            }
        }
        result.extend(self.overflow.lock().drain(..));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobResult;

    #[test]
    fn decrement_to_zero_reports_only_once() {
        let sp = SyncPoint::new(2, "test");
        assert!(!sp.decrement_and_check(&JobResult::success()));
        assert!(sp.decrement_and_check(&JobResult::success()));
        assert!(sp.is_signaled());
        assert_eq!(sp.status(), JobStatus::Success);
    }

    #[test]
    fn first_failure_wins_and_status_never_improves() {
        let sp = SyncPoint::new(2, "test");
        sp.decrement_and_check(&JobResult::failed("first"));
        assert_eq!(sp.status(), JobStatus::Failed);
        sp.decrement_and_check(&JobResult::cancelled("second"));
        assert_eq!(sp.status(), JobStatus::Failed, "status must not un-degrade");
    }

    #[test]
    fn reduce_target_lets_already_submitted_decrements_still_reach_zero() {
        let sp = SyncPoint::new(3, "test");
        // Only 1 of 3 reserved slots was actually submitted.
        assert!(!sp.reduce_target(2));
        assert!(!sp.is_signaled());
        assert!(sp.decrement_and_check(&JobResult::success()));
        assert!(sp.is_signaled());
    }

    #[test]
    fn reduce_target_to_zero_outstanding_signals_immediately() {
        let sp = SyncPoint::new(3, "test");
        assert!(sp.reduce_target(3));
        assert!(sp.is_signaled());
    }

    #[test]
    fn continuations_overflow_past_inline_capacity() {
        let sp = SyncPoint::new(1, "test");
        for i in 0..(INLINE_CONTINUATIONS + 3) as u32 {
            sp.add_continuation(Handle::new(i, 0));
        }
        let continuations = sp.take_continuations();
        assert_eq!(continuations.len(), INLINE_CONTINUATIONS + 3);
    }
}
