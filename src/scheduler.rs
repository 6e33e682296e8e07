//! L2: the job scheduler. Four priority queues feed a fixed worker pool pulled
//! from a weighted table biased toward higher priorities; a parallel pair of
//! queues holds jobs pinned to the calling (main) thread, drained explicitly via
//! [`JobScheduler::process_main_thread_jobs`]. Dependency chains are expressed
//! through [`SyncPoint`] continuations rather than a DAG the scheduler itself
//! walks.

use crate::error::InitError;
use crate::handle::Handle;
use crate::job::{Job, JobAffinity, JobClosure, JobPriority, JobResult, JobState, JobStatus};
use crate::storage::FixedStorage;
use crate::sync_point::SyncPoint;
use crossbeam::queue::SegQueue;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Weighted round-robin draw order: 8 Critical : 4 High : 2 Normal : 1 Low per
/// 15-slot cycle. A worker pull starts at the next slot in this table and walks
/// forward until it finds a non-empty queue, so lower priorities still run under
/// sustained high-priority load, just less often.
const PULL_TABLE: [JobPriority; 15] = [
    JobPriority::Critical,
    JobPriority::High,
    JobPriority::Critical,
    JobPriority::Normal,
    JobPriority::Critical,
    JobPriority::High,
    JobPriority::Critical,
    JobPriority::Low,
    JobPriority::Critical,
    JobPriority::High,
    JobPriority::Critical,
    JobPriority::Normal,
    JobPriority::Critical,
    JobPriority::High,
    JobPriority::Critical,
];

/// Upper bound on `SchedulerConfig::worker_count`, enforced by [`JobScheduler::new`].
/// Past this, a caller almost certainly passed a miscomputed value (e.g. a thread
/// count meant for a different pool) rather than genuinely wanting this many OS
/// threads parked on one job queue.
pub const MAX_WORKERS: usize = 256;

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub worker_count: usize,
    /// Usage fraction of the job storage at which a single oldest-completed job
    /// is evicted to make room before a new allocation.
    pub soft_limit_fraction: f64,
    /// Usage fraction at which every completed/cancelled job is evicted eagerly.
    pub hard_limit_fraction: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().saturating_sub(1).max(1),
            soft_limit_fraction: 0.8,
            hard_limit_fraction: 0.95,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Submission {
    pub job: Handle<Job>,
    pub sync_point: Handle<SyncPoint>,
}

/// Three-tier backpressure signal returned alongside every submission. Storage
/// is always attempted to be freed (via eviction) before this is computed, so
/// `StorageFullRetry` means "still tight even after evicting what we could" and
/// `StorageFullCritical` means the submission itself was refused.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SubmissionResult {
    Success,
    StorageFullRetry,
    StorageFullCritical,
}

/// The result of a `submit_job`/`submit_after` call: the backpressure level
/// observed at submission time, and the submission itself (`None` only when
/// `result` is `StorageFullCritical`).
#[derive(Copy, Clone, Debug)]
pub struct SubmitOutcome {
    pub result: SubmissionResult,
    pub submission: Option<Submission>,
}

impl SubmitOutcome {
    fn critical() -> Self {
        Self {
            result: SubmissionResult::StorageFullCritical,
            submission: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PerPriorityCounts {
    pub critical: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

impl PerPriorityCounts {
    fn get_mut(&mut self, priority: JobPriority) -> &mut usize {
        match priority {
            JobPriority::Critical => &mut self.critical,
            JobPriority::High => &mut self.high,
            JobPriority::Normal => &mut self.normal,
            JobPriority::Low => &mut self.low,
        }
    }

    fn increment(&mut self, priority: JobPriority) {
        *self.get_mut(priority) += 1;
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.normal + self.low
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct QueueLengths {
    pub worker: PerPriorityCounts,
    pub main_thread: PerPriorityCounts,
}

/// Result of a budgeted [`JobScheduler::process_main_thread_jobs`] call.
#[derive(Clone, Copy, Debug, Default)]
pub struct MainThreadJobStats {
    pub executed: usize,
    pub time_spent_ms: f64,
    /// `true` if the budget was exhausted with jobs still queued.
    pub budget_exceeded: bool,
    pub per_priority_counts: PerPriorityCounts,
}

#[derive(Clone, Debug)]
pub struct SchedulerStats {
    pub jobs_used: usize,
    pub jobs_capacity: usize,
    pub sync_points_used: usize,
    pub sync_points_capacity: usize,
    pub frame: u64,
}

pub struct JobScheduler<const MAX_JOBS: usize = 8192, const MAX_SYNC_POINTS: usize = 8192> {
    jobs: FixedStorage<Job, MAX_JOBS>,
    sync_points: FixedStorage<SyncPoint, MAX_SYNC_POINTS>,
    worker_queues: [SegQueue<Handle<Job>>; 4],
    main_queues: [SegQueue<Handle<Job>>; 4],
    pull_index: AtomicUsize,
    shutdown: AtomicBool,
    workers: Mutex<Vec<std::thread::JoinHandle<()>>>,
    frame: AtomicU64,
    config: SchedulerConfig,
}

impl<const MAX_JOBS: usize, const MAX_SYNC_POINTS: usize> JobScheduler<MAX_JOBS, MAX_SYNC_POINTS> {
    pub fn new(config: SchedulerConfig) -> Result<Arc<Self>, InitError> {
        if config.worker_count > MAX_WORKERS {
            crate::log_error!(
                "job scheduler: requested worker_count {} exceeds the maximum of {}",
                config.worker_count,
                MAX_WORKERS
            );
            return Err(InitError::TooManyWorkers {
                requested: config.worker_count,
                max: MAX_WORKERS,
            });
        }

        let scheduler = Arc::new(Self {
            jobs: FixedStorage::new(),
            sync_points: FixedStorage::new(),
            worker_queues: std::array::from_fn(|_| SegQueue::new()),
            main_queues: std::array::from_fn(|_| SegQueue::new()),
            pull_index: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            frame: AtomicU64::new(0),
            config: config.clone(),
        });

        let mut workers = Vec::with_capacity(config.worker_count);
        for index in 0..config.worker_count {
            let weak = Arc::downgrade(&scheduler);
            let handle = crate::thread::spawn_named(format!("job-worker-{index}"), move || {
                Self::worker_loop(weak);
            })
            .map_err(|source| {
                crate::log_error!("job scheduler: failed to spawn worker thread {index}: {source}");
                InitError::WorkerSpawn { index, source }
            })?;
            workers.push(handle);
        }
        *scheduler.workers.lock() = workers;
        Ok(scheduler)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            jobs_used: self.jobs.used(),
            jobs_capacity: self.jobs.capacity(),
            sync_points_used: self.sync_points.used(),
            sync_points_capacity: self.sync_points.capacity(),
            frame: self.frame.load(Ordering::Relaxed),
        }
    }

    /// Current backpressure tier based on job storage occupancy. Computed after
    /// any eviction a submission attempt triggers, so this reflects what storage
    /// actually looks like once the scheduler has done what it can to make room.
    pub fn backpressure_level(&self) -> SubmissionResult {
        let fraction = self.jobs.usage_fraction();
        if fraction >= self.config.hard_limit_fraction {
            SubmissionResult::StorageFullCritical
        } else if fraction >= self.config.soft_limit_fraction {
            SubmissionResult::StorageFullRetry
        } else {
            SubmissionResult::Success
        }
    }

    /// Snapshot of how many jobs are currently queued, broken down by priority
    /// and by worker/main-thread affinity.
    pub fn queue_lengths(&self) -> QueueLengths {
        let mut lengths = QueueLengths::default();
        for priority in JobPriority::ALL {
            *lengths.worker.get_mut(priority) = self.worker_queues[priority.slot()].len();
            *lengths.main_thread.get_mut(priority) = self.main_queues[priority.slot()].len();
        }
        lengths
    }

    pub fn create_sync_point(&self, initial_count: u32, debug_name: impl Into<String>) -> Handle<SyncPoint> {
        self.sync_points.allocate(SyncPoint::new(initial_count, debug_name))
    }

    pub fn release_sync_point(&self, sync_point: Handle<SyncPoint>) -> bool {
        self.sync_points.release(sync_point)
    }

    pub fn is_signaled(&self, sync_point: Handle<SyncPoint>) -> bool {
        self.sync_points
            .get(sync_point)
            .map(|sp| sp.is_signaled())
            .unwrap_or(true)
    }

    pub fn sync_point_status(&self, sync_point: Handle<SyncPoint>) -> Option<JobStatus> {
        self.sync_points.get(sync_point).map(|sp| sp.status())
    }

    /// Force a sync point to signaled with `Cancelled` status, cascading to any
    /// continuations already registered on it. Jobs already executing are not
    /// affected; only jobs still `Pending` on this sync point are cancelled.
    pub fn cancel_sync_point(&self, sync_point: Handle<SyncPoint>) -> bool {
        let transitioned = match self.sync_points.get(sync_point) {
            Some(sp) => sp.force_cancel(),
            None => return false,
        };
        if transitioned {
            self.on_sync_point_signaled(sync_point);
        }
        true
    }

    /// Reduce how many outstanding decrements `sync_point` is waiting for by
    /// `amount`, for a caller (namely [`crate::job_batch::JobBatch`]) that
    /// reserved room for more jobs than it ended up submitting. Safe to call
    /// concurrently with jobs still decrementing the same sync point.
    pub(crate) fn correct_sync_point_target(&self, sync_point: Handle<SyncPoint>, amount: u32) -> bool {
        let transitioned = match self.sync_points.get(sync_point) {
            Some(sp) => sp.reduce_target(amount),
            None => return false,
        };
        if transitioned {
            self.on_sync_point_signaled(sync_point);
        }
        true
    }

    /// Submit a job with no dependency; it becomes `Ready` immediately.
    pub fn submit_job(
        &self,
        debug_name: impl Into<String>,
        priority: JobPriority,
        affinity: JobAffinity,
        closure: impl FnOnce() -> JobResult + Send + 'static,
    ) -> SubmitOutcome {
        self.make_room_for_job();
        let level = self.backpressure_level();
        let sync_point = self.sync_points.allocate(SyncPoint::new(1, "job-completion"));
        if !sync_point.is_valid() {
            return SubmitOutcome::critical();
        }
        let Some(job) = self.create_job(sync_point, priority, affinity, debug_name.into(), Box::new(closure)) else {
            self.sync_points.release(sync_point);
            return SubmitOutcome::critical();
        };
        self.ready_job(job);
        SubmitOutcome {
            result: level,
            submission: Some(Submission { job, sync_point }),
        }
    }

    /// Submit a job that becomes `Ready` only once `dependency` signals. If
    /// `dependency` failed or was cancelled before this call, the new job is
    /// cancelled without ever running (cascading cancellation). If `dependency`
    /// is already a stale/invalid handle, the same thing happens, since nothing
    /// will ever signal it.
    pub fn submit_after(
        &self,
        dependency: Handle<SyncPoint>,
        debug_name: impl Into<String>,
        priority: JobPriority,
        affinity: JobAffinity,
        closure: impl FnOnce() -> JobResult + Send + 'static,
    ) -> SubmitOutcome {
        self.make_room_for_job();
        let level = self.backpressure_level();
        let sync_point = self.sync_points.allocate(SyncPoint::new(1, "job-completion"));
        if !sync_point.is_valid() {
            return SubmitOutcome::critical();
        }
        let Some(job) = self.create_job(sync_point, priority, affinity, debug_name.into(), Box::new(closure)) else {
            self.sync_points.release(sync_point);
            return SubmitOutcome::critical();
        };

        match self.sync_points.get(dependency) {
            Some(dep) if dep.is_signaled() => {
                if dep.status() == JobStatus::Success {
                    self.ready_job(job);
                } else {
                    self.finish_job(job, JobResult::cancelled("dependency already failed"), false);
                }
            }
            Some(dep) => dep.add_continuation(job),
            None => {
                self.finish_job(job, JobResult::cancelled("dependency sync point is invalid"), false);
            }
        }
        SubmitOutcome {
            result: level,
            submission: Some(Submission { job, sync_point }),
        }
    }

    /// Submit a job signaling a caller-owned sync point rather than one created
    /// per-job. Used by [`crate::job_batch::JobBatch`] to fan multiple jobs into
    /// a single barrier.
    pub(crate) fn submit_with_signal(
        &self,
        signal: Handle<SyncPoint>,
        debug_name: impl Into<String>,
        priority: JobPriority,
        affinity: JobAffinity,
        closure: impl FnOnce() -> JobResult + Send + 'static,
    ) -> Option<Handle<Job>> {
        self.make_room_for_job();
        let job = self.create_job(signal, priority, affinity, debug_name.into(), Box::new(closure))?;
        self.ready_job(job);
        Some(job)
    }

    /// Block the calling thread until `sync_point` signals, executing worker
    /// jobs in the meantime instead of idling ("help while waiting").
    pub fn wait_for(&self, sync_point: Handle<SyncPoint>) {
        loop {
            match self.sync_points.get(sync_point) {
                Some(sp) if sp.is_signaled() => return,
                None => return,
                _ => {}
            }
            if let Some(handle) = self.try_pop_worker_job() {
                self.execute_job(handle);
            } else {
                crate::thread::yield_now();
            }
        }
    }

    pub fn wait_for_multiple(&self, sync_points: &[Handle<SyncPoint>]) {
        loop {
            let all_signaled = sync_points.iter().all(|&sp| self.is_signaled(sp));
            if all_signaled {
                return;
            }
            if let Some(handle) = self.try_pop_worker_job() {
                self.execute_job(handle);
            } else {
                crate::thread::yield_now();
            }
        }
    }

    /// Non-blocking: whether `job`'s slot is in a terminal state (completed in
    /// any aging generation, or cancelled). `false` for a stale/evicted handle,
    /// same as for one that simply hasn't finished yet.
    pub fn is_job_completed(&self, job: Handle<Job>) -> bool {
        self.jobs
            .get(job)
            .map(|j| !matches!(j.state(), JobState::Pending | JobState::Ready | JobState::Executing))
            .unwrap_or(false)
    }

    /// Non-blocking: the job's result if it has one. Returns `None` both for a
    /// job that hasn't finished yet and for one whose slot has since been
    /// evicted — the two are indistinguishable once the handle goes stale.
    pub fn try_get_job_result(&self, job: Handle<Job>) -> Option<JobResult> {
        self.jobs.get(job).and_then(|j| j.result())
    }

    /// Block until `job` reaches a terminal state, helping drain worker jobs
    /// while waiting. A no-op if the handle is already stale.
    pub fn wait_for_job(&self, job: Handle<Job>) {
        let Some(signal) = self.jobs.get(job).map(|j| j.signal_on_completion) else {
            return;
        };
        self.wait_for(signal);
    }

    /// Block until `job` finishes, then return its result (`None` if the handle
    /// went stale before this call returned, e.g. evicted between signaling and
    /// reading back).
    pub fn get_job_result(&self, job: Handle<Job>) -> Option<JobResult> {
        self.wait_for_job(job);
        self.try_get_job_result(job)
    }

    /// Run jobs queued for the calling thread until the queue empties or
    /// `budget_ms` elapses, whichever comes first. Intended to be called once
    /// per frame from the owner of the main thread.
    pub fn process_main_thread_jobs(&self, budget_ms: f64) -> MainThreadJobStats {
        let start = Instant::now();
        let mut stats = MainThreadJobStats::default();
        loop {
            if elapsed_ms(start) >= budget_ms {
                stats.budget_exceeded = self.has_pending_main_thread_jobs();
                break;
            }
            let mut ran_one = false;
            for priority in JobPriority::ALL {
                if elapsed_ms(start) >= budget_ms {
                    stats.budget_exceeded = self.has_pending_main_thread_jobs();
                    break;
                }
                if let Some(handle) = self.main_queues[priority.slot()].pop() {
                    self.execute_job(handle);
                    stats.executed += 1;
                    stats.per_priority_counts.increment(priority);
                    ran_one = true;
                }
            }
            if stats.budget_exceeded || !ran_one {
                break;
            }
        }
        stats.time_spent_ms = elapsed_ms(start);
        if stats.budget_exceeded {
            crate::log_warn!(
                "job scheduler: process_main_thread_jobs exceeded its {budget_ms}ms budget ({} jobs still queued)",
                self.queue_lengths().main_thread.total()
            );
        }
        stats
    }

    pub fn has_pending_main_thread_jobs(&self) -> bool {
        self.main_queues.iter().any(|queue| !queue.is_empty())
    }

    /// Age completed jobs toward eviction and reclaim anything that has aged
    /// out. Call once per frame.
    pub fn begin_frame(&self) {
        for index in self.jobs.used_indices() {
            let handle = self.jobs.handle_for_slot(index);
            let Some(job) = self.jobs.get(handle) else { continue };
            match job.state() {
                JobState::Completed => job.set_state(JobState::CompletedN1),
                JobState::CompletedN1 => job.set_state(JobState::CompletedN2),
                JobState::CompletedN2 | JobState::Cancelled => {
                    self.jobs.release(handle);
                }
                _ => {}
            }
        }
        self.frame.fetch_add(1, Ordering::Relaxed);
    }

    fn make_room_for_job(&self) {
        let fraction = self.jobs.usage_fraction();
        if fraction >= self.config.hard_limit_fraction {
            self.evict_completed_jobs(usize::MAX);
            crate::log_warn!(
                "job scheduler: job storage at {:.0}% capacity, evicting eagerly",
                fraction * 100.0
            );
        } else if fraction >= self.config.soft_limit_fraction {
            self.evict_completed_jobs(1);
            crate::log_warn!("job scheduler: job storage at {:.0}% capacity, approaching limit", fraction * 100.0);
        }
    }

    /// Evict up to `max` completed jobs, oldest-looking generation first:
    /// `CompletedN2`, then `CompletedN1`, then fresh `Completed`.
    fn evict_completed_jobs(&self, max: usize) -> usize {
        let mut evicted = 0;
        for state in [JobState::CompletedN2, JobState::CompletedN1, JobState::Completed] {
            if evicted >= max {
                break;
            }
            for index in self.jobs.used_indices() {
                if evicted >= max {
                    break;
                }
                let handle = self.jobs.handle_for_slot(index);
                if self.jobs.get(handle).map(|job| job.state()) == Some(state) && self.jobs.release(handle) {
                    evicted += 1;
                }
            }
        }
        evicted
    }

    fn create_job(
        &self,
        signal: Handle<SyncPoint>,
        priority: JobPriority,
        affinity: JobAffinity,
        debug_name: String,
        closure: JobClosure,
    ) -> Option<Handle<Job>> {
        let handle = self.jobs.allocate(Job::new(closure, signal, priority, affinity, debug_name));
        handle.is_valid().then_some(handle)
    }

    fn ready_job(&self, handle: Handle<Job>) {
        let Some(job) = self.jobs.get(handle) else { return };
        if !job.compare_exchange_state(JobState::Pending, JobState::Ready) {
            return;
        }
        self.enqueue(handle, job.priority(), job.affinity());
    }

    fn enqueue(&self, handle: Handle<Job>, priority: JobPriority, affinity: JobAffinity) {
        match affinity {
            JobAffinity::MainThreadOnly => self.main_queues[priority.slot()].push(handle),
            JobAffinity::AnyWorker | JobAffinity::SpecificWorker(_) => {
                self.worker_queues[priority.slot()].push(handle);
            }
        }
    }

    fn try_pop_worker_job(&self) -> Option<Handle<Job>> {
        let start = self.pull_index.fetch_add(1, Ordering::Relaxed) % PULL_TABLE.len();
        for offset in 0..PULL_TABLE.len() {
            let priority = PULL_TABLE[(start + offset) % PULL_TABLE.len()];
            if let Some(handle) = self.worker_queues[priority.slot()].pop() {
                return Some(handle);
            }
        }
        None
    }

    fn execute_job(&self, handle: Handle<Job>) {
        let (closure, debug_name) = {
            let Some(job) = self.jobs.get(handle) else { return };
            if !job.compare_exchange_state(JobState::Ready, JobState::Executing) {
                return;
            }
            job.timing.lock().started_at = Some(Instant::now());
            (job.closure.lock().take(), job.debug_name().to_string())
        };
        let result = match closure {
            Some(f) => match panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(result) => result,
                Err(_) => {
                    crate::log_error!("job scheduler: job '{debug_name}' panicked during execution");
                    JobResult::failed("Exception during execution")
                }
            },
            None => JobResult::failed("job closure already taken"),
        };
        if let Some(job) = self.jobs.get(handle) {
            job.timing.lock().completed_at = Some(Instant::now());
        }
        self.finish_job(handle, result, true);
    }

    /// Record a job's outcome and propagate it to the sync point it signals.
    /// `executed` distinguishes a job that actually ran (state -> `Completed`)
    /// from one cascade-cancelled before it ever started (state -> `Cancelled`).
    fn finish_job(&self, handle: Handle<Job>, result: JobResult, executed: bool) {
        let signal = {
            let Some(job) = self.jobs.get(handle) else { return };
            job.set_result(result.clone());
            job.set_state(if executed { JobState::Completed } else { JobState::Cancelled });
            job.signal_on_completion
        };
        let Some(sp) = self.sync_points.get(signal) else { return };
        if sp.decrement_and_check(&result) {
            self.on_sync_point_signaled(signal);
        }
    }

    fn on_sync_point_signaled(&self, sync_point: Handle<SyncPoint>) {
        let Some(sp) = self.sync_points.get(sync_point) else { return };
        let status = sp.status();
        let continuations = sp.take_continuations();
        for job in continuations {
            match status {
                JobStatus::Success => self.ready_job(job),
                JobStatus::Failed | JobStatus::Cancelled => {
                    self.finish_job(job, JobResult::cancelled("dependency failed"), false);
                }
            }
        }
    }

    /// Workers only suspend via a cooperative yield in this pull loop; they
    /// never block on a condition variable, so a worker never sleeps through a
    /// just-enqueued critical job waiting on an OS wakeup.
    fn worker_loop(weak: Weak<Self>) {
        loop {
            let Some(scheduler) = weak.upgrade() else { return };
            if scheduler.shutdown.load(Ordering::Acquire) {
                return;
            }
            if let Some(handle) = scheduler.try_pop_worker_job() {
                scheduler.execute_job(handle);
            } else {
                crate::thread::yield_now();
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl<const MAX_JOBS: usize, const MAX_SYNC_POINTS: usize> Drop for JobScheduler<MAX_JOBS, MAX_SYNC_POINTS> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

pub type DefaultJobScheduler = JobScheduler<8192, 8192>;

static GLOBAL_SCHEDULER: OnceCell<Arc<DefaultJobScheduler>> = OnceCell::new();

pub fn initialize_global(config: SchedulerConfig) -> Result<(), InitError> {
    let scheduler = DefaultJobScheduler::new(config)?;
    let _ = GLOBAL_SCHEDULER.set(scheduler);
    Ok(())
}

pub fn try_initialize_global(config: SchedulerConfig) -> Result<Arc<DefaultJobScheduler>, InitError> {
    if let Some(existing) = GLOBAL_SCHEDULER.get() {
        return Ok(existing.clone());
    }
    let scheduler = DefaultJobScheduler::new(config)?;
    Ok(GLOBAL_SCHEDULER.get_or_init(|| scheduler).clone())
}

pub fn global() -> Arc<DefaultJobScheduler> {
    GLOBAL_SCHEDULER
        .get()
        .expect("job scheduler global not initialized; call initialize_global first")
        .clone()
}
