use enginecore::{JobAffinity, JobBatch, JobPriority, JobResult, JobScheduler, JobStatus, SchedulerConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn scheduler() -> Arc<JobScheduler<256, 256>> {
    JobScheduler::new(SchedulerConfig {
        worker_count: 3,
        ..SchedulerConfig::default()
    })
    .expect("worker threads must spawn in a test process")
}

#[test]
fn fan_in_of_four_jobs_completes_through_a_job_batch() {
    let scheduler = scheduler();
    let total = Arc::new(AtomicU32::new(0));

    let mut batch = JobBatch::new();
    for i in 0..4u32 {
        let total = total.clone();
        batch.add(
            format!("leaf-{i}"),
            JobPriority::Normal,
            JobAffinity::AnyWorker,
            move || {
                total.fetch_add(i + 1, Ordering::SeqCst);
                JobResult::success()
            },
        );
    }
    let barrier = batch.submit(&scheduler).expect("batch submission must succeed");
    scheduler.wait_for(barrier);

    assert_eq!(total.load(Ordering::SeqCst), 1 + 2 + 3 + 4);
    assert_eq!(scheduler.sync_point_status(barrier), Some(JobStatus::Success));
}

#[test]
fn a_failed_dependency_cascades_cancellation_to_its_continuation() {
    let scheduler = scheduler();

    let upstream = scheduler
        .submit_job("flaky-import", JobPriority::High, JobAffinity::AnyWorker, || {
            JobResult::failed("disk read failed")
        })
        .submission
        .expect("submission must succeed");
    scheduler.wait_for(upstream.sync_point);
    assert_eq!(scheduler.sync_point_status(upstream.sync_point), Some(JobStatus::Failed));

    let downstream_ran = Arc::new(AtomicU32::new(0));
    let downstream_ran_clone = downstream_ran.clone();
    let downstream = scheduler
        .submit_after(
            upstream.sync_point,
            "process-import",
            JobPriority::High,
            JobAffinity::AnyWorker,
            move || {
                downstream_ran_clone.fetch_add(1, Ordering::SeqCst);
                JobResult::success()
            },
        )
        .submission
        .expect("submission must succeed");
    scheduler.wait_for(downstream.sync_point);

    assert_eq!(downstream_ran.load(Ordering::SeqCst), 0, "a cancelled job must never execute");
    assert_eq!(
        scheduler.sync_point_status(downstream.sync_point),
        Some(JobStatus::Cancelled)
    );
}

#[test]
fn main_thread_affinity_jobs_only_run_when_the_owner_drains_them() {
    let scheduler = scheduler();
    let executing_thread = Arc::new(std::sync::Mutex::new(None));
    let executing_thread_clone = executing_thread.clone();

    let submission = scheduler
        .submit_job(
            "ui-layout-pass",
            JobPriority::Critical,
            JobAffinity::MainThreadOnly,
            move || {
                *executing_thread_clone.lock().unwrap() = Some(std::thread::current().id());
                JobResult::success()
            },
        )
        .submission
        .expect("submission must succeed");

    std::thread::sleep(Duration::from_millis(30));
    assert!(
        !scheduler.is_signaled(submission.sync_point),
        "a main-thread-only job must not run on a worker"
    );

    let stats = scheduler.process_main_thread_jobs(1_000.0);
    assert_eq!(stats.executed, 1);
    assert!(!stats.budget_exceeded);
    assert!(scheduler.is_signaled(submission.sync_point));
    assert_eq!(
        *executing_thread.lock().unwrap(),
        Some(std::thread::current().id())
    );
}

#[test]
fn job_storage_reclaims_space_under_sustained_submission() {
    let scheduler = scheduler();
    for i in 0..200u32 {
        let submission = scheduler
            .submit_job(
                format!("batch-job-{i}"),
                JobPriority::Low,
                JobAffinity::AnyWorker,
                JobResult::success,
            )
            .submission
            .expect("storage must stay below capacity thanks to backpressure-driven eviction");
        scheduler.wait_for(submission.sync_point);
    }
    for _ in 0..3 {
        scheduler.begin_frame();
    }
    let stats = scheduler.stats();
    assert!(
        stats.jobs_used < 200,
        "aged-out completed jobs must be evicted instead of exhausting storage"
    );
}

#[test]
fn job_result_can_be_read_back_through_the_handle_after_it_completes() {
    let scheduler = scheduler();
    let submission = scheduler
        .submit_job("compute", JobPriority::Normal, JobAffinity::AnyWorker, || {
            JobResult::success()
        })
        .submission
        .expect("submission must succeed");

    assert!(!scheduler.is_job_completed(submission.job) || scheduler.try_get_job_result(submission.job).is_some());
    let result = scheduler.get_job_result(submission.job);
    assert!(result.is_some());
    assert!(scheduler.is_job_completed(submission.job));
}
