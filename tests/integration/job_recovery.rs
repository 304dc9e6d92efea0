//! Integration test: job queue durability and retry.
//!
//! Jobs outlive the process that enqueued them, run at least once, and
//! are retried with backoff until they succeed or run out of attempts.
//! Successful jobs are removed; failed ones stay until purged.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_gateway::jobs::sync::NO_PAYLOAD_ERROR;
use bridge_gateway::{
    BridgeError, JobHandler, JobOutcome, JobQueue, JobState, JobWorker, PendingJob,
    ResultSyncJob, RetryPolicy,
};

/// Retries immediately, so a test can drive several attempts in a row.
fn eager_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        initial_delay_ms: 0,
        max_delay_ms: 0,
        max_attempts,
    }
}

/// Asks for a retry until it has been called `succeed_on` times.
struct Flaky {
    calls: AtomicU32,
    succeed_on: u32,
}

impl Flaky {
    fn new(succeed_on: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            succeed_on,
        }
    }
}

impl JobHandler for Flaky {
    fn run(&self, _job: &PendingJob) -> JobOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.succeed_on {
            JobOutcome::Success
        } else {
            JobOutcome::Retry(format!("upstream unavailable (call {call})"))
        }
    }
}

#[test]
fn job_survives_reopen_and_runs_once() {
    let dir = tempfile::tempdir().unwrap();

    let id = {
        let queue = JobQueue::open(dir.path(), RetryPolicy::default()).unwrap();
        queue.enqueue("s1", r#"{"userId":7}"#).unwrap()
    };

    // A fresh process sees the job and runs it.
    let queue = JobQueue::open(dir.path(), RetryPolicy::default()).unwrap();
    let pending = queue.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);

    let summary = queue.run_due(&ResultSyncJob).unwrap();
    assert_eq!(summary.succeeded, 1);

    assert!(matches!(queue.load(&id), Err(BridgeError::NotFound(_))));

    // Finished jobs are not run again.
    assert_eq!(queue.run_due(&ResultSyncJob).unwrap().total(), 0);
}

#[test]
fn blank_payload_job_fails_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let queue = JobQueue::open(dir.path(), eager_policy(5)).unwrap();
    let id = queue.enqueue("s1", "").unwrap();

    let summary = queue.run_due(&ResultSyncJob).unwrap();
    assert_eq!(summary.failed, 1);

    let job = queue.load(&id).unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error.as_deref(), Some(NO_PAYLOAD_ERROR));
}

#[test]
fn transient_failures_retry_until_success() {
    let dir = tempfile::tempdir().unwrap();
    let queue = JobQueue::open(dir.path(), eager_policy(5)).unwrap();
    let id = queue.enqueue("s1", "{}").unwrap();
    let handler = Flaky::new(3);

    assert_eq!(queue.run_due(&handler).unwrap().retried, 1);
    let job = queue.load(&id).unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 1);
    assert!(job.last_error.unwrap().contains("call 1"));

    assert_eq!(queue.run_due(&handler).unwrap().retried, 1);
    assert_eq!(queue.run_due(&handler).unwrap().succeeded, 1);

    assert!(queue.load(&id).is_err());
    assert!(queue.list().unwrap().is_empty());
    assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn retries_stop_at_max_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let queue = JobQueue::open(dir.path(), eager_policy(2)).unwrap();
    let id = queue.enqueue("s1", "{}").unwrap();
    let handler = Flaky::new(u32::MAX);

    assert_eq!(queue.run_due(&handler).unwrap().retried, 1);
    assert_eq!(queue.run_due(&handler).unwrap().failed, 1);
    assert_eq!(queue.run_due(&handler).unwrap().total(), 0);

    let job = queue.load(&id).unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 2);
}

#[test]
fn backed_off_job_is_not_due_yet() {
    let dir = tempfile::tempdir().unwrap();
    let queue = JobQueue::open(dir.path(), RetryPolicy::default()).unwrap();
    let id = queue.enqueue("s1", "{}").unwrap();

    assert_eq!(queue.run_due(&Flaky::new(u32::MAX)).unwrap().retried, 1);
    // The default policy waits 30s before the second attempt.
    assert_eq!(queue.run_due(&ResultSyncJob).unwrap().total(), 0);

    let job = queue.load(&id).unwrap();
    assert!(job.next_attempt_at >= job.enqueued_at + 30_000);
}

#[test]
fn purge_removes_failed_and_keeps_pending_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let queue = JobQueue::open(dir.path(), RetryPolicy::default()).unwrap();
    queue.enqueue("ok", "{}").unwrap();
    queue.enqueue("bad", " ").unwrap();
    queue.run_due(&ResultSyncJob).unwrap();
    let waiting = queue.enqueue("later", "{}").unwrap();

    // "ok" is already gone; only "bad" is left to purge.
    assert_eq!(queue.list().unwrap().len(), 2);
    assert_eq!(queue.purge_failed().unwrap(), 1);
    let left = queue.list().unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, waiting);
}

#[test]
fn worker_drains_jobs_enqueued_after_start() {
    let dir = tempfile::tempdir().unwrap();
    let queue = JobQueue::open(dir.path(), RetryPolicy::default()).unwrap();
    let worker = JobWorker::spawn(
        queue.clone(),
        Arc::new(ResultSyncJob),
        Duration::from_secs(60),
    )
    .unwrap();

    let id = queue.enqueue("s1", "{}").unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if queue.load(&id).is_err() {
            break;
        }
        assert!(Instant::now() < deadline, "worker did not run the job");
        std::thread::sleep(Duration::from_millis(20));
    }

    worker.shutdown();
}

#[test]
fn corrupt_job_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let queue = JobQueue::open(dir.path(), RetryPolicy::default()).unwrap();
    queue.enqueue("s1", "{}").unwrap();
    std::fs::write(dir.path().join("ajob_broken.json"), "{not json").unwrap();

    assert_eq!(queue.list().unwrap().len(), 1);
    assert_eq!(queue.run_due(&ResultSyncJob).unwrap().succeeded, 1);
}

#[test]
fn many_successful_jobs_leave_the_directory_empty() {
    let dir = tempfile::tempdir().unwrap();
    let queue = JobQueue::open(dir.path(), RetryPolicy::default()).unwrap();

    for i in 0..50 {
        queue
            .enqueue(&format!("s{i}"), &format!(r#"{{"userId":{i}}}"#))
            .unwrap();
        assert_eq!(queue.run_due(&ResultSyncJob).unwrap().succeeded, 1);
    }

    let job_files = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".json"))
        .count();
    assert_eq!(job_files, 0);
}
