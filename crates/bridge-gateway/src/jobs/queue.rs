//! Job persistence: one JSON file per job.
//!
//! Each job is stored as `{dir}/{job_id}.json`:
//!
//! ```json
//! {
//!     "version": 1,
//!     "job": { ... PendingJob ... }
//! }
//! ```
//!
//! Files are written to a temp sibling, renamed into place and the directory
//! is synced, so a job file on disk is always complete. A job is recorded
//! before `enqueue` returns and is only removed after its handler returned
//! success, so a crash in between reruns it on the next start
//! (at-least-once). Failed jobs stay on disk until purged.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use fs2::FileExt;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::job::{JobId, JobOutcome, JobState, PendingJob, RetryPolicy};
use super::worker::JobHandler;
use crate::error::{BridgeError, Result};

// ── File format constants ─────────────────────────────────────────────────────

const JOB_FILE_VERSION: u32 = 1;

const RUN_LOCK_FILE: &str = "queue.lock";

// ── On-disk structure ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct JobFile {
    version: u32,
    job: PendingJob,
}

// ── Run summary ───────────────────────────────────────────────────────────────

/// Counts from one [`JobQueue::run_due`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub retried: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.retried + self.failed
    }
}

// ── JobQueue ──────────────────────────────────────────────────────────────────

struct Inner {
    dir: PathBuf,
    policy: RetryPolicy,
    /// Serializes `run_due` passes within the process.
    run_lock: Mutex<()>,
    /// Bumped on every enqueue; the worker sleeps on `wake` until it moves.
    generation: Mutex<u64>,
    wake: Condvar,
}

/// Durable queue of follow-up jobs. Cheap to clone; clones share the wakeup
/// signal.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

impl JobQueue {
    /// Open (or create) the queue rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Io` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>, policy: RetryPolicy) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            inner: Arc::new(Inner {
                dir,
                policy,
                run_lock: Mutex::new(()),
                generation: Mutex::new(0),
                wake: Condvar::new(),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    /// Record a new job and wake the worker. Never runs the job inline.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the job file cannot be written; the job
    /// does not exist in that case.
    pub fn enqueue(&self, request_id: &str, payload: &str) -> Result<JobId> {
        let job = PendingJob::new(request_id, payload);
        self.write_job(&job)?;
        info!("enqueued job {} (requestId={request_id})", job.id);
        self.notify();
        Ok(job.id)
    }

    /// Load a job by id.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::NotFound` if no such job exists or
    /// `BridgeError::InvalidFileFormat` if its file cannot be parsed.
    pub fn load(&self, id: &JobId) -> Result<PendingJob> {
        let path = self.job_path(id);
        if !path.exists() {
            return Err(BridgeError::NotFound(format!("job not found: {id}")));
        }
        read_job_file(&path)
    }

    /// Every job on disk, oldest first. Unreadable files are skipped with a
    /// warning.
    pub fn list(&self) -> Result<Vec<PendingJob>> {
        let mut jobs = Vec::new();

        for entry in std::fs::read_dir(&self.inner.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_job_file(&path) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!("skipping unreadable job file {}: {e}", path.display()),
            }
        }

        jobs.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(jobs)
    }

    /// Jobs still waiting to run, whether due yet or not.
    pub fn pending(&self) -> Result<Vec<PendingJob>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|job| job.state == JobState::Pending)
            .collect())
    }

    /// Run every job that is due now, in enqueue order, and record each
    /// outcome.
    ///
    /// Passes are exclusive across threads and processes sharing the
    /// directory.
    pub fn run_due(&self, handler: &dyn JobHandler) -> Result<RunSummary> {
        let _guard = self
            .inner
            .run_lock
            .lock()
            .map_err(|_| BridgeError::Storage("job queue run lock poisoned".into()))?;

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.inner.dir.join(RUN_LOCK_FILE))?;
        FileExt::lock_exclusive(&lock_file)?;

        let result = self.run_due_locked(handler);

        FileExt::unlock(&lock_file)?;
        result
    }

    /// Delete every failed job. Returns how many were removed.
    pub fn purge_failed(&self) -> Result<usize> {
        let mut removed = 0;
        for job in self.list()? {
            if job.state == JobState::Failed {
                self.delete(&job.id)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove a job file. Missing files are not an error.
    pub fn delete(&self, id: &JobId) -> Result<()> {
        match std::fs::remove_file(self.job_path(id)) {
            Ok(()) => crate::storage::sync_dir(&self.inner.dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    /// Current wakeup generation. Pass it to [`JobQueue::wait_for_work`].
    pub fn generation(&self) -> u64 {
        self.inner.generation.lock().map(|g| *g).unwrap_or(0)
    }

    /// Block until something is enqueued after `seen` was read, or until
    /// `timeout` elapses. Returns the generation observed on wakeup.
    pub fn wait_for_work(&self, seen: u64, timeout: Duration) -> u64 {
        let Ok(guard) = self.inner.generation.lock() else {
            return seen;
        };
        match self
            .inner
            .wake
            .wait_timeout_while(guard, timeout, |current| *current == seen)
        {
            Ok((guard, _)) => *guard,
            Err(_) => seen,
        }
    }

    /// Wake anything blocked in [`JobQueue::wait_for_work`].
    pub fn notify(&self) {
        if let Ok(mut generation) = self.inner.generation.lock() {
            *generation = generation.wrapping_add(1);
        }
        self.inner.wake.notify_all();
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn run_due_locked(&self, handler: &dyn JobHandler) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let now = crate::time::now_millis();

        for mut job in self.list()?.into_iter().filter(|j| j.is_due(now)) {
            let outcome = handler.run(&job);
            job.attempts = job.attempts.saturating_add(1);

            match outcome {
                JobOutcome::Success => {
                    self.delete(&job.id)?;
                    summary.succeeded += 1;
                    info!("job {} succeeded after {} attempt(s)", job.id, job.attempts);
                    continue;
                }
                JobOutcome::Retry(reason) if self.inner.policy.allows_retry(job.attempts) => {
                    let delay = self.inner.policy.backoff_ms(job.attempts);
                    job.next_attempt_at = crate::time::now_millis()
                        .saturating_add(i64::try_from(delay).unwrap_or(i64::MAX));
                    warn!("job {} will retry in {delay}ms: {reason}", job.id);
                    job.last_error = Some(reason);
                    summary.retried += 1;
                }
                JobOutcome::Retry(reason) | JobOutcome::Failure(reason) => {
                    job.state = JobState::Failed;
                    warn!(
                        "job {} failed after {} attempt(s): {reason}",
                        job.id, job.attempts
                    );
                    job.last_error = Some(reason);
                    summary.failed += 1;
                }
            }

            self.write_job(&job)?;
        }

        if summary.total() > 0 {
            debug!(
                "job pass: {} succeeded, {} retried, {} failed",
                summary.succeeded, summary.retried, summary.failed
            );
        }
        Ok(summary)
    }

    fn write_job(&self, job: &PendingJob) -> Result<()> {
        let file = JobFile {
            version: JOB_FILE_VERSION,
            job: job.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| BridgeError::Serialization(e.to_string()))?;

        let path = self.job_path(&job.id);
        let tmp = path.with_extension("json.tmp");
        {
            let mut f = std::fs::File::create(&tmp)?;
            f.write_all(json.as_bytes())?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp, &path)?;
        crate::storage::sync_dir(&self.inner.dir)
    }

    fn job_path(&self, id: &JobId) -> PathBuf {
        self.inner.dir.join(format!("{}.json", id.0))
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("dir", &self.inner.dir)
            .field("policy", &self.inner.policy)
            .finish()
    }
}

fn read_job_file(path: &Path) -> Result<PendingJob> {
    let bytes = std::fs::read(path)?;
    let file: JobFile = serde_json::from_slice(&bytes).map_err(|e| {
        BridgeError::InvalidFileFormat(format!(
            "failed to parse job file {}: {e}",
            path.display()
        ))
    })?;
    if file.version != JOB_FILE_VERSION {
        return Err(BridgeError::InvalidFileFormat(format!(
            "unsupported job file version {} in {}",
            file.version,
            path.display()
        )));
    }
    Ok(file.job)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
