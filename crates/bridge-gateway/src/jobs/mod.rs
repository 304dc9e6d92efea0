//! Async job queue: durable handoff of accepted results to background work.
//!
//! Jobs are persisted before `enqueue` returns and run at least once, on a
//! worker thread or through an explicit [`JobQueue::run_due`] pass.

pub mod job;
pub mod queue;
pub mod sync;
pub mod worker;

pub use job::{JobId, JobOutcome, JobState, PendingJob, RetryPolicy};
pub use queue::{JobQueue, RunSummary};
pub use sync::ResultSyncJob;
pub use worker::{JobHandler, JobWorker, WorkerHandle, DEFAULT_POLL_INTERVAL};
