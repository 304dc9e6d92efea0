//! Background execution of queued jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error};

use super::job::{JobOutcome, PendingJob};
use super::queue::JobQueue;

/// Work performed for each queued job.
pub trait JobHandler: Send + Sync {
    fn run(&self, job: &PendingJob) -> JobOutcome;
}

/// Default poll interval; bounds how late a backed-off job can start.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Spawns the worker thread.
pub struct JobWorker;

impl JobWorker {
    /// Start draining `queue` on a dedicated thread.
    ///
    /// The thread runs every due job, then sleeps until the next enqueue or
    /// until `poll_interval` passes (so retried jobs are picked up once their
    /// backoff expires).
    pub fn spawn(
        queue: JobQueue,
        handler: Arc<dyn JobHandler>,
        poll_interval: Duration,
    ) -> std::io::Result<WorkerHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let queue = queue.clone();
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name("bridge-job-worker".into())
                .spawn(move || worker_loop(&queue, handler.as_ref(), &stop, poll_interval))?
        };

        Ok(WorkerHandle {
            stop,
            queue,
            thread: Some(thread),
        })
    }
}

fn worker_loop(queue: &JobQueue, handler: &dyn JobHandler, stop: &AtomicBool, poll: Duration) {
    debug!("job worker started on {}", queue.dir().display());
    let mut seen = queue.generation();
    while !stop.load(Ordering::SeqCst) {
        if let Err(e) = queue.run_due(handler) {
            error!("job pass failed: {e}");
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }
        seen = queue.wait_for_work(seen, poll);
    }
    debug!("job worker stopped");
}

/// Owner of a running worker. Dropping it stops the worker.
pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    queue: JobQueue,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Stop the worker and wait for the current pass to finish.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.queue.notify();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("job worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
