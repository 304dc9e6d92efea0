//! Result sync job.
//!
//! Placeholder for the follow-up upload of an accepted result. It only
//! checks that a payload was handed over; the actual network sync lives
//! outside the gateway.

use log::info;

use super::job::{JobOutcome, PendingJob};
use super::worker::JobHandler;

pub const NO_PAYLOAD_ERROR: &str = "No payload passed to worker";

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultSyncJob;

impl JobHandler for ResultSyncJob {
    fn run(&self, job: &PendingJob) -> JobOutcome {
        if job.payload.trim().is_empty() {
            return JobOutcome::Failure(NO_PAYLOAD_ERROR.to_string());
        }
        info!(
            "result sync for requestId={} ({} bytes)",
            job.request_id,
            job.payload.len()
        );
        JobOutcome::Success
    }
}
