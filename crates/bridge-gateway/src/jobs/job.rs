//! Job records and the retry policy applied to them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Unique identifier for a queued job (`ajob_` + base58).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Mint a fresh id. Random bytes and the clock make collisions between
    /// two enqueues of the same request negligible.
    pub fn generate(request_id: &str) -> Self {
        let nonce: [u8; 16] = rand::random();
        let mut hasher = Sha256::new();
        hasher.update(nonce);
        hasher.update(crate::time::now_millis().to_be_bytes());
        hasher.update(request_id.as_bytes());
        let id_hash = hasher.finalize();
        let id_encoded = bs58::encode(&id_hash[..16]).into_string();
        JobId(format!("ajob_{id_encoded}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a job file. A job that succeeds is deleted, so only
/// waiting and failed jobs are ever on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Failed,
}

impl JobState {
    pub fn as_tag(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Failed => "failed",
        }
    }
}

/// Follow-up work for one accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingJob {
    pub id: JobId,
    pub request_id: String,
    pub payload: String,
    /// Unix millis.
    pub enqueued_at: i64,
    /// Runs so far, successful or not.
    pub attempts: u32,
    /// Unix millis; the job is not run before this.
    pub next_attempt_at: i64,
    pub state: JobState,
    pub last_error: Option<String>,
}

impl PendingJob {
    pub fn new(request_id: impl Into<String>, payload: impl Into<String>) -> Self {
        let request_id = request_id.into();
        let now = crate::time::now_millis();
        Self {
            id: JobId::generate(&request_id),
            request_id,
            payload: payload.into(),
            enqueued_at: now,
            attempts: 0,
            next_attempt_at: now,
            state: JobState::Pending,
            last_error: None,
        }
    }

    /// `true` if the job should run at `now` (Unix millis).
    pub fn is_due(&self, now: i64) -> bool {
        self.state == JobState::Pending && self.next_attempt_at <= now
    }
}

/// What a handler reports after running a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    /// Transient failure; run again after the backoff delay.
    Retry(String),
    /// Permanent failure; never run again.
    Failure(String),
}

/// Exponential backoff between attempts of a retried job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// A job that has run this many times is failed instead of retried.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 30_000,
            max_delay_ms: 5 * 60 * 60 * 1000,
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next run of a job that has already run `attempts`
    /// times: `initial * 2^(attempts - 1)`, capped at `max_delay_ms`.
    pub fn backoff_ms(&self, attempts: u32) -> u64 {
        let exponent = attempts.saturating_sub(1).min(63);
        let factor = 1u64 << exponent;
        self.initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    /// `true` if a job with `attempts` runs may be retried once more.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
