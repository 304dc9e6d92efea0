//! Bridge Gateway: an authenticated cross-process bridge.
//!
//! A single trusted caller (identified by its signing-certificate
//! fingerprint) may fetch the subject currently selected on the host and
//! submit measurement results back. Accepted results are stored durably and
//! handed to a background job queue for follow-up sync.
//!
//! - [`identity`]: caller verification against an allow-listed fingerprint.
//! - [`protocol`]: the two-method protocol, its dispatcher and wire format.
//! - [`measurement`]: parsing of submitted results.
//! - [`storage`]: durable key-value stores for results and selections.
//! - [`jobs`]: durable at-least-once job queue and worker.
//! - [`config`]: configuration and wiring.

pub mod config;
pub mod error;
pub mod identity;
pub mod jobs;
pub mod measurement;
pub mod protocol;
pub mod storage;
pub mod time;

// Re-export primary types
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use identity::{
    AllowlistEntry, AuthDecision, CallerIdentity, DenyReason, Fingerprint, IdentityVerifier,
    JsonPackageRegistry, ManifestRegistry, PackageRegistry,
};
pub use measurement::{MeasurementResult, MeasurementSubmission};
pub use protocol::{
    BridgeClient, DispatchOutcome, Dispatcher, Method, RequestEnvelope, ResponseEnvelope,
    WireReply, WireRequest,
};

// Re-export storage types
pub use storage::{
    ChangeEvent, ChangeStream, MeasurementStore, PrefStore, ResultStore, StoredResult,
    SubjectSelection, SubjectStore,
};

// Re-export job types
pub use jobs::{
    JobHandler, JobId, JobOutcome, JobQueue, JobState, JobWorker, PendingJob, ResultSyncJob,
    RetryPolicy, WorkerHandle,
};
