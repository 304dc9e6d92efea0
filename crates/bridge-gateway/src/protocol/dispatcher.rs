//! Protocol dispatcher: authenticates a call, routes it, builds the reply.
//!
//! Every call is an independent synchronous transaction. Authentication runs
//! first and a denial short-circuits before arguments are even looked at.
//! After that nothing escapes as a panic or an `Err`: every failure becomes
//! an `ok=false` envelope.

use log::{debug, error, warn};
use serde_json::{Map, Value};

use super::contract::{
    DATA_LAST_PAYLOAD, DATA_LAST_REQUEST_ID, DATA_LAST_UPDATED_AT, DATA_MESSAGE, DATA_REQUEST_ID,
    DATA_TIMESTAMP, ERROR_PAYLOAD_REQUIRED,
};
use super::envelope::{DispatchOutcome, Method, RequestEnvelope, ResponseEnvelope};
use crate::error::Result;
use crate::identity::{AuthDecision, IdentityVerifier};
use crate::jobs::JobQueue;
use crate::measurement::MeasurementSubmission;
use crate::storage::{MeasurementStore, ResultStore, SubjectStore};

/// Routes bridge calls. Shared across connections behind an `Arc`.
#[derive(Debug)]
pub struct Dispatcher {
    verifier: IdentityVerifier,
    subjects: SubjectStore,
    measurements: MeasurementStore,
    results: ResultStore,
    /// Follow-up sync queue; `None` disables enqueueing on submit.
    jobs: Option<JobQueue>,
}

impl Dispatcher {
    pub fn new(
        verifier: IdentityVerifier,
        subjects: SubjectStore,
        measurements: MeasurementStore,
        results: ResultStore,
    ) -> Self {
        Self {
            verifier,
            subjects,
            measurements,
            results,
            jobs: None,
        }
    }

    /// Enqueue a sync job for every accepted submission.
    pub fn with_job_queue(mut self, queue: JobQueue) -> Self {
        self.jobs = Some(queue);
        self
    }

    pub fn verifier(&self) -> &IdentityVerifier {
        &self.verifier
    }

    pub fn subjects(&self) -> &SubjectStore {
        &self.subjects
    }

    pub fn measurements(&self) -> &MeasurementStore {
        &self.measurements
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn jobs(&self) -> Option<&JobQueue> {
        self.jobs.as_ref()
    }

    /// Handle one call from `caller_uid`.
    pub fn handle(&self, caller_uid: u32, method: &str, arguments: &Value) -> DispatchOutcome {
        if let AuthDecision::Deny(reason) = self.verifier.authenticate(caller_uid) {
            warn!("denied {method} from uid={caller_uid}: {reason}");
            return DispatchOutcome::Denied(reason);
        }

        let Some(parsed) = Method::parse(method) else {
            debug!("unknown method {method:?} from uid={caller_uid}");
            return DispatchOutcome::Handled(ResponseEnvelope::error(format!(
                "Unknown method: {method}"
            )));
        };

        let envelope = RequestEnvelope::from_arguments(parsed, arguments);
        let response = match self.route(&envelope) {
            Ok(response) => response,
            Err(e) => {
                error!("call({method}) failed: {e}");
                ResponseEnvelope::error(format!("call failed: {e}"))
            }
        };
        DispatchOutcome::Handled(response)
    }

    fn route(&self, envelope: &RequestEnvelope) -> Result<ResponseEnvelope> {
        match envelope.method {
            Method::RequestData => self.handle_request_data(envelope),
            Method::SubmitResult => Ok(self.handle_submit_result(envelope)),
        }
    }

    // ── REQUEST_DATA ──────────────────────────────────────────────────────────

    fn handle_request_data(&self, envelope: &RequestEnvelope) -> Result<ResponseEnvelope> {
        let data = self.request_data_json(envelope.request_id_or_empty())?;
        debug!("sending data: {data}");
        Ok(ResponseEnvelope::data(data))
    }

    /// The `data` document returned by `REQUEST_DATA`.
    pub fn request_data_json(&self, request_id: &str) -> Result<String> {
        let mut data = Map::new();
        data.insert(DATA_REQUEST_ID.into(), Value::from(request_id));
        data.insert(DATA_TIMESTAMP.into(), Value::from(crate::time::now_millis()));

        let message = self
            .subjects
            .current()?
            .map(|subject| subject.to_message_json())
            .unwrap_or_default();
        data.insert(DATA_MESSAGE.into(), Value::from(message));

        if let Some(last) = self.results.last()? {
            data.insert(DATA_LAST_PAYLOAD.into(), Value::from(last.payload));
            data.insert(DATA_LAST_REQUEST_ID.into(), Value::from(last.request_id));
            data.insert(DATA_LAST_UPDATED_AT.into(), Value::from(last.updated_at));
        }

        Ok(Value::Object(data).to_string())
    }

    // ── SUBMIT_RESULT ─────────────────────────────────────────────────────────

    fn handle_submit_result(&self, envelope: &RequestEnvelope) -> ResponseEnvelope {
        let Some(payload) = envelope
            .payload
            .as_deref()
            .filter(|p| !p.trim().is_empty())
        else {
            warn!("received empty payload for measurement result");
            return ResponseEnvelope::error(ERROR_PAYLOAD_REQUIRED);
        };

        match self.accept_submission(envelope.request_id_or_empty(), payload) {
            Ok(()) => ResponseEnvelope::accepted(),
            Err(e) => {
                error!("failed to process measurement result: {e}");
                ResponseEnvelope::error(format!("Failed to process electric result: {e}"))
            }
        }
    }

    /// Persist the record, then the raw payload, then hand off to the queue.
    ///
    /// Only the record write decides the outcome. The last-result save and
    /// the enqueue are logged on failure but do not fail the call.
    fn accept_submission(&self, request_id: &str, payload: &str) -> Result<()> {
        let submission = MeasurementSubmission::parse(payload)?;
        debug!(
            "received measurement result: userId={} progressTime={} id={:?} modeId={:?}",
            submission.result.user_id,
            submission.result.progress_time,
            submission.aliases.id,
            submission.aliases.mode_id
        );
        self.measurements.save(&submission)?;

        if !self.results.save(request_id, payload) {
            return Ok(());
        }

        if let Some(queue) = &self.jobs {
            if let Err(e) = queue.enqueue(request_id, payload) {
                error!("failed to enqueue result sync (requestId={request_id}): {e}");
            }
        }
        Ok(())
    }
}
