//! Names both sides of the bridge agree on.

/// Fetch the current subject and the last stored result.
pub const METHOD_REQUEST_DATA: &str = "METHOD_REQUEST_DATA";
/// Hand a measurement result to the host.
pub const METHOD_SUBMIT_RESULT: &str = "METHOD_SUBMIT_RESULT";

/// Short method names, accepted as aliases.
pub const REQUEST_DATA: &str = "REQUEST_DATA";
pub const SUBMIT_RESULT: &str = "SUBMIT_RESULT";

/// Optional request id argument.
pub const ARG_REQUEST_ID: &str = "requestId";
/// Payload argument (a JSON document carried as a string).
pub const ARG_PAYLOAD: &str = "payload";

/// Argument names used by older callers.
pub const EXTRA_REQUEST_ID: &str = "EXTRA_REQUEST_ID";
pub const EXTRA_PAYLOAD: &str = "EXTRA_PAYLOAD";

// ── Response keys ─────────────────────────────────────────────────────────────

pub const KEY_OK: &str = "ok";
pub const KEY_DATA: &str = "data";
pub const KEY_ERROR: &str = "error";
pub const KEY_STATUS: &str = "status";

// ── REQUEST_DATA document keys ────────────────────────────────────────────────

pub const DATA_REQUEST_ID: &str = "requestId";
pub const DATA_TIMESTAMP: &str = "timestamp";
pub const DATA_MESSAGE: &str = "message";
pub const DATA_LAST_PAYLOAD: &str = "lastPayload";
pub const DATA_LAST_REQUEST_ID: &str = "lastRequestId";
pub const DATA_LAST_UPDATED_AT: &str = "lastUpdatedAt";

/// `status` of an accepted submission.
pub const STATUS_ACCEPTED: &str = "accepted";

/// Error text for a submission without a payload.
pub const ERROR_PAYLOAD_REQUIRED: &str = "payload is required";
