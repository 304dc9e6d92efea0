//! Socket framing: newline-delimited JSON.
//!
//! Request frame:
//!
//! ```json
//! {"method": "METHOD_SUBMIT_RESULT", "arguments": {"requestId": "r1", "payload": "{...}"}}
//! ```
//!
//! Reply frames:
//!
//! ```json
//! {"kind": "response", "ok": true, "status": "accepted"}
//! {"kind": "security_denied", "reason": "Caller rejected: uid=10123 packages=com.example"}
//! ```
//!
//! A `security_denied` frame is always the last frame on its connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::envelope::{DispatchOutcome, ResponseEnvelope};
use crate::error::{BridgeError, Result};

/// Longest request line a server accepts, not counting the line ending.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// One call as sent over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl WireRequest {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    /// Parse one request line (without the trailing newline).
    pub fn decode(line: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| BridgeError::Serialization(e.to_string()))
    }
}

/// One reply as sent over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireReply {
    Response(ResponseEnvelope),
    SecurityDenied { reason: String },
}

impl WireReply {
    /// Reply to a frame that could not be parsed.
    pub fn malformed(message: impl std::fmt::Display) -> Self {
        WireReply::Response(ResponseEnvelope::error(format!(
            "malformed request: {message}"
        )))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, WireReply::SecurityDenied { .. })
    }

    /// Serialize to a single line, without the trailing newline.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| BridgeError::Serialization(e.to_string()))
    }

    pub fn decode(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| {
            BridgeError::Serialization(format!("invalid reply frame: {e}"))
        })
    }
}

impl From<DispatchOutcome> for WireReply {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Handled(response) => WireReply::Response(response),
            DispatchOutcome::Denied(reason) => WireReply::SecurityDenied {
                reason: reason.to_string(),
            },
        }
    }
}
