//! Request and response envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::contract::{
    ARG_PAYLOAD, ARG_REQUEST_ID, EXTRA_PAYLOAD, EXTRA_REQUEST_ID, METHOD_REQUEST_DATA,
    METHOD_SUBMIT_RESULT, REQUEST_DATA, STATUS_ACCEPTED, SUBMIT_RESULT,
};
use crate::identity::DenyReason;

/// The two bridge operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    RequestData,
    SubmitResult,
}

impl Method {
    /// Accepts the full contract name or the short alias.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            METHOD_REQUEST_DATA | REQUEST_DATA => Some(Method::RequestData),
            METHOD_SUBMIT_RESULT | SUBMIT_RESULT => Some(Method::SubmitResult),
            _ => None,
        }
    }

    /// Canonical contract name.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::RequestData => METHOD_REQUEST_DATA,
            Method::SubmitResult => METHOD_SUBMIT_RESULT,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound call after method resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub method: Method,
    pub request_id: Option<String>,
    pub payload: Option<String>,
}

impl RequestEnvelope {
    /// Read the call arguments. Only string values count; anything else
    /// (numbers, objects, `null`) is treated as absent.
    pub fn from_arguments(method: Method, arguments: &Value) -> Self {
        Self {
            method,
            request_id: string_arg(arguments, &[ARG_REQUEST_ID, EXTRA_REQUEST_ID]),
            payload: string_arg(arguments, &[ARG_PAYLOAD, EXTRA_PAYLOAD]),
        }
    }

    /// Request id, `""` when the caller sent none.
    pub fn request_id_or_empty(&self) -> &str {
        self.request_id.as_deref().unwrap_or("")
    }
}

fn string_arg(arguments: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| arguments.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Reply to a handled call.
///
/// Success carries `data` or `status`; failure carries `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ResponseEnvelope {
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            ok: true,
            data: Some(data.into()),
            error: None,
            status: None,
        }
    }

    pub fn status(status: impl Into<String>) -> Self {
        Self {
            ok: true,
            data: None,
            error: None,
            status: Some(status.into()),
        }
    }

    pub fn accepted() -> Self {
        Self::status(STATUS_ACCEPTED)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
            status: None,
        }
    }
}

/// Result of dispatching one call.
///
/// A denial is not a response: the transport must surface it as a security
/// failure, never as an `ok=false` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Denied(DenyReason),
    Handled(ResponseEnvelope),
}

impl DispatchOutcome {
    pub fn is_denied(&self) -> bool {
        matches!(self, DispatchOutcome::Denied(_))
    }

    /// The response, if the call got past authentication.
    pub fn response(&self) -> Option<&ResponseEnvelope> {
        match self {
            DispatchOutcome::Handled(response) => Some(response),
            DispatchOutcome::Denied(_) => None,
        }
    }
}
