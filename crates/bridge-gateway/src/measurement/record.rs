//! The measurement result submitted by the caller.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::coerce::{has, opt_bool, opt_f64, opt_i32, opt_i64, opt_string};
use crate::error::{BridgeError, Result};

/// One stimulation session result, as persisted for the host UI.
///
/// Field names follow the caller's JSON (`camelCase`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementResult {
    pub user_id: i32,
    pub date_time: String,
    pub mode: String,
    pub amplitude: i32,
    pub frequency: i32,
    pub period: f64,
    pub cycle: i32,
    pub phase: i32,
    pub on_time: i32,
    pub off_time: i32,
    pub ramp_time: f64,
    pub duty: i32,
    pub total_time: i32,
    pub progress_time: i32,
    pub is_billable: bool,
    pub measurement_code: Option<String>,
}

/// Identifiers older callers send instead of (or alongside) the full record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegacyAliases {
    /// `id` in the payload.
    pub id: Option<i64>,
    /// `modeId` in the payload.
    pub mode_id: Option<i64>,
}

impl LegacyAliases {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.mode_id.is_none()
    }
}

/// A parsed `SUBMIT_RESULT` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementSubmission {
    pub result: MeasurementResult,
    pub aliases: LegacyAliases,
}

impl MeasurementSubmission {
    /// Parse a payload with permissive coercion.
    ///
    /// Only the outer shape is validated: the payload must be a JSON object.
    /// Individual fields fall back to `0` / `0.0` / `""` / `false` when they
    /// are missing or malformed.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidPayload` if the payload is not valid JSON
    /// or not an object.
    pub fn parse(payload: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| BridgeError::InvalidPayload(format!("payload is not valid JSON: {e}")))?;
        let obj = value.as_object().ok_or_else(|| {
            BridgeError::InvalidPayload(format!(
                "payload must be a JSON object, got {}",
                json_kind(&value)
            ))
        })?;
        Ok(Self::from_object(obj))
    }

    /// Extract every field from an already-parsed object.
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        let result = MeasurementResult {
            user_id: opt_i32(obj, "userId"),
            date_time: opt_string(obj, "dateTime"),
            mode: opt_string(obj, "mode"),
            amplitude: opt_i32(obj, "amplitude"),
            frequency: opt_i32(obj, "frequency"),
            period: opt_f64(obj, "period"),
            cycle: opt_i32(obj, "cycle"),
            phase: opt_i32(obj, "phase"),
            on_time: opt_i32(obj, "onTime"),
            off_time: opt_i32(obj, "offTime"),
            ramp_time: opt_f64(obj, "rampTime"),
            duty: opt_i32(obj, "duty"),
            total_time: opt_i32(obj, "totalTime"),
            progress_time: opt_i32(obj, "progressTime"),
            is_billable: opt_bool(obj, "isBillable"),
            measurement_code: has(obj, "measurementCode")
                .then(|| opt_string(obj, "measurementCode")),
        };

        let aliases = LegacyAliases {
            id: has(obj, "id").then(|| opt_i64(obj, "id")),
            mode_id: has(obj, "modeId").then(|| opt_i64(obj, "modeId")),
        };

        Self { result, aliases }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
