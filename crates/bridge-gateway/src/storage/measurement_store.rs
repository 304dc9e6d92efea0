//! Measurement record persistence.
//!
//! The record is spread over one key per field so the host UI can read and
//! observe individual values. It is written as a single prefs batch and read
//! back all-or-nothing: if any required key is missing the record is `None`.
//!
//! Legacy keys (`electric_id`, `electric_mode_id`, `electric_progress_time`)
//! are written only when the payload carried the legacy aliases.

use std::path::Path;

use super::prefs::{ChangeStream, PrefStore, Prefs};
use crate::error::Result;
use crate::measurement::{MeasurementResult, MeasurementSubmission};

/// Store file name.
pub const MEASUREMENT_PREFS: &str = "measurement_prefs";

pub const KEY_USER_ID: &str = "userId";
pub const KEY_DATE_TIME: &str = "dateTime";
pub const KEY_MODE: &str = "mode";
pub const KEY_AMPLITUDE: &str = "amplitude";
pub const KEY_FREQUENCY: &str = "frequency";
pub const KEY_PERIOD: &str = "period";
pub const KEY_CYCLE: &str = "cycle";
pub const KEY_PHASE: &str = "phase";
pub const KEY_ON_TIME: &str = "onTime";
pub const KEY_OFF_TIME: &str = "offTime";
pub const KEY_RAMP_TIME: &str = "rampTime";
pub const KEY_DUTY: &str = "duty";
pub const KEY_TOTAL_TIME: &str = "totalTime";
pub const KEY_PROGRESS_TIME: &str = "progressTime";
pub const KEY_IS_BILLABLE: &str = "isBillable";
pub const KEY_MEASUREMENT_CODE: &str = "measurement_code";

pub const KEY_LEGACY_ID: &str = "electric_id";
pub const KEY_LEGACY_MODE_ID: &str = "electric_mode_id";
pub const KEY_LEGACY_PROGRESS_TIME: &str = "electric_progress_time";

/// Every key this store owns, in write order.
pub const ALL_KEYS: [&str; 19] = [
    KEY_USER_ID,
    KEY_DATE_TIME,
    KEY_MODE,
    KEY_AMPLITUDE,
    KEY_FREQUENCY,
    KEY_PERIOD,
    KEY_CYCLE,
    KEY_PHASE,
    KEY_ON_TIME,
    KEY_OFF_TIME,
    KEY_RAMP_TIME,
    KEY_DUTY,
    KEY_TOTAL_TIME,
    KEY_PROGRESS_TIME,
    KEY_IS_BILLABLE,
    KEY_MEASUREMENT_CODE,
    KEY_LEGACY_ID,
    KEY_LEGACY_MODE_ID,
    KEY_LEGACY_PROGRESS_TIME,
];

/// Durable home of the latest [`MeasurementResult`].
#[derive(Debug, Clone)]
pub struct MeasurementStore {
    prefs: PrefStore,
}

impl MeasurementStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            prefs: PrefStore::open(dir, MEASUREMENT_PREFS)?,
        })
    }

    /// Persist a submission as one atomic batch.
    ///
    /// Optional keys absent from the submission are removed so a previous
    /// submission's `measurement_code` or legacy ids cannot leak into this
    /// one.
    pub fn save(&self, submission: &MeasurementSubmission) -> Result<()> {
        let r = &submission.result;
        let mut editor = self.prefs.edit();
        editor
            .put_int(KEY_USER_ID, r.user_id)
            .put_string(KEY_DATE_TIME, r.date_time.as_str())
            .put_string(KEY_MODE, r.mode.as_str())
            .put_int(KEY_AMPLITUDE, r.amplitude)
            .put_int(KEY_FREQUENCY, r.frequency)
            .put_string(KEY_PERIOD, r.period.to_string())
            .put_int(KEY_CYCLE, r.cycle)
            .put_int(KEY_PHASE, r.phase)
            .put_int(KEY_ON_TIME, r.on_time)
            .put_int(KEY_OFF_TIME, r.off_time)
            .put_string(KEY_RAMP_TIME, r.ramp_time.to_string())
            .put_int(KEY_DUTY, r.duty)
            .put_int(KEY_TOTAL_TIME, r.total_time)
            .put_int(KEY_PROGRESS_TIME, r.progress_time)
            .put_bool(KEY_IS_BILLABLE, r.is_billable);

        match &r.measurement_code {
            Some(code) => editor.put_string(KEY_MEASUREMENT_CODE, code.as_str()),
            None => editor.remove(KEY_MEASUREMENT_CODE),
        };

        let aliases = submission.aliases;
        match aliases.id {
            Some(id) => editor.put_long(KEY_LEGACY_ID, id),
            None => editor.remove(KEY_LEGACY_ID),
        };
        match aliases.mode_id {
            Some(mode_id) => editor.put_long(KEY_LEGACY_MODE_ID, mode_id),
            None => editor.remove(KEY_LEGACY_MODE_ID),
        };
        if aliases.is_empty() {
            editor.remove(KEY_LEGACY_PROGRESS_TIME);
        } else {
            editor.put_long(KEY_LEGACY_PROGRESS_TIME, i64::from(r.progress_time));
        }

        editor.commit()
    }

    /// Read the record back; `None` unless every required field is present.
    pub fn load(&self) -> Result<Option<MeasurementResult>> {
        Ok(record_from_prefs(&self.prefs.snapshot()?))
    }

    /// Remove the record and its legacy keys.
    pub fn clear(&self) -> Result<()> {
        let mut editor = self.prefs.edit();
        for key in ALL_KEYS {
            editor.remove(key);
        }
        editor.commit()
    }

    /// Watch every key of the record.
    pub fn subscribe(&self) -> ChangeStream {
        self.prefs.subscribe(ALL_KEYS)
    }
}

fn record_from_prefs(prefs: &Prefs) -> Option<MeasurementResult> {
    let decimal = |key: &str| prefs.get_string(key)?.parse::<f64>().ok();

    Some(MeasurementResult {
        user_id: prefs.get_int(KEY_USER_ID)?,
        date_time: prefs.get_string(KEY_DATE_TIME)?.to_string(),
        mode: prefs.get_string(KEY_MODE)?.to_string(),
        amplitude: prefs.get_int(KEY_AMPLITUDE)?,
        frequency: prefs.get_int(KEY_FREQUENCY)?,
        period: decimal(KEY_PERIOD)?,
        cycle: prefs.get_int(KEY_CYCLE)?,
        phase: prefs.get_int(KEY_PHASE)?,
        on_time: prefs.get_int(KEY_ON_TIME)?,
        off_time: prefs.get_int(KEY_OFF_TIME)?,
        ramp_time: decimal(KEY_RAMP_TIME)?,
        duty: prefs.get_int(KEY_DUTY)?,
        total_time: prefs.get_int(KEY_TOTAL_TIME)?,
        progress_time: prefs.get_int(KEY_PROGRESS_TIME)?,
        is_billable: prefs.get_bool(KEY_IS_BILLABLE).unwrap_or(false),
        measurement_code: prefs.get_string(KEY_MEASUREMENT_CODE).map(str::to_string),
    })
}
