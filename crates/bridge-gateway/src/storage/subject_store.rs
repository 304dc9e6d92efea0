//! The subject currently selected on the host, served by `REQUEST_DATA`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::prefs::{ChangeStream, PrefStore};
use crate::error::Result;

/// Store file name.
pub const SUBJECT_PREFS: &str = "subject_prefs";

pub const KEY_MEASUREMENT_CODE: &str = "measurement_code";
pub const KEY_SUBJECT_CODE: &str = "subject_code";
pub const KEY_SUBJECT_NAME: &str = "subject_name";

const KEYS: [&str; 3] = [KEY_MEASUREMENT_CODE, KEY_SUBJECT_CODE, KEY_SUBJECT_NAME];

/// Who is being measured right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSelection {
    pub measurement_code: String,
    pub subject_code: String,
    pub subject_name: String,
}

impl SubjectSelection {
    pub fn new(
        measurement_code: impl Into<String>,
        subject_code: impl Into<String>,
        subject_name: impl Into<String>,
    ) -> Self {
        Self {
            measurement_code: measurement_code.into(),
            subject_code: subject_code.into(),
            subject_name: subject_name.into(),
        }
    }

    /// Compact JSON sent to the caller in the `message` field.
    pub fn to_message_json(&self) -> String {
        serde_json::json!({
            "measurementCode": self.measurement_code,
            "subjectCode": self.subject_code,
            "subjectName": self.subject_name,
        })
        .to_string()
    }
}

#[derive(Debug, Clone)]
pub struct SubjectStore {
    prefs: PrefStore,
}

impl SubjectStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            prefs: PrefStore::open(dir, SUBJECT_PREFS)?,
        })
    }

    /// Replace the current selection.
    pub fn select(&self, selection: &SubjectSelection) -> Result<()> {
        let mut editor = self.prefs.edit();
        editor
            .put_string(KEY_MEASUREMENT_CODE, selection.measurement_code.as_str())
            .put_string(KEY_SUBJECT_CODE, selection.subject_code.as_str())
            .put_string(KEY_SUBJECT_NAME, selection.subject_name.as_str());
        editor.commit()
    }

    pub fn clear(&self) -> Result<()> {
        let mut editor = self.prefs.edit();
        for key in KEYS {
            editor.remove(key);
        }
        editor.commit()
    }

    /// The current selection; `None` unless all three keys are present.
    pub fn current(&self) -> Result<Option<SubjectSelection>> {
        let prefs = self.prefs.snapshot()?;
        let field = |key: &str| prefs.get_string(key).map(str::to_string);
        Ok(
            match (
                field(KEY_MEASUREMENT_CODE),
                field(KEY_SUBJECT_CODE),
                field(KEY_SUBJECT_NAME),
            ) {
                (Some(measurement_code), Some(subject_code), Some(subject_name)) => {
                    Some(SubjectSelection {
                        measurement_code,
                        subject_code,
                        subject_name,
                    })
                }
                _ => None,
            },
        )
    }

    pub fn subscribe(&self) -> ChangeStream {
        self.prefs.subscribe(KEYS)
    }
}
