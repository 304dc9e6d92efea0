//! Last-result persistence: the most recent payload received over the bridge.
//!
//! Exactly one result is kept. Every save overwrites the previous one; there
//! is no history and no merge.

use std::path::Path;

use log::error;
use serde::{Deserialize, Serialize};

use super::prefs::{ChangeStream, PrefStore};
use crate::error::Result;

/// Store file name.
pub const RESULT_PREFS: &str = "bridge_storage";

pub const KEY_LAST_REQUEST_ID: &str = "last_request_id";
pub const KEY_LAST_PAYLOAD: &str = "last_payload";
pub const KEY_LAST_UPDATED_AT: &str = "last_updated_at";

/// The last payload accepted from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResult {
    /// Request id sent by the caller (empty when none was sent).
    pub request_id: String,
    /// Payload exactly as received.
    pub payload: String,
    /// Save time, Unix epoch milliseconds.
    pub updated_at: i64,
}

/// Durable holder of the single [`StoredResult`].
#[derive(Debug, Clone)]
pub struct ResultStore {
    prefs: PrefStore,
}

impl ResultStore {
    /// Open the store inside `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            prefs: PrefStore::open(dir, RESULT_PREFS)?,
        })
    }

    /// Save a result, stamping it with the current time.
    ///
    /// Returns `true` only once the write is durable on disk. Failures are
    /// logged and reported as `false`.
    pub fn save(&self, request_id: &str, payload: &str) -> bool {
        match self.save_at(request_id, payload, crate::time::now_millis()) {
            Ok(()) => true,
            Err(e) => {
                error!("failed to persist last result (requestId={request_id}): {e}");
                false
            }
        }
    }

    /// Save a result with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the underlying prefs file.
    pub fn save_at(&self, request_id: &str, payload: &str, updated_at: i64) -> Result<()> {
        let mut editor = self.prefs.edit();
        editor
            .put_string(KEY_LAST_REQUEST_ID, request_id)
            .put_string(KEY_LAST_PAYLOAD, payload)
            .put_long(KEY_LAST_UPDATED_AT, updated_at);
        editor.commit()
    }

    /// The last stored result, or `None` if nothing was ever stored.
    ///
    /// A missing request id reads as `""` and a missing timestamp as `0`;
    /// only the payload decides presence.
    pub fn last(&self) -> Result<Option<StoredResult>> {
        let prefs = self.prefs.snapshot()?;
        let Some(payload) = prefs.get_string(KEY_LAST_PAYLOAD) else {
            return Ok(None);
        };
        Ok(Some(StoredResult {
            request_id: prefs
                .get_string(KEY_LAST_REQUEST_ID)
                .unwrap_or_default()
                .to_string(),
            payload: payload.to_string(),
            updated_at: prefs.get_long(KEY_LAST_UPDATED_AT).unwrap_or(0),
        }))
    }

    /// Forget the stored result (external reset).
    pub fn clear(&self) -> Result<()> {
        let mut editor = self.prefs.edit();
        editor
            .remove(KEY_LAST_REQUEST_ID)
            .remove(KEY_LAST_PAYLOAD)
            .remove(KEY_LAST_UPDATED_AT);
        editor.commit()
    }

    /// Watch for new results.
    pub fn subscribe(&self) -> ChangeStream {
        self.prefs
            .subscribe([KEY_LAST_REQUEST_ID, KEY_LAST_PAYLOAD, KEY_LAST_UPDATED_AT])
    }
}
