//! Storage layer for everything the gateway persists.
//!
//! # Directory layout
//!
//! The default root is `~/.bridge/` (override with `BRIDGE_HOME`):
//!
//! ```text
//! ~/.bridge/
//! ├── config.json
//! ├── registry.json
//! ├── bridge.sock
//! ├── prefs/
//! │   ├── bridge_storage.json
//! │   ├── measurement_prefs.json
//! │   └── subject_prefs.json
//! └── jobs/
//!     └── {job_id}.json
//! ```
//!
//! # Modules
//!
//! - [`prefs`]: durable key-value files with batched atomic commits.
//! - [`result_store`]: the single last payload received.
//! - [`measurement_store`]: the latest measurement record, one key per field.
//! - [`subject_store`]: the subject currently selected on the host.

pub mod measurement_store;
pub mod prefs;
pub mod result_store;
pub mod subject_store;

pub use measurement_store::MeasurementStore;
pub use prefs::{ChangeEvent, ChangeStream, Editor, PrefStore, PrefValue, Prefs};
pub use result_store::{ResultStore, StoredResult};
pub use subject_store::{SubjectSelection, SubjectStore};

/// Flush a directory entry after a rename or unlink inside `dir`, so the
/// change survives power loss.
pub(crate) fn sync_dir(dir: &std::path::Path) -> crate::error::Result<()> {
    std::fs::File::open(dir)?.sync_all()?;
    Ok(())
}
