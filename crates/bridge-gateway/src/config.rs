//! Gateway configuration.
//!
//! Configuration lives in `{data_dir}/config.json`. Every field is optional;
//! a missing file means all defaults. The data directory itself is
//! `$BRIDGE_HOME`, falling back to `~/.bridge`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::identity::{AllowlistEntry, IdentityVerifier, ManifestRegistry};
use crate::jobs::{JobQueue, RetryPolicy};
use crate::protocol::Dispatcher;
use crate::storage::{MeasurementStore, ResultStore, SubjectStore};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Environment variable overriding the data directory.
pub const ENV_HOME: &str = "BRIDGE_HOME";

pub const CONFIG_FILE: &str = "config.json";
pub const SOCKET_FILE: &str = "bridge.sock";
pub const REGISTRY_FILE: &str = "registry.json";

/// Package allowed through the bridge unless configured otherwise.
pub const DEFAULT_ALLOWED_PACKAGE: &str = "com.exosystems.b2b.integration";

/// SHA-256 of the allowed package's signing certificate.
pub const DEFAULT_ALLOWED_FINGERPRINT: &str =
    "6E:0A:49:3E:4C:7E:F0:38:41:A4:17:F1:49:BD:78:22:F7:A2:60:D2:EE:93:32:1F:AB:75:85:88:12:3F:94:38";

const DEFAULT_WORKER_POLL_MS: u64 = 5_000;

// ── BridgeConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Directory holding config, stores, jobs and the socket. Not stored in
    /// the file: it is wherever the file was loaded from.
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Socket path; `{data_dir}/bridge.sock` when unset.
    pub socket_path: Option<PathBuf>,
    /// Package registry manifest; `{data_dir}/registry.json` when unset.
    pub registry_path: Option<PathBuf>,
    pub allowed_package: String,
    /// Colon-separated or plain hex.
    pub allowed_fingerprint: String,
    /// Uid treated as the host itself; the server's own uid when unset.
    pub host_uid: Option<u32>,
    /// Enqueue a sync job for every accepted submission.
    pub sync_on_submit: bool,
    pub retry: RetryPolicy,
    pub worker_poll_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            socket_path: None,
            registry_path: None,
            allowed_package: DEFAULT_ALLOWED_PACKAGE.to_string(),
            allowed_fingerprint: DEFAULT_ALLOWED_FINGERPRINT.to_string(),
            host_uid: None,
            sync_on_submit: true,
            retry: RetryPolicy::default(),
            worker_poll_ms: DEFAULT_WORKER_POLL_MS,
        }
    }
}

impl BridgeConfig {
    /// Defaults rooted at `data_dir`.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load `{data_dir}/config.json`, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Config` if the file exists but is not valid.
    pub fn load(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let path = data_dir.join(CONFIG_FILE);

        let mut config = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<BridgeConfig>(&bytes).map_err(|e| {
                BridgeError::Config(format!("invalid config {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BridgeConfig::default(),
            Err(e) => return Err(BridgeError::Io(e)),
        };
        config.data_dir = data_dir;
        Ok(config)
    }

    /// Load from the default data directory.
    pub fn load_default() -> Result<Self> {
        Self::load(default_data_dir()?)
    }

    /// Write `{data_dir}/config.json`.
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BridgeError::Serialization(e.to_string()))?;
        std::fs::write(self.data_dir.join(CONFIG_FILE), json.as_bytes())?;
        Ok(())
    }

    // ── Derived paths ─────────────────────────────────────────────────────────

    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(SOCKET_FILE))
    }

    pub fn registry_path(&self) -> PathBuf {
        self.registry_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(REGISTRY_FILE))
    }

    pub fn prefs_dir(&self) -> PathBuf {
        self.data_dir.join("prefs")
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join("jobs")
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_ms)
    }

    pub fn allowlist(&self) -> AllowlistEntry {
        AllowlistEntry::new(self.allowed_package.as_str(), &self.allowed_fingerprint)
    }

    // ── Wiring ────────────────────────────────────────────────────────────────

    /// Open the registry manifest. A missing manifest is an empty registry:
    /// only the host uid will get through. Later edits to the file are
    /// picked up on the next call.
    pub fn open_registry(&self) -> Result<ManifestRegistry> {
        ManifestRegistry::open(self.registry_path())
    }

    pub fn open_job_queue(&self) -> Result<JobQueue> {
        JobQueue::open(self.jobs_dir(), self.retry)
    }

    /// Build the dispatcher for this configuration.
    ///
    /// `default_host_uid` is used unless the file pins `host_uid`.
    pub fn build_dispatcher(&self, default_host_uid: u32) -> Result<Dispatcher> {
        let verifier = IdentityVerifier::new(
            self.host_uid.unwrap_or(default_host_uid),
            self.allowlist(),
            Arc::new(self.open_registry()?),
        );
        let prefs = self.prefs_dir();
        let dispatcher = Dispatcher::new(
            verifier,
            SubjectStore::open(&prefs)?,
            MeasurementStore::open(&prefs)?,
            ResultStore::open(&prefs)?,
        );

        if self.sync_on_submit {
            Ok(dispatcher.with_job_queue(self.open_job_queue()?))
        } else {
            Ok(dispatcher)
        }
    }
}

// ── Directory helpers ─────────────────────────────────────────────────────────

/// `$BRIDGE_HOME`, else `$HOME/.bridge`.
///
/// # Errors
///
/// Returns `BridgeError::Config` if neither variable is set.
pub fn default_data_dir() -> Result<PathBuf> {
    resolve_data_dir(std::env::var_os(ENV_HOME), std::env::var_os("HOME"))
}

fn resolve_data_dir(bridge_home: Option<OsString>, home: Option<OsString>) -> Result<PathBuf> {
    if let Some(dir) = bridge_home.filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    home.filter(|h| !h.is_empty())
        .map(|h| Path::new(&h).join(".bridge"))
        .ok_or_else(|| BridgeError::Config(format!("neither {ENV_HOME} nor HOME is set")))
}
