//! Preference files: small durable key-value stores.
//!
//! Each store is one JSON file `{dir}/{name}.json`:
//!
//! ```json
//! {
//!     "version": 1,
//!     "entries": {
//!         "last_payload": { "type": "string", "value": "{...}" },
//!         "last_updated_at": { "type": "long", "value": 1704067200000 }
//!     }
//! }
//! ```
//!
//! Writes go through an [`Editor`] and are committed as one batch: the whole
//! file is rewritten to a sibling temp file, fsynced and renamed into place.
//! A reader therefore sees either every key of a batch or none of them.
//! Commits are serialized within the process by a mutex and across processes
//! by an exclusive `fs2` lock on `{name}.lock`.
//!
//! Change notifications are in-process only: a [`ChangeStream`] receives one
//! [`ChangeEvent`] per commit that changed at least one subscribed key.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

// ── File format constants ─────────────────────────────────────────────────────

const PREFS_FILE_VERSION: u32 = 1;

// ── Values ────────────────────────────────────────────────────────────────────

/// A typed preference value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PrefValue {
    String(String),
    Int(i32),
    Long(i64),
    Bool(bool),
}

/// Wrapper written to disk for each store.
#[derive(Debug, Serialize, Deserialize)]
struct PrefsFile {
    version: u32,
    entries: BTreeMap<String, PrefValue>,
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Point-in-time view of one store. All reads of a multi-key record should
/// go through a single snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prefs {
    entries: BTreeMap<String, PrefValue>,
}

impl Prefs {
    pub fn get(&self, key: &str) -> Option<&PrefValue> {
        self.entries.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(PrefValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.entries.get(key) {
            Some(PrefValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.entries.get(key) {
            Some(PrefValue::Long(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.entries.get(key) {
            Some(PrefValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Change notifications ──────────────────────────────────────────────────────

/// Keys changed by one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Store name.
    pub store: String,
    /// Changed keys that the subscriber asked for, sorted.
    pub keys: Vec<String>,
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub struct ChangeStream {
    rx: mpsc::Receiver<ChangeEvent>,
}

impl ChangeStream {
    /// Next event if one is already queued.
    pub fn try_next(&self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        self.rx.recv_timeout(timeout).ok()
    }
}

impl Iterator for ChangeStream {
    type Item = ChangeEvent;

    /// Blocks until the next event; ends when the store is dropped.
    fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().ok()
    }
}

struct Subscriber {
    /// `None` = every key.
    keys: Option<BTreeSet<String>>,
    tx: mpsc::Sender<ChangeEvent>,
}

// ── PrefStore ─────────────────────────────────────────────────────────────────

struct Inner {
    name: String,
    dir: PathBuf,
    path: PathBuf,
    tmp_path: PathBuf,
    lock_path: PathBuf,
    write_lock: Mutex<()>,
    subscribers: Mutex<Vec<Subscriber>>,
}

/// Handle to one preference file. Cheap to clone; clones share the write
/// lock and subscriber list.
#[derive(Clone)]
pub struct PrefStore {
    inner: Arc<Inner>,
}

impl PrefStore {
    /// Open (or lazily create) the store `{dir}/{name}.json`.
    ///
    /// The directory is created if it does not exist. The file itself is
    /// only written on the first commit.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Io` if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                dir: dir.to_path_buf(),
                path: dir.join(format!("{name}.json")),
                tmp_path: dir.join(format!("{name}.json.tmp")),
                lock_path: dir.join(format!("{name}.lock")),
                write_lock: Mutex::new(()),
                subscribers: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Read the current contents.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidFileFormat` if the file is corrupt or
    /// `BridgeError::Io` for other filesystem errors. A missing file is an
    /// empty store, not an error.
    pub fn snapshot(&self) -> Result<Prefs> {
        Ok(Prefs {
            entries: self.read_entries()?,
        })
    }

    /// Start a batch of writes.
    pub fn edit(&self) -> Editor<'_> {
        Editor {
            store: self,
            ops: Vec::new(),
        }
    }

    /// Subscribe to changes of `keys`. An empty key set subscribes to every
    /// key in the store.
    pub fn subscribe<I, S>(&self, keys: I) -> ChangeStream
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        let (tx, rx) = mpsc::channel();
        let subscriber = Subscriber {
            keys: if keys.is_empty() { None } else { Some(keys) },
            tx,
        };
        if let Ok(mut subs) = self.inner.subscribers.lock() {
            subs.push(subscriber);
        }
        ChangeStream { rx }
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn read_entries(&self) -> Result<BTreeMap<String, PrefValue>> {
        let bytes = match std::fs::read(&self.inner.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(BridgeError::Io(e)),
        };

        let file: PrefsFile = serde_json::from_slice(&bytes).map_err(|e| {
            BridgeError::InvalidFileFormat(format!(
                "failed to parse prefs file {}: {e}",
                self.inner.path.display()
            ))
        })?;

        Ok(file.entries)
    }

    fn commit(&self, ops: Vec<(String, Option<PrefValue>)>) -> Result<()> {
        let _guard = self
            .inner
            .write_lock
            .lock()
            .map_err(|_| BridgeError::Storage(format!("{}: write lock poisoned", self.name())))?;

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.inner.lock_path)?;
        FileExt::lock_exclusive(&lock_file)?;

        let mut entries = self.read_entries()?;
        let mut changed = BTreeSet::new();

        for (key, value) in ops {
            match value {
                Some(v) => {
                    if entries.get(&key) != Some(&v) {
                        entries.insert(key.clone(), v);
                        changed.insert(key);
                    }
                }
                None => {
                    if entries.remove(&key).is_some() {
                        changed.insert(key);
                    }
                }
            }
        }

        if !changed.is_empty() {
            self.write_atomic(entries)?;
        }

        // Dropping the handle releases the flock as well.
        FileExt::unlock(&lock_file)?;

        if !changed.is_empty() {
            self.notify(&changed);
        }
        Ok(())
    }

    /// Write `entries` via temp file + fsync + rename, then sync the
    /// directory so the rename itself is durable.
    fn write_atomic(&self, entries: BTreeMap<String, PrefValue>) -> Result<()> {
        let file = PrefsFile {
            version: PREFS_FILE_VERSION,
            entries,
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| BridgeError::Serialization(e.to_string()))?;

        let mut tmp = std::fs::File::create(&self.inner.tmp_path)?;
        tmp.write_all(&json)?;
        tmp.sync_all()?;
        drop(tmp);

        std::fs::rename(&self.inner.tmp_path, &self.inner.path)?;
        super::sync_dir(&self.inner.dir)
    }

    fn notify(&self, changed: &BTreeSet<String>) {
        let Ok(mut subs) = self.inner.subscribers.lock() else {
            return;
        };
        subs.retain(|sub| {
            let keys: Vec<String> = match &sub.keys {
                None => changed.iter().cloned().collect(),
                Some(wanted) => changed.intersection(wanted).cloned().collect(),
            };
            if keys.is_empty() {
                return true;
            }
            sub.tx
                .send(ChangeEvent {
                    store: self.inner.name.clone(),
                    keys,
                })
                .is_ok()
        });
    }
}

impl std::fmt::Debug for PrefStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefStore")
            .field("name", &self.inner.name)
            .field("path", &self.inner.path)
            .finish()
    }
}

// ── Editor ────────────────────────────────────────────────────────────────────

/// A pending batch of writes. Nothing is visible until [`Editor::commit`].
pub struct Editor<'a> {
    store: &'a PrefStore,
    ops: Vec<(String, Option<PrefValue>)>,
}

impl Editor<'_> {
    pub fn put(&mut self, key: impl Into<String>, value: PrefValue) -> &mut Self {
        self.ops.push((key.into(), Some(value)));
        self
    }

    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.put(key, PrefValue::String(value.into()))
    }

    pub fn put_int(&mut self, key: impl Into<String>, value: i32) -> &mut Self {
        self.put(key, PrefValue::Int(value))
    }

    pub fn put_long(&mut self, key: impl Into<String>, value: i64) -> &mut Self {
        self.put(key, PrefValue::Long(value))
    }

    pub fn put_bool(&mut self, key: impl Into<String>, value: bool) -> &mut Self {
        self.put(key, PrefValue::Bool(value))
    }

    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push((key.into(), None));
        self
    }

    /// Apply the batch durably. Later operations on the same key win.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Io` / `BridgeError::Serialization` if the batch
    /// could not be written; in that case none of it is visible.
    pub fn commit(self) -> Result<()> {
        self.store.commit(self.ops)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
