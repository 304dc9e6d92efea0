//! Package registry: which packages own a uid, and what signed them.
//!
//! The verifier needs exactly one platform capability: "enumerate the current
//! and historical signing certificates for a caller's packages". That
//! capability is the [`PackageRegistry`] trait. [`JsonPackageRegistry`]
//! holds the contents of a JSON manifest; [`ManifestRegistry`] serves one
//! from disk and re-reads it whenever the file changes:
//!
//! ```json
//! {
//!     "version": 1,
//!     "packages": [
//!         {
//!             "name": "com.example.caller",
//!             "uids": [10123],
//!             "signers": ["<base64 DER>"],
//!             "signing_history": ["<base64 DER>"]
//!         }
//!     ]
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use base64::Engine;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

const REGISTRY_FILE_VERSION: u32 = 1;

/// Signing certificates of one package, DER-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningCertificates {
    /// Certificates the package is currently signed with.
    pub current: Vec<Vec<u8>>,
    /// Past certificates from key rotation, oldest first.
    pub history: Vec<Vec<u8>>,
}

impl SigningCertificates {
    /// Iterate current signers followed by history.
    pub fn all(&self) -> impl Iterator<Item = &[u8]> {
        self.current
            .iter()
            .chain(self.history.iter())
            .map(Vec::as_slice)
    }
}

/// Resolves caller packages and their signing certificates.
pub trait PackageRegistry: Send + Sync {
    /// Package names owned by `uid`. Empty when the uid is unknown.
    fn packages_for_uid(&self, uid: u32) -> BTreeSet<String>;

    /// Signing certificates for `package`.
    ///
    /// `Ok(None)` means the package is not installed. `Err` means the
    /// certificates could not be read; callers must treat that as a denial.
    fn signing_certificates(&self, package: &str) -> Result<Option<SigningCertificates>>;
}

// ── On-disk structure ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    packages: Vec<PackageEntry>,
}

/// One package as written in the registry manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageEntry {
    pub name: String,
    #[serde(default)]
    pub uids: Vec<u32>,
    /// Base64 DER certificates.
    #[serde(default)]
    pub signers: Vec<String>,
    /// Base64 DER certificates.
    #[serde(default)]
    pub signing_history: Vec<String>,
}

// ── JsonPackageRegistry ───────────────────────────────────────────────────────

/// In-memory registry, loadable from a JSON manifest.
#[derive(Debug, Clone, Default)]
pub struct JsonPackageRegistry {
    packages: BTreeMap<String, PackageEntry>,
}

impl JsonPackageRegistry {
    /// An empty registry. Every non-host caller is denied.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a manifest from disk.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Io` if the file cannot be read and
    /// `BridgeError::InvalidFileFormat` for malformed JSON or an unsupported
    /// version.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let file: RegistryFile = serde_json::from_slice(&bytes).map_err(|e| {
            BridgeError::InvalidFileFormat(format!(
                "failed to parse registry {}: {e}",
                path.display()
            ))
        })?;

        if file.version != REGISTRY_FILE_VERSION {
            return Err(BridgeError::InvalidFileFormat(format!(
                "unsupported registry version={}",
                file.version
            )));
        }

        let mut registry = Self::new();
        for entry in file.packages {
            registry.insert(entry);
        }
        Ok(registry)
    }

    /// Write the manifest to disk. A running server never sees a
    /// half-written file: the manifest is written beside `path` and renamed
    /// over it.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = RegistryFile {
            version: REGISTRY_FILE_VERSION,
            packages: self.packages.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| BridgeError::Serialization(e.to_string()))?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let tmp = path.with_extension("json.tmp");
        {
            let mut f = std::fs::File::create(&tmp)?;
            f.write_all(json.as_bytes())?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        crate::storage::sync_dir(parent)
    }

    /// Add or replace a package entry.
    pub fn insert(&mut self, entry: PackageEntry) {
        self.packages.insert(entry.name.clone(), entry);
    }

    /// Register a package from raw DER certificates.
    pub fn with_package(
        mut self,
        name: impl Into<String>,
        uids: &[u32],
        signers: Vec<Vec<u8>>,
        signing_history: Vec<Vec<u8>>,
    ) -> Self {
        let b64 = |der: &Vec<u8>| base64::engine::general_purpose::STANDARD.encode(der);
        self.insert(PackageEntry {
            name: name.into(),
            uids: uids.to_vec(),
            signers: signers.iter().map(b64).collect(),
            signing_history: signing_history.iter().map(b64).collect(),
        });
        self
    }

    /// Number of registered packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Entries in package-name order.
    pub fn entries(&self) -> impl Iterator<Item = &PackageEntry> {
        self.packages.values()
    }
}

impl PackageRegistry for JsonPackageRegistry {
    fn packages_for_uid(&self, uid: u32) -> BTreeSet<String> {
        self.packages
            .values()
            .filter(|p| p.uids.contains(&uid))
            .map(|p| p.name.clone())
            .collect()
    }

    fn signing_certificates(&self, package: &str) -> Result<Option<SigningCertificates>> {
        let Some(entry) = self.packages.get(package) else {
            return Ok(None);
        };

        let decode = |encoded: &String| {
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| {
                    BridgeError::InvalidFileFormat(format!(
                        "invalid certificate base64 for {package}: {e}"
                    ))
                })
        };

        Ok(Some(SigningCertificates {
            current: entry.signers.iter().map(decode).collect::<Result<_>>()?,
            history: entry.signing_history.iter().map(decode).collect::<Result<_>>()?,
        }))
    }
}

// ── ManifestRegistry ──────────────────────────────────────────────────────────

/// Identifies one version of the manifest file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

fn stamp(path: &Path) -> Result<Option<FileStamp>> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(FileStamp {
            modified: meta.modified()?,
            len: meta.len(),
        })),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BridgeError::Io(e)),
    }
}

struct Loaded {
    /// `None` when the file did not exist.
    stamp: Option<FileStamp>,
    registry: Arc<JsonPackageRegistry>,
}

/// A registry manifest on disk, re-read when its modification time or size
/// changes, so `bridgectl registry add` takes effect without a restart.
///
/// A missing file is an empty registry. If an edited file fails to load,
/// the last good contents stay in use and the load is retried on the next
/// lookup.
pub struct ManifestRegistry {
    path: PathBuf,
    loaded: RwLock<Loaded>,
}

impl ManifestRegistry {
    /// Load the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Same as [`JsonPackageRegistry::load`], except that a missing file is
    /// not an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let stamp = stamp(&path)?;
        let registry = if stamp.is_some() {
            JsonPackageRegistry::load(&path)?
        } else {
            warn!(
                "no package registry at {}; only the host uid will be allowed",
                path.display()
            );
            JsonPackageRegistry::new()
        };
        Ok(Self {
            path,
            loaded: RwLock::new(Loaded {
                stamp,
                registry: Arc::new(registry),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The manifest as it is on disk now, reloading it if it changed.
    pub fn current(&self) -> Arc<JsonPackageRegistry> {
        let stamp = match stamp(&self.path) {
            Ok(stamp) => stamp,
            Err(e) => {
                warn!("cannot stat package registry {}: {e}", self.path.display());
                return self.cached();
            }
        };

        if let Ok(loaded) = self.loaded.read() {
            if loaded.stamp == stamp {
                return Arc::clone(&loaded.registry);
            }
        }

        let reloaded = match stamp {
            Some(_) => JsonPackageRegistry::load(&self.path),
            None => Ok(JsonPackageRegistry::new()),
        };

        // A poisoned lock denies everyone rather than serving stale data.
        let Ok(mut loaded) = self.loaded.write() else {
            return Arc::new(JsonPackageRegistry::new());
        };
        match reloaded {
            Ok(registry) => {
                info!(
                    "reloaded package registry {} ({} package(s))",
                    self.path.display(),
                    registry.len()
                );
                loaded.stamp = stamp;
                loaded.registry = Arc::new(registry);
            }
            Err(e) => warn!(
                "keeping previous package registry; {} failed to load: {e}",
                self.path.display()
            ),
        }
        Arc::clone(&loaded.registry)
    }

    fn cached(&self) -> Arc<JsonPackageRegistry> {
        self.loaded
            .read()
            .map(|loaded| Arc::clone(&loaded.registry))
            .unwrap_or_else(|_| Arc::new(JsonPackageRegistry::new()))
    }
}

impl PackageRegistry for ManifestRegistry {
    fn packages_for_uid(&self, uid: u32) -> BTreeSet<String> {
        self.current().packages_for_uid(uid)
    }

    fn signing_certificates(&self, package: &str) -> Result<Option<SigningCertificates>> {
        self.current().signing_certificates(package)
    }
}

impl std::fmt::Debug for ManifestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestRegistry")
            .field("path", &self.path)
            .finish()
    }
}
