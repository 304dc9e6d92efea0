//! Caller verification: the gate in front of every bridge call.
//!
//! Verification order:
//! 1. Same uid as the host process → allow, nothing else is consulted.
//! 2. Resolve packages owned by the caller uid; none → deny.
//! 3. For each owned package named like the allow-listed package, hash its
//!    current signers and signing history.
//! 4. Allow iff one of those fingerprints equals the allow-listed one.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::fingerprint::Fingerprint;
use super::registry::PackageRegistry;

/// The single caller identity allowed through the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistEntry {
    pub expected_package_name: String,
    pub expected_fingerprint: Fingerprint,
}

impl AllowlistEntry {
    /// Build an entry; the fingerprint may be colon-separated.
    pub fn new(package_name: impl Into<String>, fingerprint: &str) -> Self {
        Self {
            expected_package_name: package_name.into(),
            expected_fingerprint: Fingerprint::parse(fingerprint),
        }
    }
}

/// Resolved caller details. Recomputed per call, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub uid: u32,
    pub packages: BTreeSet<String>,
    pub fingerprints: BTreeSet<Fingerprint>,
}

/// Why a caller was turned away.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DenyReason {
    #[error("No packages for uid={uid}")]
    NoPackagesForCaller { uid: u32 },

    #[error("Caller rejected: uid={uid} packages={}", join(.packages))]
    CallerRejected { uid: u32, packages: BTreeSet<String> },

    #[error("Unable to verify signature: {reason}")]
    FingerprintUnavailable { package: String, reason: String },
}

fn join(packages: &BTreeSet<String>) -> String {
    packages.iter().cloned().collect::<Vec<_>>().join(", ")
}

/// Outcome of authenticating one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    Deny(DenyReason),
}

impl AuthDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthDecision::Allow)
    }
}

/// Decides whether a calling process may use the bridge.
#[derive(Clone)]
pub struct IdentityVerifier {
    host_uid: u32,
    allow: AllowlistEntry,
    registry: Arc<dyn PackageRegistry>,
}

impl IdentityVerifier {
    pub fn new(host_uid: u32, allow: AllowlistEntry, registry: Arc<dyn PackageRegistry>) -> Self {
        Self {
            host_uid,
            allow,
            registry,
        }
    }

    pub fn host_uid(&self) -> u32 {
        self.host_uid
    }

    pub fn allowlist(&self) -> &AllowlistEntry {
        &self.allow
    }

    /// Authenticate a caller by uid.
    pub fn authenticate(&self, caller_uid: u32) -> AuthDecision {
        if caller_uid == self.host_uid {
            return AuthDecision::Allow;
        }

        match self.resolve(caller_uid) {
            Ok(identity) => {
                if identity.fingerprints.contains(&self.allow.expected_fingerprint) {
                    debug!(
                        "caller uid={} verified as {}",
                        caller_uid, self.allow.expected_package_name
                    );
                    AuthDecision::Allow
                } else {
                    AuthDecision::Deny(DenyReason::CallerRejected {
                        uid: caller_uid,
                        packages: identity.packages,
                    })
                }
            }
            Err(reason) => AuthDecision::Deny(reason),
        }
    }

    /// Resolve packages and the fingerprints of the allow-listed package.
    ///
    /// Only packages matching the allow-listed name are hashed; other
    /// packages sharing the uid contribute to `packages` but not to
    /// `fingerprints`.
    pub fn resolve(&self, caller_uid: u32) -> Result<CallerIdentity, DenyReason> {
        let packages = self.registry.packages_for_uid(caller_uid);
        if packages.is_empty() {
            return Err(DenyReason::NoPackagesForCaller { uid: caller_uid });
        }

        let mut fingerprints = BTreeSet::new();
        for package in packages
            .iter()
            .filter(|p| **p == self.allow.expected_package_name)
        {
            match self.registry.signing_certificates(package) {
                Ok(Some(certs)) => {
                    fingerprints.extend(certs.all().map(Fingerprint::of_certificate));
                }
                Ok(None) => {
                    warn!("package not found while verifying caller: {package}");
                }
                Err(e) => {
                    return Err(DenyReason::FingerprintUnavailable {
                        package: package.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(CallerIdentity {
            uid: caller_uid,
            packages,
            fingerprints,
        })
    }
}

impl std::fmt::Debug for IdentityVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityVerifier")
            .field("host_uid", &self.host_uid)
            .field("allow", &self.allow)
            .finish_non_exhaustive()
    }
}
