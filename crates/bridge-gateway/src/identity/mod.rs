//! Caller identity: who is on the other end of the bridge.
//!
//! The verifier resolves a caller uid into the packages it owns and the
//! SHA-256 fingerprints of their signing certificates, then checks them
//! against the single allow-listed identity.

pub mod fingerprint;
pub mod registry;
pub mod verifier;

pub use fingerprint::{format_colon_hex, normalize_fingerprint, Fingerprint};
pub use registry::{
    JsonPackageRegistry, ManifestRegistry, PackageEntry, PackageRegistry, SigningCertificates,
};
pub use verifier::{AllowlistEntry, AuthDecision, CallerIdentity, DenyReason, IdentityVerifier};
