//! Signing-certificate fingerprints.
//!
//! A fingerprint is the SHA-256 digest of a DER-encoded signing certificate,
//! rendered as lowercase hex with no separators. Configuration usually carries
//! the colon-separated uppercase form (`6E:0A:49:...`); both forms normalize
//! to the same [`Fingerprint`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Normalized SHA-256 certificate fingerprint (64 lowercase hex chars).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Normalize a configured fingerprint string.
    ///
    /// Separators (`:`, `-`, whitespace) are stripped and hex digits are
    /// lowercased. No length check is applied: a malformed configured value
    /// simply never matches a computed digest.
    pub fn parse(raw: &str) -> Self {
        Self(normalize_fingerprint(raw))
    }

    /// Compute the fingerprint of a DER-encoded certificate.
    pub fn of_certificate(der: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(der)))
    }

    /// The normalized hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render as colon-separated uppercase pairs, the form used in
    /// configuration files.
    pub fn to_colon_hex(&self) -> String {
        format_colon_hex(&self.0)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strip separators and lowercase.
pub fn normalize_fingerprint(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ':' | '-') && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// `6e0a49` → `6E:0A:49`.
pub fn format_colon_hex(normalized: &str) -> String {
    normalized
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).to_uppercase())
        .collect::<Vec<_>>()
        .join(":")
}
