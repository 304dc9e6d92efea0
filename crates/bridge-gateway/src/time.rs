//! Time utilities for the bridge gateway.
//!
//! All persisted timestamps are Unix epoch milliseconds (i64), matching what
//! callers on the other side of the bridge expect in `timestamp` and
//! `lastUpdatedAt`.

/// Return the current time as milliseconds since Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Convert milliseconds to an RFC 3339 string.
pub fn millis_to_rfc3339(millis: i64) -> String {
    let dt = chrono::DateTime::from_timestamp_millis(millis).unwrap_or(chrono::DateTime::UNIX_EPOCH);
    dt.to_rfc3339()
}
