//! Measurement results: the domain record carried by `SUBMIT_RESULT`.

pub mod coerce;
pub mod record;

pub use record::{LegacyAliases, MeasurementResult, MeasurementSubmission};
