//! Epoch-second timestamps used throughout persisted documents.

use time::OffsetDateTime;

/// Seconds since the Unix epoch as a float, millisecond resolution or better.
pub fn now_epoch() -> f64 {
    epoch_seconds(OffsetDateTime::now_utc())
}

pub fn epoch_seconds(value: OffsetDateTime) -> f64 {
    value.unix_timestamp_nanos() as f64 / 1_000_000_000.0
}

/// Map key for a metric value recorded at `epoch`.
///
/// JSON object keys are strings, so snapshot values are keyed by the epoch
/// rendered with millisecond precision.
pub fn value_key(epoch: f64) -> String {
    format!("{epoch:.3}")
}
