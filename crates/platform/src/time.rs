//! Fixed-width time bucket helpers.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Floor a timestamp to the start of its fixed-width bucket.
///
/// Buckets are aligned to the Unix epoch, so every caller flooring with the
/// same period lands on the same bucket start regardless of process.
pub fn floor_to_period(t: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let secs = period.as_secs().max(1) as i64;
    let ts = t.timestamp();
    let floored = ts - ts.rem_euclid(secs);
    DateTime::from_timestamp(floored, 0).unwrap_or(t)
}

/// End of the bucket containing `t` (exclusive).
pub fn bucket_end(t: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    floor_to_period(t, period) + chrono::Duration::from_std(period).unwrap_or_default()
}
