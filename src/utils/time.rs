use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// How long ago `t` happened relative to `now`; zero when `t` lies in the future.
pub fn age(
    t: SystemTime,
    now: SystemTime,
) -> Duration {
    now.duration_since(t).unwrap_or(Duration::ZERO)
}

/// Whether `t` is strictly older than `threshold` relative to `now`.
pub fn is_older_than(
    t: SystemTime,
    now: SystemTime,
    threshold: Duration,
) -> bool {
    age(t, now) > threshold
}

/// `t - d`, clamped at the unix epoch.
pub fn saturating_sub(
    t: SystemTime,
    d: Duration,
) -> SystemTime {
    t.checked_sub(d).filter(|r| *r >= UNIX_EPOCH).unwrap_or(UNIX_EPOCH)
}

/// Milliseconds since the unix epoch, for log fields.
pub fn timestamp_millis(t: SystemTime) -> u128 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0)
}
