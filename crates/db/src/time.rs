//! Millisecond arithmetic over `bson::DateTime`, which is what every stored
//! timestamp uses.

use bson::DateTime;

pub fn plus_seconds(at: DateTime, seconds: i64) -> DateTime {
    DateTime::from_millis(at.timestamp_millis().saturating_add(seconds.saturating_mul(1000)))
}

pub fn plus_minutes(at: DateTime, minutes: i64) -> DateTime {
    plus_seconds(at, minutes.saturating_mul(60))
}

/// Whole seconds from `from` to `to`; negative when `to` is earlier.
pub fn seconds_between(from: DateTime, to: DateTime) -> i64 {
    (to.timestamp_millis() - from.timestamp_millis()).div_euclid(1000)
}

pub fn from_unix_seconds(seconds: i64) -> DateTime {
    DateTime::from_millis(seconds.saturating_mul(1000))
}

pub fn earliest(a: DateTime, b: DateTime) -> DateTime {
    if a <= b { a } else { b }
}

pub fn latest(a: DateTime, b: DateTime) -> DateTime {
    if a >= b { a } else { b }
}

pub fn to_rfc3339(at: DateTime) -> String {
    at.try_to_rfc3339_string()
        .unwrap_or_else(|_| at.timestamp_millis().to_string())
}
