//! Timestamp handling.
//!
//! Log timestamps arrive as opaque strings in one of two forms: decimal
//! unix seconds (possibly fractional, `"-"` meaning zero) or RFC3339.
//! They stay strings through aggregation; stores normalize them to unix
//! seconds at the upsert boundary.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDateTime};
use tracing::warn;

/// Drop the fractional part of a decimal timestamp. `"-"` becomes `"0"`.
pub fn strip_decimal(value: &str) -> &str {
    if value == "-" {
        return "0";
    }
    match value.find('.') {
        Some(idx) => &value[..idx],
        None => value,
    }
}

/// Total-order comparison over both timestamp forms.
///
/// Fractional seconds are ignored. If either side contains a `-` the two
/// are compared as strings (RFC3339 is length-equal and lexicographically
/// ordered); otherwise both are compared as 64-bit unix seconds. Values
/// that parse as neither compare equal, with a warning.
pub fn compare(a: &str, b: &str) -> Ordering {
    let a = strip_decimal(a);
    let b = strip_decimal(b);
    if a.contains('-') || b.contains('-') {
        return a.cmp(b);
    }
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => {
            warn!(a, b, "timestamps are not comparable, treating as equal");
            Ordering::Equal
        }
    }
}

/// Normalize a timestamp string to unix seconds.
///
/// Pure-digit input (after fraction stripping) passes through; RFC3339 is
/// converted. A bare `YYYY-MM-DDTHH:MM:SS` without an offset is read as
/// UTC, which is how offset-less sensor logs are written.
pub fn to_unix_seconds(value: &str) -> Result<i64, BadTimestamp> {
    let stripped = strip_decimal(value);
    if let Ok(secs) = stripped.parse::<i64>() {
        return Ok(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp());
    }
    NaiveDateTime::parse_from_str(stripped, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc().timestamp())
        .map_err(|_| BadTimestamp {
            value: value.to_string(),
        })
}

/// A timestamp string that is neither unix seconds nor RFC3339.
#[derive(Debug, thiserror::Error)]
#[error("cannot interpret {value:?} as a timestamp")]
pub struct BadTimestamp {
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_decimal_handles_all_forms() {
        assert_eq!(strip_decimal("1459468983.764585"), "1459468983");
        assert_eq!(strip_decimal("300"), "300");
        assert_eq!(strip_decimal("-"), "0");
        assert_eq!(strip_decimal("300.7"), "300");
    }

    #[test]
    fn compare_numeric() {
        assert_eq!(compare("10", "20"), Ordering::Less);
        assert_eq!(compare("20", "10"), Ordering::Greater);
        assert_eq!(compare("10", "10.5"), Ordering::Equal);
    }

    #[test]
    fn compare_rfc3339_is_lexicographic() {
        assert_eq!(
            compare("2016-04-01T00:03:03Z", "2016-04-01T21:55:04Z"),
            Ordering::Less
        );
        // Mixed forms fall back to string comparison as well.
        assert_eq!(compare("2016-04-01T00:03:03Z", "10"), Ordering::Greater);
    }

    #[test]
    fn compare_unparseable_is_equal() {
        // No hyphen on either side, so this exercises the i64 parse
        // failure fallback rather than the string-comparison branch.
        assert_eq!(compare("abc", "xyz"), Ordering::Equal);
    }

    #[test]
    fn compare_ignores_fraction() {
        assert_eq!(compare("10.9", "10"), Ordering::Equal);
    }

    #[test]
    fn unix_seconds_passthrough() {
        assert_eq!(to_unix_seconds("1459468983").unwrap(), 1459468983);
        assert_eq!(to_unix_seconds("1459468983.764585").unwrap(), 1459468983);
        assert_eq!(to_unix_seconds("-").unwrap(), 0);
    }

    #[test]
    fn unix_seconds_from_rfc3339() {
        assert_eq!(to_unix_seconds("1970-01-01T00:01:00Z").unwrap(), 60);
        assert_eq!(to_unix_seconds("1970-01-01T00:01:00+00:00").unwrap(), 60);
        // Offset-less sensor output reads as UTC.
        assert_eq!(to_unix_seconds("1970-01-01T00:01:00").unwrap(), 60);
    }

    #[test]
    fn unix_seconds_rejects_garbage() {
        assert!(to_unix_seconds("yesterday").is_err());
    }
}
