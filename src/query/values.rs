//! Typed value coercion shared by indexing and query compilation, so that a
//! value indexed into a field and the same value used in a condition always
//! end up as the same term.

use crate::error::{Result, SearchError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIME_FORMAT: &str = "%H:%M:%S";

const NAIVE_DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Convert a date-like string into the i64 stored for date, time and
/// timestamp fields.
///
/// Dispatch is by length: 19 characters are `yyyy-MM-dd HH:mm:ss` in UTC
/// (epoch millis), 8 characters are `HH:mm:ss` (seconds of the day),
/// everything else goes through the ISO-8601 parser (epoch millis).
pub fn to_numeric(field: &str, value: &str) -> Result<i64> {
    let value = value.trim();
    match value.chars().count() {
        19 => NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT)
            .map(|dt| dt.and_utc().timestamp_millis())
            .map_err(|e| SearchError::invalid_value(field, value, e)),
        8 => NaiveTime::parse_from_str(value, TIME_FORMAT)
            .map(|t| t.num_seconds_from_midnight() as i64)
            .map_err(|e| SearchError::invalid_value(field, value, e)),
        _ => parse_iso8601(value)
            .map(|(_, millis)| millis)
            .ok_or_else(|| SearchError::invalid_value(field, value, "not an ISO-8601 date")),
    }
}

/// Validate an ISO-8601 value and keep only its `yyyy-MM-dd` part.
pub fn normalize_date(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    let (date, _) = parse_iso8601(value)
        .ok_or_else(|| SearchError::invalid_value(field, value, "not an ISO-8601 date"))?;
    Ok(date.format("%Y-%m-%d").to_string())
}

/// Decimal values accept a comma as decimal separator.
pub fn normalize_decimal(value: &str) -> String {
    value.trim().replace(',', ".")
}

pub fn parse_decimal(field: &str, value: &str) -> Result<f64> {
    let normalized = normalize_decimal(value);
    normalized
        .parse::<f64>()
        .map_err(|e| SearchError::invalid_value(field, value, e))
}

pub fn parse_integer(field: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|e| SearchError::invalid_value(field, value, e))
}

/// Booleans are indexed as `"1"` for `true` and `"0"` for anything else.
pub fn boolean_term(value: &str) -> &'static str {
    if value.trim().eq_ignore_ascii_case("true") {
        "1"
    } else {
        "0"
    }
}

/// Returns the calendar date as written together with epoch millis (UTC).
fn parse_iso8601(value: &str) -> Option<(NaiveDate, i64)> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some((dt.date_naive(), dt.timestamp_millis()));
    }
    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some((dt.date(), dt.and_utc().timestamp_millis()));
        }
    }
    let date = parse_partial_date(value)?;
    let millis = date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis();
    Some((date, millis))
}

/// `yyyy-MM-dd`, `yyyy-MM` and `yyyy`.
fn parse_partial_date(value: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    let mut parts = value.splitn(2, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    if value.len() < 4 {
        return None;
    }
    let month: u32 = match parts.next() {
        Some(m) if m.len() == 2 => m.parse().ok()?,
        Some(_) => return None,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_numeric_datetime_is_utc_millis() {
        assert_eq!(to_numeric("ts", "1970-01-01 00:00:01").unwrap(), 1000);
        assert_eq!(
            to_numeric("ts", "2001-09-09 01:46:40").unwrap(),
            1_000_000_000_000
        );
    }

    #[test]
    fn test_to_numeric_time_is_seconds() {
        assert_eq!(to_numeric("t", "01:02:03").unwrap(), 3723);
        assert_eq!(to_numeric("t", "00:00:00").unwrap(), 0);
    }

    #[test]
    fn test_to_numeric_iso_dates() {
        assert_eq!(to_numeric("d", "1970-01-02").unwrap(), 86_400_000);
        assert_eq!(
            to_numeric("d", "1970-01-01T00:00:01Z").unwrap(),
            to_numeric("d", "1970-01-01 00:00:01").unwrap()
        );
        assert_eq!(to_numeric("d", "1970-02").unwrap(), 31 * 86_400_000);
        assert_eq!(to_numeric("d", "1971").unwrap(), 365 * 86_400_000);
    }

    #[test]
    fn test_to_numeric_rejects_garbage() {
        let err = to_numeric("created", "yesterday").unwrap_err();
        assert!(matches!(err, SearchError::InvalidValue { ref field, .. } if field == "created"));
        assert!(to_numeric("t", "25:61:00").is_err());
        assert!(to_numeric("d", "2020-13-01").is_err());
    }

    #[test]
    fn test_normalize_date_truncates() {
        assert_eq!(
            normalize_date("d", "2020-05-17T13:45:00+02:00").unwrap(),
            "2020-05-17"
        );
        assert_eq!(normalize_date("d", "2020-05-17").unwrap(), "2020-05-17");
        assert_eq!(normalize_date("d", "2020").unwrap(), "2020-01-01");
        assert!(normalize_date("d", "17.05.2020").is_err());
    }

    #[test]
    fn test_decimal_and_boolean() {
        assert_eq!(normalize_decimal("3,5"), "3.5");
        assert_eq!(parse_decimal("price", "3,5").unwrap(), 3.5);
        assert!(parse_decimal("price", "three").is_err());
        assert_eq!(boolean_term("TRUE"), "1");
        assert_eq!(boolean_term("yes"), "0");
    }
}
