//! Timestamp parser for the snapshot file.
//!
//! Supports the ISO 8601 shapes training scripts commonly write:
//! - RFC 3339 with zone: `2024-10-22T10:30:00Z`, `2024-10-22T12:30:00+02:00`
//! - Naive datetime (UTC assumed): `2024-10-22T10:30:00`, `2024-10-22T10:30:00.123456`
//! - Space separator instead of `T`: `2024-10-22 10:30:00`

use chrono::{DateTime, NaiveDateTime, Utc};

/// Error type for timestamp parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeParseError {
    pub input: String,
    pub message: String,
}

impl std::fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse time '{}': {}", self.input, self.message)
    }
}

impl std::error::Error for TimeParseError {}

/// Parse an ISO 8601 timestamp into a UTC instant.
///
/// # Examples
///
/// ```
/// use metrics_bridge::util::parse_timestamp;
///
/// let ts = parse_timestamp("2024-10-22T10:30:00Z").unwrap();
/// assert_eq!(ts.timestamp(), 1729593000);
/// ```
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let input = input.trim();

    if let Some(ts) = try_parse_rfc3339(input) {
        return Ok(ts);
    }

    if let Some(ts) = try_parse_naive(input) {
        return Ok(ts);
    }

    Err(TimeParseError {
        input: input.to_string(),
        message: "Unrecognized format. Use ISO 8601 (2024-10-22T10:30:00Z \
                  or 2024-10-22T10:30:00)"
            .to_string(),
    })
}

/// Try to parse as RFC 3339 (zone designator required).
fn try_parse_rfc3339(input: &str) -> Option<DateTime<Utc>> {
    // chrono accepts both 'T' and ' ' as separator here
    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Try to parse a datetime without zone, interpreted as UTC.
fn try_parse_naive(input: &str) -> Option<DateTime<Utc>> {
    const FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rfc3339_utc() {
        let ts = parse_timestamp("2024-10-22T10:30:00Z").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 10, 22, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_rfc3339_offset_normalized_to_utc() {
        let ts = parse_timestamp("2024-10-22T12:30:00+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 10, 22, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_naive_with_fraction() {
        let ts = parse_timestamp("2024-10-22T10:30:00.250000").unwrap();
        assert_eq!(ts.timestamp(), 1729593000);
        assert_eq!(ts.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_space_separator() {
        let ts = parse_timestamp(" 2024-10-22 10:30:00 ").unwrap();
        assert_eq!(ts.timestamp(), 1729593000);
    }

    #[test]
    fn test_fraction_distinguishes_instants() {
        let a = parse_timestamp("2024-10-22T10:30:00.100Z").unwrap();
        let b = parse_timestamp("2024-10-22T10:30:00.200Z").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_invalid_formats() {
        for input in ["", "yesterday", "1729593000", "2024-13-22T10:30:00Z", "10:30"] {
            let err = parse_timestamp(input).unwrap_err();
            assert_eq!(err.input, input.trim());
        }
    }
}
