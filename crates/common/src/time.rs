//! Lenient parsing for upstream timestamp strings.
//!
//! Export payloads carry timestamps in several shapes depending on the
//! record type and API version: RFC 3339 with `Z`, `+HH:MM` or `+HHMM`
//! offsets, space-separated date/time, fractional seconds, and sometimes
//! minute precision. Extraction is best-effort: anything unparseable is
//! `None` and never blocks raw insertion.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse an upstream timestamp string into UTC, if possible.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut candidates = vec![trimmed.to_string()];
    if let Some(stripped) = trimmed.strip_suffix('Z') {
        candidates.push(format!("{}+00:00", stripped));
    }

    for candidate in &candidates {
        if let Ok(dt) = DateTime::parse_from_rfc3339(candidate) {
            return Some(dt.with_timezone(&Utc));
        }
        for fmt in ZONED_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
        }
        // Naive timestamps are taken as UTC
        for fmt in NAIVE_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(candidate, fmt) {
                return Some(dt.and_utc());
            }
        }
    }
    None
}

/// Parse an upstream `YYYY-MM-DD` date string, if possible.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rfc3339_zulu() {
        let dt = parse_timestamp("2026-01-02T03:04:05Z").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap());
    }

    #[test]
    fn test_offset_with_colon() {
        let dt = parse_timestamp("2026-01-02T09:04:05+05:30").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 1, 2, 3, 34, 5).unwrap());
    }

    #[test]
    fn test_offset_without_colon() {
        let dt = parse_timestamp("2026-01-02T09:04:05+0530").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 1, 2, 3, 34, 5).unwrap());
    }

    #[test]
    fn test_space_separated() {
        let dt = parse_timestamp("2026-01-02 03:04:05+0000").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap());
    }

    #[test]
    fn test_minute_precision_zulu() {
        let dt = parse_timestamp("2026-01-01T00:00Z").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_fractional_seconds() {
        let dt = parse_timestamp("2026-01-02T03:04:05.250+00:00").unwrap();
        assert_eq!(dt.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_naive_assumed_utc() {
        let dt = parse_timestamp("2026-01-02T03:04:05").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap());
    }

    #[test]
    fn test_garbage_and_blank() {
        assert!(parse_timestamp("not a time").is_none());
        assert!(parse_timestamp("   ").is_none());
    }

    #[test]
    fn test_date() {
        assert_eq!(
            parse_date("2026-03-15"),
            Some(NaiveDate::from_ymd_opt(2026, 3, 15).unwrap())
        );
        assert!(parse_date("15/03/2026").is_none());
    }
}
