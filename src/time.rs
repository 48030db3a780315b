//! Timestamp parsing and formatting
//!
//! XMLTV timestamps look like `20251212000500 +0100`. Anything else is handed
//! to a handful of general date formats; values nothing understands are
//! treated as absent rather than an error.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Parse a programme timestamp. Returns `None` for empty or unparseable input.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    parse_xmltv_time(s).or_else(|| parse_general(s))
}

/// Compact `YYYYMMDDhhmmss[ ±hhmm]`. Without an offset the value is UTC.
fn parse_xmltv_time(s: &str) -> Option<DateTime<Utc>> {
    let bytes = s.as_bytes();
    if bytes.len() < 14 || !bytes[..14].iter().all(u8::is_ascii_digit) {
        return None;
    }

    let num = |range: std::ops::Range<usize>| -> Option<u32> { s.get(range)?.parse().ok() };
    let year = num(0..4)? as i32;
    let date = NaiveDate::from_ymd_opt(year, num(4..6)?, num(6..8)?)?;
    let naive = date.and_hms_opt(num(8..10)?, num(10..12)?, num(12..14)?)?;

    let rest = s[14..].trim_start();
    let offset_secs = if rest.is_empty() {
        0
    } else {
        parse_tz_offset(rest)?
    };

    let offset = FixedOffset::east_opt(offset_secs)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse timezone offset like "+0100" or "-0530" to seconds.
/// Anything but exactly a sign and four digits is rejected.
fn parse_tz_offset(tz: &str) -> Option<i32> {
    let (sign, digits) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => return None,
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[0..2].parse().ok()?;
    let minutes: i32 = digits[2..4].parse().ok()?;
    Some(sign * (hours * 3600 + minutes * 60))
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

fn parse_general(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Date-time without an offset is wall-clock time where the viewer is
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }
    // Bare date is midnight UTC
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Minutes from `a` to `b`, fractional, negative when `b` is earlier.
pub fn minutes_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    (b - a).num_milliseconds() as f64 / 60_000.0
}

/// Format as local HH:MM
pub fn format_time(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%H:%M").to_string()
}

/// Format as local "Mon, Jan 5"
pub fn format_day(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%a, %b %-d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_parse_compact_without_offset_is_utc() {
        assert_eq!(parse_timestamp("20250101090000"), Some(utc(2025, 1, 1, 9, 0)));
    }

    #[test]
    fn test_parse_compact_with_offset() {
        let with_offset = parse_timestamp("20251212000500 +0100").unwrap();
        assert_eq!(with_offset, utc(2025, 12, 11, 23, 5));

        let no_space = parse_timestamp("20251212000500+0100").unwrap();
        assert_eq!(no_space, with_offset);

        let negative = parse_timestamp("20240115120000 -0530").unwrap();
        assert_eq!(negative, Utc.with_ymd_and_hms(2024, 1, 15, 17, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_rfc3339() {
        assert_eq!(
            parse_timestamp("2025-01-01T09:00:00Z"),
            Some(utc(2025, 1, 1, 9, 0))
        );
        assert_eq!(
            parse_timestamp("2025-01-01T10:00:00+01:00"),
            Some(utc(2025, 1, 1, 9, 0))
        );
    }

    #[test]
    fn test_parse_bare_date() {
        assert_eq!(parse_timestamp("2025-03-04"), Some(utc(2025, 3, 4, 0, 0)));
    }

    #[test]
    fn test_malformed_is_absent() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("   "), None);
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp("20251399000000"), None);
        assert_eq!(parse_timestamp("20250101090000 +01"), None);
        assert_eq!(parse_timestamp("20250101090000 garbage"), None);
    }

    #[test]
    fn test_minutes_between() {
        let a = utc(2025, 1, 1, 8, 0);
        let b = utc(2025, 1, 1, 9, 30);
        assert_eq!(minutes_between(a, b), 90.0);
        assert_eq!(minutes_between(b, a), -90.0);
    }
}
