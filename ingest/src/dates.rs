use chrono::{DateTime, NaiveDateTime, Utc};

/// Candidate formats tried in order; the first successful parse wins, so
/// ambiguous strings resolve to whichever pattern is listed first.
pub const DATE_FORMATS: &[&str] = &[
    "%d.%m.%Y %H:%M:%S",    // European: DD.MM.YYYY HH:MM:SS
    "%Y-%m-%d %H:%M:%S",    // ISO with space separator
    "%m/%d/%Y %H:%M:%S",    // US: MM/DD/YYYY HH:MM:SS
    "%Y-%m-%dT%H:%M:%S",    // ISO with T separator
    "%Y-%m-%dT%H:%M:%S%.fZ", // ISO with optional fractional seconds and Z
];

/// Parse a raw timestamp against the candidate format list. Formats without
/// a zone are taken as UTC wall-clock; strings with a numeric offset fall
/// through to an RFC 3339 parse.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn european_format() {
        assert_eq!(
            parse_datetime("01.05.2025 10:00:00"),
            Some(utc(2025, 5, 1, 10, 0, 0))
        );
    }

    #[test]
    fn iso_space_format() {
        assert_eq!(
            parse_datetime("2025-05-01 10:00:00"),
            Some(utc(2025, 5, 1, 10, 0, 0))
        );
    }

    #[test]
    fn us_format() {
        assert_eq!(
            parse_datetime("05/01/2025 10:00:00"),
            Some(utc(2025, 5, 1, 10, 0, 0))
        );
    }

    #[test]
    fn iso_t_separator() {
        assert_eq!(
            parse_datetime("2025-05-01T10:00:00"),
            Some(utc(2025, 5, 1, 10, 0, 0))
        );
    }

    #[test]
    fn iso_with_millis_and_zulu() {
        assert_eq!(
            parse_datetime("2025-05-01T10:00:00.123Z"),
            Some(utc(2025, 5, 1, 10, 0, 0) + chrono::Duration::milliseconds(123))
        );
        assert_eq!(
            parse_datetime("2025-05-01T10:00:00Z"),
            Some(utc(2025, 5, 1, 10, 0, 0))
        );
    }

    #[test]
    fn rfc3339_offset() {
        assert_eq!(
            parse_datetime("2025-05-01T12:00:00+02:00"),
            Some(utc(2025, 5, 1, 10, 0, 0))
        );
    }

    #[test]
    fn garbage_and_empty_rejected() {
        assert_eq!(parse_datetime("not a date"), None);
        assert_eq!(parse_datetime(""), None);
        assert_eq!(parse_datetime("   "), None);
    }

    #[test]
    fn format_order_breaks_ties() {
        // Dotted day-first is listed before US slashes, so a string both
        // could claim resolves day-first.
        assert_eq!(
            parse_datetime("02.03.2025 00:00:00"),
            Some(utc(2025, 3, 2, 0, 0, 0))
        );
    }
}
