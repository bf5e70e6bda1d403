use std::fmt;

use chrono::{DateTime, Utc};

use crate::dates::parse_datetime;

/// Column order of the external CSV feed, which arrives headerless.
pub const EXPECTED_HEADERS: &[&str] = &[
    "session_id",
    "start_time",
    "end_time",
    "ip_address",
    "country",
    "language",
    "messages_sent",
    "sentiment",
    "escalated",
    "forwarded_hr",
    "full_transcript",
    "avg_response_time",
    "tokens",
    "tokens_eur",
    "category",
    "initial_msg",
    "user_rating",
];

/// A session row after coercion, ready to upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSession {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub messages_sent: Option<i64>,
    pub sentiment: Option<String>,
    pub escalated: Option<bool>,
    pub forwarded_hr: Option<bool>,
    pub transcript_url: Option<String>,
    pub avg_response_time: Option<f64>,
    pub tokens: Option<i64>,
    pub tokens_eur: Option<f64>,
    pub category: Option<String>,
    pub initial_msg: Option<String>,
    pub user_rating: Option<i64>,
}

/// A rejected row. Collected by the batch accumulator rather than aborting
/// the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub session_id: String,
    pub reason: String,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.session_id.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "session {}: {}", self.session_id, self.reason)
        }
    }
}

fn opt_text(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        None
    } else {
        raw.parse().ok()
    }
}

fn parse_float(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        None
    } else {
        raw.parse().ok()
    }
}

/// Exact-literal boolean rule: `Some(true)` only on a case-insensitive
/// "true", `Some(false)` for any other non-empty value, `None` when empty.
fn parse_bool(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if raw.is_empty() {
        None
    } else {
        Some(raw.eq_ignore_ascii_case("true"))
    }
}

/// Ratings are accepted only when all-ASCII-digit; anything else is unset.
fn parse_rating(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        raw.parse().ok()
    } else {
        None
    }
}

/// Map one raw CSV row onto the canonical session shape. Short rows are
/// right-padded with empty strings; extra columns are ignored. The only
/// hard requirement is that both timestamps parse; everything else
/// degrades to unset.
pub fn normalize_row(row: &[String]) -> Result<NormalizedSession, RowError> {
    let field = |i: usize| row.get(i).map(String::as_str).unwrap_or("");

    let session_id = field(0).to_string();
    let start_raw = field(1);
    let end_raw = field(2);

    let start_time = parse_datetime(start_raw);
    let end_time = parse_datetime(end_raw);
    let (start_time, end_time) = match (start_time, end_time) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            return Err(RowError {
                session_id,
                reason: format!(
                    "could not parse date fields: start_time='{}', end_time='{}'",
                    start_raw, end_raw
                ),
            });
        }
    };

    Ok(NormalizedSession {
        session_id,
        start_time,
        end_time,
        ip_address: opt_text(field(3)),
        country: opt_text(field(4)),
        language: opt_text(field(5)),
        messages_sent: parse_int(field(6)),
        sentiment: opt_text(field(7)),
        escalated: parse_bool(field(8)),
        forwarded_hr: parse_bool(field(9)),
        transcript_url: opt_text(field(10)),
        avg_response_time: parse_float(field(11)),
        tokens: parse_int(field(12)),
        tokens_eur: parse_float(field(13)),
        category: opt_text(field(14)),
        initial_msg: opt_text(field(15)),
        user_rating: parse_rating(field(16)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    fn full_row() -> Vec<String> {
        row(&[
            "sess-1",
            "01.05.2025 10:00:00",
            "01.05.2025 10:05:30",
            "192.168.1.1",
            "NL",
            "nl",
            "7",
            "positive",
            "true",
            "false",
            "https://example.com/t/sess-1.txt",
            "2.5",
            "1200",
            "0.04",
            "billing",
            "hi there",
            "4",
        ])
    }

    #[test]
    fn normalizes_complete_row() {
        let s = normalize_row(&full_row()).unwrap();
        assert_eq!(s.session_id, "sess-1");
        assert_eq!(s.messages_sent, Some(7));
        assert_eq!(s.escalated, Some(true));
        assert_eq!(s.forwarded_hr, Some(false));
        assert_eq!(
            s.transcript_url.as_deref(),
            Some("https://example.com/t/sess-1.txt")
        );
        assert_eq!(s.avg_response_time, Some(2.5));
        assert_eq!(s.tokens, Some(1200));
        assert_eq!(s.user_rating, Some(4));
    }

    #[test]
    fn short_row_right_padded_without_error() {
        let s = normalize_row(&row(&["sess-2", "2025-05-01 10:00:00", "2025-05-01 10:01:00"]))
            .unwrap();
        assert_eq!(s.session_id, "sess-2");
        assert_eq!(s.ip_address, None);
        assert_eq!(s.country, None);
        assert_eq!(s.escalated, None);
        assert_eq!(s.user_rating, None);
    }

    #[test]
    fn unparseable_dates_reject_the_whole_row() {
        let err =
            normalize_row(&row(&["sess-3", "soon", "2025-05-01 10:01:00"])).unwrap_err();
        assert_eq!(err.session_id, "sess-3");
        assert!(err.reason.contains("start_time"));

        // A parseable start does not rescue a missing end.
        assert!(normalize_row(&row(&["sess-4", "2025-05-01 10:00:00", ""])).is_err());
    }

    #[test]
    fn non_numeric_counters_unset_not_fatal() {
        let mut fields = full_row();
        fields[6] = "many".to_string();
        fields[12] = "n/a".to_string();
        let s = normalize_row(&fields).unwrap();
        assert_eq!(s.messages_sent, None);
        assert_eq!(s.tokens, None);
    }

    #[test]
    fn boolean_rule_is_exact_literal() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("yes"), Some(false));
        assert_eq!(parse_bool("1"), Some(false));
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn rating_must_be_all_digits() {
        assert_eq!(parse_rating("5"), Some(5));
        assert_eq!(parse_rating("4.5"), None);
        assert_eq!(parse_rating("-3"), None);
        assert_eq!(parse_rating("five"), None);
        assert_eq!(parse_rating(""), None);
    }
}
