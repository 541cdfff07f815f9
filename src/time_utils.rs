// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time parsing and formatting.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a strict `YYYY-MM-DD` calendar date.
///
/// chrono's `%Y-%m-%d` accepts unpadded fields like `2025-3-1`, so the shape
/// is checked first. Impossible dates (`2025-02-30`) fail in chrono.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_with_z_suffix() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 10, 14, 30, 0).unwrap();
        assert_eq!(format_utc_rfc3339(ts), "2025-03-10T14:30:00Z");
    }

    #[test]
    fn parses_valid_dates() {
        assert_eq!(
            parse_calendar_date("2024-02-29"),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
    }

    #[test]
    fn rejects_malformed_and_impossible_dates() {
        for raw in [
            "",
            "2025-3-1",
            "2025/03/01",
            "20250301",
            "2025-02-30",
            "2025-13-01",
            "2025-03-10T00:00:00Z",
            "abcd-ef-gh",
        ] {
            assert_eq!(parse_calendar_date(raw), None, "{raw} should be rejected");
        }
    }
}
