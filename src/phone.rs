// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Canadian (NANP) phone number helpers.

use regex::Regex;
use std::sync::LazyLock;

static CANADIAN_PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\+?1[\s.-]?)?\(?[2-9]\d{2}\)?[\s.-]?[2-9]\d{2}[\s.-]?\d{4}$")
        .expect("phone regex is valid")
});

/// Whether `raw` is a ten-digit NANP number, optionally prefixed with `+1`/`1`
/// and separated by spaces, dots, dashes or a parenthesized area code.
pub fn is_canadian_phone(raw: &str) -> bool {
    CANADIAN_PHONE.is_match(raw.trim())
}

fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// The ten-digit national number, without country code.
pub fn national_digits(raw: &str) -> Option<String> {
    let d = digits(raw);
    match d.len() {
        10 => Some(d),
        11 if d.starts_with('1') => Some(d[1..].to_string()),
        _ => None,
    }
}

/// E.164 form (`+14165551234`) used by the fleet platform.
pub fn to_e164(raw: &str) -> Option<String> {
    national_digits(raw).map(|n| format!("+1{n}"))
}

/// Canonical stored form, `XXX-XXX-XXXX`.
pub fn to_dashed(raw: &str) -> Option<String> {
    national_digits(raw).map(|n| format!("{}-{}-{}", &n[0..3], &n[3..6], &n[6..]))
}

/// Every stored form a number may have been saved under, most literal first.
///
/// New writes are stored dashed, but older records may hold the phone as the
/// driver typed it, so lookups also try the raw value, bare digits, the
/// national number and E.164.
pub fn lookup_candidates(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    let mut candidates = vec![raw.to_string(), digits(raw)];

    if let Some(national) = national_digits(raw) {
        candidates.push(national.clone());
        candidates.extend(to_dashed(&national));
        candidates.push(format!("+1{national}"));
    }

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| !c.is_empty() && seen.insert(c.clone()));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_canadian_formats() {
        for phone in [
            "416-555-1234",
            "4165551234",
            "(416) 555-1234",
            "+1 416 555 1234",
            "1-416-555-1234",
            "416.555.1234",
        ] {
            assert!(is_canadian_phone(phone), "{phone} should be valid");
        }
    }

    #[test]
    fn rejects_invalid_numbers() {
        for phone in ["", "555-1234", "016-555-1234", "416-055-1234", "+44 20 7946 0958", "abc"] {
            assert!(!is_canadian_phone(phone), "{phone} should be invalid");
        }
    }

    #[test]
    fn e164_normalization() {
        assert_eq!(to_e164("416-555-1234").as_deref(), Some("+14165551234"));
        assert_eq!(to_e164("+1 (416) 555-1234").as_deref(), Some("+14165551234"));
        assert_eq!(to_e164("555-1234"), None);
    }

    #[test]
    fn dashed_normalization() {
        assert_eq!(to_dashed("(416) 555-1234").as_deref(), Some("416-555-1234"));
        assert_eq!(to_dashed("+1 416.555.1234").as_deref(), Some("416-555-1234"));
        assert_eq!(to_dashed("555-1234"), None);
    }

    #[test]
    fn candidates_cover_dashed_form_for_digits() {
        let candidates = lookup_candidates("4165551234");
        assert!(candidates.contains(&"4165551234".to_string()));
        assert!(candidates.contains(&"416-555-1234".to_string()));
        assert!(candidates.contains(&"+14165551234".to_string()));
    }

    #[test]
    fn candidates_are_deduplicated() {
        let candidates = lookup_candidates("416-555-1234");
        assert_eq!(
            candidates,
            vec![
                "416-555-1234".to_string(),
                "4165551234".to_string(),
                "+14165551234".to_string(),
            ]
        );
    }
}
