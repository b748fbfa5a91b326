//! Date fields found in NOTAM text and in the FAA response envelope.
//!
//! All times are UTC. Timezone suffixes on FAA dates are informational only.

use super::get_regex;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Marker used in field C) for a NOTAM without an end time.
pub const PERMANENT_MARKER: &str = "PERM";

/// Field C) marker for an end that is not yet known.
pub const UNTIL_FURTHER_NOTICE: &str = "UFN";

/// Field B) marker for a NOTAM effective on publication.
pub const WITH_IMMEDIATE_EFFECT: &str = "WIE";

/// Value of field C) after suffix handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityEnd {
    Permanent,
    /// Until further notice.
    Open,
    At(DateTime<Utc>),
}

fn icao_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(&RE, r"^(\d{2})(\d{2})(\d{2})(\d{2})(\d{2})$")
}

fn faa_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(
        &RE,
        r"(?i)^(\d{1,2})/(\d{1,2})/(\d{4})(?:\s+(\d{2})(\d{2}))?(?:\s*(?:EST|UTC|GMT))?$",
    )
}

fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let naive: NaiveDateTime = date.and_hms_opt(hour, minute, 0)?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Parses a ten digit `YYMMDDHHMM` group as used in fields B) and C).
///
/// Two digit years below 50 are 20xx, the rest 19xx.
#[must_use]
pub fn parse_icao_datetime(value: &str) -> Option<DateTime<Utc>> {
    let caps = icao_regex().captures(value.trim())?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let yy = num(1)?;
    let year = if yy < 50 { 2000 + yy } else { 1900 + yy };
    utc(i32::try_from(year).ok()?, num(2)?, num(3)?, num(4)?, num(5)?)
}

/// Parses field B). `WIE` yields `Some(None)`: the start is left open.
#[must_use]
pub fn parse_validity_start(value: &str) -> Option<Option<DateTime<Utc>>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case(WITH_IMMEDIATE_EFFECT) {
        return Some(None);
    }
    parse_icao_datetime(value).map(Some)
}

/// Parses field C). `PERM` is permanent, `UFN` an open end; a trailing `EST` (estimated) is
/// dropped and the date still marks the end of validity.
#[must_use]
pub fn parse_validity_end(value: &str) -> Option<ValidityEnd> {
    let value = value.trim();
    if value.eq_ignore_ascii_case(PERMANENT_MARKER) {
        return Some(ValidityEnd::Permanent);
    }
    if value.eq_ignore_ascii_case(UNTIL_FURTHER_NOTICE) {
        return Some(ValidityEnd::Open);
    }

    let stripped = value
        .strip_suffix("EST")
        .or_else(|| value.strip_suffix("est"))
        .unwrap_or(value)
        .trim_end();

    parse_icao_datetime(stripped).map(ValidityEnd::At)
}

/// Parses the envelope `issueDate`, e.g. `01/15/2025 1430` or
/// `01/15/2025 1430EST`. A missing time component means midnight.
#[must_use]
pub fn parse_faa_date(value: &str) -> Option<DateTime<Utc>> {
    let caps = faa_regex().captures(value.trim())?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let year = caps.get(3)?.as_str().parse::<i32>().ok()?;
    let (hour, minute) = match (num(4), num(5)) {
        (Some(h), Some(m)) => (h, m),
        _ => (0, 0),
    };
    utc(year, num(1)?, num(2)?, hour, minute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn icao_dates_use_pivot_year() {
        let date = parse_icao_datetime("2411280000").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 11, 28));

        let old = parse_icao_datetime("9901010000").unwrap();
        assert_eq!(old.year(), 1999);
    }

    #[test]
    fn icao_dates_reject_impossible_values() {
        assert!(parse_icao_datetime("2413010000").is_none());
        assert!(parse_icao_datetime("2402302500").is_none());
        assert!(parse_icao_datetime("24112800").is_none());
        assert!(parse_icao_datetime("garbage").is_none());
    }

    #[test]
    fn validity_end_handles_perm_and_est() {
        assert_eq!(parse_validity_end("PERM"), Some(ValidityEnd::Permanent));

        let Some(ValidityEnd::At(end)) = parse_validity_end("2604152359EST") else {
            panic!("expected a date");
        };
        assert_eq!((end.year(), end.month(), end.day()), (2026, 4, 15));
        assert_eq!((end.hour(), end.minute()), (23, 59));

        assert!(parse_validity_end("2604152359 EST").is_some());
        assert!(parse_validity_end("SOON").is_none());
    }

    #[test]
    fn open_ended_markers() {
        assert_eq!(parse_validity_end("UFN"), Some(ValidityEnd::Open));
        assert_eq!(parse_validity_end(" ufn "), Some(ValidityEnd::Open));
        assert_eq!(parse_validity_start("WIE"), Some(None));
        assert!(parse_validity_start("2502010600").unwrap().is_some());
        assert!(parse_validity_start("25X2010600").is_none());
    }

    #[test]
    fn faa_dates_strip_timezone_suffix() {
        let date = parse_faa_date("01/15/2025 1430EST").unwrap();
        assert_eq!((date.month(), date.day(), date.hour(), date.minute()), (1, 15, 14, 30));

        let utc_suffix = parse_faa_date("12/01/2024 0905 UTC").unwrap();
        assert_eq!(utc_suffix.hour(), 9);

        let midnight = parse_faa_date("12/01/2024").unwrap();
        assert_eq!(midnight.hour(), 0);

        assert!(parse_faa_date("2024-12-01").is_none());
    }
}
