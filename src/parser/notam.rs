//! ICAO NOTAM text parser.
//!
//! A message looks like
//!
//! ```text
//! A3097/25 NOTAMN
//! Q) EKDK/QMRLC/IV/NBO/A/000/999/5537N01239E005
//! A) EKCH B) 2502010600 C) 2502281800
//! E) RWY 12/30 CLSD DUE TO WIP
//! ```
//!
//! The header, the FIR from the Q) line and fields A) and E) are required.
//! Every other field is optional and left empty when absent. A field that is
//! present but cannot be read (a B) that is not a date, for instance) fails
//! the message rather than being silently dropped.

use super::datetime::{ValidityEnd, parse_validity_end, parse_validity_start};
use super::get_regex;
use super::taxonomy;
use crate::domain::{NotamId, NotamType};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Field letters in the order they appear in a message.
const FIELD_ORDER: [char; 8] = ['Q', 'A', 'B', 'C', 'D', 'E', 'F', 'G'];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorReason {
    #[error("missing required field {0}")]
    Missing(&'static str),

    #[error("malformed field {field}: {value:?}")]
    Malformed { field: &'static str, value: String },
}

/// A message that could not be parsed. Carries the raw text so the caller
/// can log or keep it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ParseError {
    pub reason: ParseErrorReason,
    pub raw: String,
}

impl ParseError {
    fn missing(field: &'static str, raw: &str) -> Self {
        Self {
            reason: ParseErrorReason::Missing(field),
            raw: raw.to_string(),
        }
    }

    fn malformed(field: &'static str, value: &str, raw: &str) -> Self {
        Self {
            reason: ParseErrorReason::Malformed {
                field,
                value: value.to_string(),
            },
            raw: raw.to_string(),
        }
    }
}

/// Decoded fields of one message, before classification and scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNotam {
    pub notam_id: NotamId,
    pub series: String,
    pub number: u32,
    pub year: u16,
    pub notam_type: NotamType,
    pub replaces_notam_id: Option<NotamId>,
    pub cancels_notam_id: Option<NotamId>,

    pub fir: String,
    pub q_code: Option<String>,
    pub q_code_subject: Option<String>,
    pub q_code_condition: Option<String>,
    pub traffic: Option<String>,
    pub purpose: Option<String>,
    pub scope: Option<String>,
    pub lower_limit: Option<i32>,
    pub upper_limit: Option<i32>,
    pub coordinates: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_nm: Option<i32>,

    pub location: String,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub is_permanent: bool,
    pub schedule: Option<String>,
    pub body: String,
    pub lower_limit_text: Option<String>,
    pub upper_limit_text: Option<String>,

    pub raw: String,
}

impl ParsedNotam {
    /// First ICAO designator listed in field A).
    #[must_use]
    pub fn primary_location(&self) -> &str {
        self.location.split_whitespace().next().unwrap_or_default()
    }
}

/// Position data decoded from the last Q) group, e.g. `4904N00607E003`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_nm: Option<i32>,
}

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(
        &RE,
        r"^\s*(?P<id>(?P<series>[A-Z])(?P<number>\d{1,4})/(?P<year>\d{2}))\s+NOTAM(?P<kind>[NRC])(?:\s+(?P<ref>[A-Z]\d{1,4}/\d{2}))?",
    )
}

fn field_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(&RE, r"(?m)(?:^|[ \t\r\n])([QA-G])\)")
}

fn coordinates_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(
        &RE,
        r"^(\d{2})(\d{2})([NS])(\d{3})(\d{2})([EW])(\d{3})?$",
    )
}

/// Raw text of each lettered field, indexed by [`FIELD_ORDER`].
struct Fields<'a> {
    header: &'a str,
    values: [Option<&'a str>; 8],
}

impl<'a> Fields<'a> {
    fn get(&self, letter: char) -> Option<&'a str> {
        let idx = FIELD_ORDER.iter().position(|c| *c == letter)?;
        self.values[idx]
    }
}

/// Splits a message into its header and lettered fields.
///
/// Markers must appear in `Q A B C D E F G` order; a marker that would go
/// backwards (e.g. `TWY A)` inside the E) text) is treated as field content.
fn split_fields(raw: &str) -> Fields<'_> {
    let mut markers: Vec<(usize, usize, usize)> = Vec::new();
    let mut last: Option<usize> = None;

    for caps in field_marker_regex().captures_iter(raw) {
        let (Some(whole), Some(letter)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(idx) = letter
            .as_str()
            .chars()
            .next()
            .and_then(|c| FIELD_ORDER.iter().position(|f| *f == c))
        else {
            continue;
        };
        if last.is_some_and(|prev| idx <= prev) {
            continue;
        }
        last = Some(idx);
        markers.push((idx, letter.start(), whole.end()));
    }

    let header_end = markers.first().map_or(raw.len(), |(_, start, _)| *start);
    let mut values = [None; 8];
    for (i, (idx, _, content_start)) in markers.iter().enumerate() {
        let content_end = markers
            .get(i + 1)
            .map_or(raw.len(), |(_, next_start, _)| *next_start);
        values[*idx] = Some(raw[*content_start..content_end].trim());
    }

    Fields {
        header: &raw[..header_end],
        values,
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Decodes `DDMM[N|S]DDDMM[E|W][RRR]` into signed decimal degrees.
#[must_use]
pub fn parse_coordinates(value: &str) -> Option<Coordinates> {
    let caps = coordinates_regex().captures(value.trim())?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let lat_deg = num(1)?;
    let lat_min = num(2)?;
    let lon_deg = num(4)?;
    let lon_min = num(5)?;
    if lat_deg > 90 || lon_deg > 180 || lat_min >= 60 || lon_min >= 60 {
        return None;
    }

    let mut latitude = f64::from(lat_deg) + f64::from(lat_min) / 60.0;
    if caps.get(3).is_some_and(|m| m.as_str() == "S") {
        latitude = -latitude;
    }
    let mut longitude = f64::from(lon_deg) + f64::from(lon_min) / 60.0;
    if caps.get(6).is_some_and(|m| m.as_str() == "W") {
        longitude = -longitude;
    }

    let radius_nm = caps.get(7).and_then(|m| m.as_str().parse::<i32>().ok());

    Some(Coordinates {
        latitude,
        longitude,
        radius_nm,
    })
}

struct QLine {
    fir: String,
    q_code: Option<String>,
    traffic: Option<String>,
    purpose: Option<String>,
    scope: Option<String>,
    lower_limit: Option<i32>,
    upper_limit: Option<i32>,
    coordinates: Option<String>,
}

fn parse_q_line(value: &str, raw: &str) -> Result<QLine, ParseError> {
    let parts: Vec<&str> = value.split('/').map(str::trim).collect();
    let part = |i: usize| non_empty(parts.get(i).copied());

    let fir = part(0).ok_or_else(|| ParseError::missing("FIR", raw))?;
    let limit = |i: usize| {
        parts
            .get(i)
            .filter(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()))
            .and_then(|v| v.parse::<i32>().ok())
    };

    Ok(QLine {
        fir,
        q_code: part(1),
        traffic: part(2),
        purpose: part(3),
        scope: part(4),
        lower_limit: limit(5),
        upper_limit: limit(6),
        coordinates: part(7),
    })
}

/// Parses one raw NOTAM message.
pub fn parse_notam(raw: &str) -> Result<ParsedNotam, ParseError> {
    let fields = split_fields(raw);

    let header = header_regex()
        .captures(fields.header)
        .ok_or_else(|| ParseError::missing("header", raw))?;
    let capture = |name: &str| header.name(name).map(|m| m.as_str());

    let notam_id = capture("id").ok_or_else(|| ParseError::missing("header", raw))?;
    let series = capture("series").unwrap_or_default().to_string();
    let number = capture("number")
        .and_then(|n| n.parse::<u32>().ok())
        .ok_or_else(|| ParseError::malformed("header", notam_id, raw))?;
    let year = capture("year")
        .and_then(|y| y.parse::<u16>().ok())
        .ok_or_else(|| ParseError::malformed("header", notam_id, raw))?;
    let notam_type = capture("kind")
        .and_then(|k| k.chars().next())
        .and_then(NotamType::from_suffix)
        .ok_or_else(|| ParseError::malformed("header", fields.header.trim(), raw))?;
    let reference = capture("ref").map(NotamId::new);
    let (replaces_notam_id, cancels_notam_id) = match notam_type {
        NotamType::New => (None, None),
        NotamType::Replace => (reference, None),
        NotamType::Cancel => (None, reference),
    };

    let q_line = parse_q_line(
        fields.get('Q').ok_or_else(|| ParseError::missing("Q)", raw))?,
        raw,
    )?;

    let location = non_empty(fields.get('A')).ok_or_else(|| ParseError::missing("A)", raw))?;
    let body = non_empty(fields.get('E'))
        .map(|text| html_escape::decode_html_entities(&text).into_owned())
        .ok_or_else(|| ParseError::missing("E)", raw))?;

    let valid_from = match non_empty(fields.get('B')) {
        Some(value) => {
            parse_validity_start(&value).ok_or_else(|| ParseError::malformed("B)", &value, raw))?
        }
        None => None,
    };

    let (valid_to, is_permanent) = match non_empty(fields.get('C')) {
        Some(value) => match parse_validity_end(&value) {
            Some(ValidityEnd::Permanent) => (None, true),
            Some(ValidityEnd::At(end)) => (Some(end), false),
            Some(ValidityEnd::Open) => (None, false),
            None => return Err(ParseError::malformed("C)", &value, raw)),
        },
        None => (None, false),
    };

    let decoded = q_line.q_code.as_deref().and_then(taxonomy::decode);
    let position = q_line.coordinates.as_deref().and_then(parse_coordinates);

    Ok(ParsedNotam {
        notam_id: NotamId::new(notam_id),
        series,
        number,
        year,
        notam_type,
        replaces_notam_id,
        cancels_notam_id,
        fir: q_line.fir,
        q_code: q_line.q_code,
        q_code_subject: decoded.as_ref().map(|d| d.subject.clone()),
        q_code_condition: decoded.map(|d| d.condition),
        traffic: q_line.traffic,
        purpose: q_line.purpose,
        scope: q_line.scope,
        lower_limit: q_line.lower_limit,
        upper_limit: q_line.upper_limit,
        coordinates: q_line.coordinates,
        latitude: position.map(|p| p.latitude),
        longitude: position.map(|p| p.longitude),
        radius_nm: position.and_then(|p| p.radius_nm),
        location,
        valid_from,
        valid_to,
        is_permanent,
        schedule: non_empty(fields.get('D')),
        body,
        lower_limit_text: non_empty(fields.get('F')),
        upper_limit_text: non_empty(fields.get('G')),
        raw: raw.to_string(),
    })
}
