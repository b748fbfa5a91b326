use super::classification::{Classification, ClassificationInput, Classifier};
use crate::domain::{NotamId, NotamType};
use crate::parser::ParsedNotam;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const SUMMARY_BODY_PREVIEW: usize = 200;

/// Envelope metadata that travels with a message from the fetch source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub airport_code: Option<String>,
    pub airport_name: Option<String>,
    pub issue_date: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub source_type: Option<String>,
    pub transaction_id: Option<i64>,
    pub search_term: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notam {
    pub notam_id: NotamId,
    pub series: String,
    pub number: i32,
    pub year: i32,
    pub notam_type: NotamType,
    pub replaces_notam_id: Option<NotamId>,
    pub cancels_notam_id: Option<NotamId>,

    pub fir: String,
    pub airport_code: Option<String>,
    pub airport_name: Option<String>,
    pub location: String,
    pub scope: Option<String>,
    pub traffic: Option<String>,
    pub purpose: Option<String>,

    pub q_code: Option<String>,
    pub q_code_subject: Option<String>,
    pub q_code_condition: Option<String>,

    pub coordinates: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_nm: Option<i32>,
    pub lower_limit: Option<i32>,
    pub upper_limit: Option<i32>,
    pub lower_limit_text: Option<String>,
    pub upper_limit_text: Option<String>,

    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub is_permanent: bool,
    pub schedule: Option<String>,
    pub issue_date: Option<DateTime<Utc>>,

    pub body: String,
    pub raw_icao_message: String,

    #[serde(flatten)]
    pub classification: Classification,

    pub source: Option<String>,
    pub source_type: Option<String>,
    pub search_term: Option<String>,
    pub transaction_id: Option<i64>,
    pub has_history: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Notam {
    /// Builds the entity from parsed fields and envelope metadata, computing
    /// flags and score.
    ///
    /// `airport_code` prefers the envelope's facility designator and falls
    /// back to the first designator in field A).
    #[must_use]
    pub fn from_parsed(parsed: ParsedNotam, provenance: Provenance, classifier: &Classifier) -> Self {
        let classification = classifier.classify(&ClassificationInput {
            q_code: parsed.q_code.as_deref(),
            body: &parsed.body,
            notam_type: parsed.notam_type,
            scope: parsed.scope.as_deref(),
            is_permanent: parsed.is_permanent,
        });

        let airport_code = provenance
            .airport_code
            .filter(|code| !code.trim().is_empty())
            .or_else(|| {
                let first = parsed.primary_location();
                (!first.is_empty()).then(|| first.to_string())
            });

        Self {
            notam_id: parsed.notam_id,
            series: parsed.series,
            number: i32::try_from(parsed.number).unwrap_or(i32::MAX),
            year: i32::from(parsed.year),
            notam_type: parsed.notam_type,
            replaces_notam_id: parsed.replaces_notam_id,
            cancels_notam_id: parsed.cancels_notam_id,
            fir: parsed.fir,
            airport_code,
            airport_name: provenance.airport_name.filter(|n| !n.trim().is_empty()),
            location: parsed.location,
            scope: parsed.scope,
            traffic: parsed.traffic,
            purpose: parsed.purpose,
            q_code: parsed.q_code,
            q_code_subject: parsed.q_code_subject,
            q_code_condition: parsed.q_code_condition,
            coordinates: parsed.coordinates,
            latitude: parsed.latitude,
            longitude: parsed.longitude,
            radius_nm: parsed.radius_nm,
            lower_limit: parsed.lower_limit,
            upper_limit: parsed.upper_limit,
            lower_limit_text: parsed.lower_limit_text,
            upper_limit_text: parsed.upper_limit_text,
            valid_from: parsed.valid_from,
            valid_to: parsed.valid_to,
            is_permanent: parsed.is_permanent,
            schedule: parsed.schedule,
            issue_date: provenance.issue_date,
            body: parsed.body,
            raw_icao_message: parsed.raw,
            classification,
            source: provenance.source,
            source_type: provenance.source_type,
            search_term: provenance.search_term,
            transaction_id: provenance.transaction_id,
            has_history: false,
            created_at: None,
            updated_at: None,
        }
    }

    #[must_use]
    pub const fn priority_score(&self) -> i32 {
        self.classification.priority_score
    }

    #[must_use]
    pub const fn is_closure(&self) -> bool {
        self.classification.is_closure
    }

    #[must_use]
    pub const fn is_drone_related(&self) -> bool {
        self.classification.is_drone_related
    }

    #[must_use]
    pub const fn is_restriction(&self) -> bool {
        self.classification.is_restriction
    }

    /// Still in force at `now`: not cancelled and not past its end.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.notam_type != NotamType::Cancel && self.valid_to.is_none_or(|end| end >= now)
    }

    /// Airport designator for display, falling back to field A).
    #[must_use]
    pub fn display_location(&self) -> &str {
        self.airport_code
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.location)
    }

    /// Compares everything except bookkeeping: `created_at`, `updated_at`
    /// and `has_history`.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.without_bookkeeping() == other.without_bookkeeping()
    }

    fn without_bookkeeping(&self) -> Self {
        Self {
            has_history: false,
            created_at: None,
            updated_at: None,
            ..self.clone()
        }
    }

    /// Multi-line human readable description.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let mut header = format!("{} | {}", self.notam_id, self.display_location());
        if let Some(name) = &self.airport_name {
            header.push_str(&format!(" ({name})"));
        }
        let underline = "=".repeat(header.chars().count());
        lines.push(header);
        lines.push(underline);

        let mut kind = format!("Type: {}", self.notam_type);
        if let Some(id) = &self.replaces_notam_id {
            kind.push_str(&format!(" (replaces {id})"));
        }
        if let Some(id) = &self.cancels_notam_id {
            kind.push_str(&format!(" (cancels {id})"));
        }
        lines.push(kind);

        let mut valid = String::from("Valid: ");
        if let Some(from) = self.valid_from {
            valid.push_str(&from.format("%Y-%m-%d %H:%M UTC").to_string());
        }
        if let Some(to) = self.valid_to {
            valid.push_str(&format!(" -> {}", to.format("%Y-%m-%d %H:%M UTC")));
        } else if self.is_permanent {
            valid.push_str(" -> PERMANENT");
        }
        lines.push(valid);

        if let Some(schedule) = &self.schedule {
            lines.push(format!("Schedule: {schedule}"));
        }

        match (&self.q_code_subject, &self.q_code_condition) {
            (Some(subject), Some(condition)) => {
                lines.push(format!("Q-Code: {subject} / {condition}"));
            }
            (Some(only), None) | (None, Some(only)) => lines.push(format!("Q-Code: {only}")),
            (None, None) => {}
        }

        let preview = self.body.replace('\n', " ");
        let preview = preview.trim();
        if preview.chars().count() > SUMMARY_BODY_PREVIEW {
            let cut: String = preview.chars().take(SUMMARY_BODY_PREVIEW).collect();
            lines.push(format!("\n{cut}..."));
        } else if !preview.is_empty() {
            lines.push(format!("\n{preview}"));
        }

        lines.push(format!("\nPriority Score: {}", self.priority_score()));
        if self.is_closure() {
            lines.push("CLOSURE".to_string());
        }
        if self.is_drone_related() {
            lines.push("DRONE ACTIVITY".to_string());
        }
        if self.is_restriction() {
            lines.push("RESTRICTION".to_string());
        }

        lines.join("\n")
    }
}

impl fmt::Display for Notam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.is_closure() {
            flags.push("CLS");
        }
        if self.is_drone_related() {
            flags.push("DRN");
        }
        if self.is_restriction() {
            flags.push("RST");
        }
        if self.is_permanent {
            flags.push("PERM");
        }

        write!(
            f,
            "<Notam {} {} score={}",
            self.notam_id,
            self.display_location(),
            self.priority_score()
        )?;
        if !flags.is_empty() {
            write!(f, " [{}]", flags.join(","))?;
        }
        f.write_str(">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::parser::parse_notam;
    use chrono::Duration;

    const RUNWAY: &str = "A3097/25 NOTAMN\nQ) EKDK/QMRLC/IV/NBO/A/000/999/5537N01239E005\nA) EKCH B) 2502010600 C) 2502281800\nE) RWY 12/30 CLSD DUE TO WIP";

    fn build(raw: &str, provenance: Provenance) -> Notam {
        let classifier = Classifier::new(&ScoringConfig::default()).unwrap();
        Notam::from_parsed(parse_notam(raw).unwrap(), provenance, &classifier)
    }

    #[test]
    fn from_parsed_scores_and_fills_airport() {
        let notam = build(RUNWAY, Provenance::default());
        assert_eq!(notam.airport_code.as_deref(), Some("EKCH"));
        assert!(notam.is_closure());
        assert_eq!(notam.priority_score(), 50 + 10 + 10);
        assert!(!notam.has_history);
        assert_eq!(notam.raw_icao_message, RUNWAY);
    }

    #[test]
    fn envelope_designator_wins_over_location() {
        let notam = build(
            RUNWAY,
            Provenance {
                airport_code: Some("KJFK".to_string()),
                airport_name: Some("  ".to_string()),
                ..Provenance::default()
            },
        );
        assert_eq!(notam.airport_code.as_deref(), Some("KJFK"));
        assert!(notam.airport_name.is_none());
    }

    #[test]
    fn same_content_ignores_bookkeeping() {
        let a = build(RUNWAY, Provenance::default());
        let mut b = a.clone();
        b.has_history = true;
        b.created_at = Some(Utc::now());
        b.updated_at = Some(Utc::now());
        assert!(a.same_content(&b));

        b.body.push_str(" AMENDED");
        assert!(!a.same_content(&b));
    }

    #[test]
    fn activity_depends_on_end_and_type() {
        let mut notam = build(RUNWAY, Provenance::default());
        let now = Utc::now();

        notam.valid_to = Some(now + Duration::days(1));
        assert!(notam.is_active_at(now));

        notam.valid_to = Some(now - Duration::days(1));
        assert!(!notam.is_active_at(now));

        notam.valid_to = None;
        assert!(notam.is_active_at(now));

        notam.notam_type = NotamType::Cancel;
        assert!(!notam.is_active_at(now));
    }

    #[test]
    fn display_is_compact() {
        let notam = build(RUNWAY, Provenance::default());
        assert_eq!(notam.to_string(), "<Notam A3097/25 EKCH score=70 [CLS]>");
    }

    #[test]
    fn summary_lists_the_essentials() {
        let notam = build(
            RUNWAY,
            Provenance {
                airport_name: Some("Copenhagen Kastrup".to_string()),
                ..Provenance::default()
            },
        );
        let summary = notam.summary();
        assert!(summary.starts_with("A3097/25 | EKCH (Copenhagen Kastrup)\n===="));
        assert!(summary.contains("Type: NEW"));
        assert!(summary.contains("Valid: 2025-02-01 06:00 UTC -> 2025-02-28 18:00 UTC"));
        assert!(summary.contains("Q-Code: Runway / Closed"));
        assert!(summary.contains("RWY 12/30 CLSD DUE TO WIP"));
        assert!(summary.contains("Priority Score: 70"));
        assert!(summary.contains("CLOSURE"));
    }
}
