//! Derived flags and the priority score.

use crate::config::ScoringConfig;
use crate::domain::NotamType;
use crate::parser::taxonomy::{
    self, CLOSURE_CONDITIONS, RESTRICTION_CONDITIONS, RESTRICTION_SUBJECTS, TRIGGER_CONDITION,
};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

const TRIGGER_PREFIX: &str = "TRIGGER NOTAM";

/// Flags and score computed from a NOTAM's content. Never supplied by a
/// caller; always the output of [`Classifier::classify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub is_closure: bool,
    pub is_drone_related: bool,
    pub is_restriction: bool,
    pub is_trigger_notam: bool,
    pub priority_score: i32,
}

/// The fields classification reads.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationInput<'a> {
    pub q_code: Option<&'a str>,
    pub body: &'a str,
    pub notam_type: NotamType,
    pub scope: Option<&'a str>,
    pub is_permanent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreWeights {
    pub closure: i32,
    pub drone: i32,
    pub restriction: i32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            closure: 50,
            drone: 30,
            restriction: 20,
        }
    }
}

/// Additive priority score. Not clamped: a trigger NOTAM with nothing else
/// going for it scores below zero.
#[must_use]
#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
pub fn priority_score(
    weights: ScoreWeights,
    is_closure: bool,
    is_drone_related: bool,
    is_restriction: bool,
    is_trigger_notam: bool,
    notam_type: NotamType,
    scope: Option<&str>,
    is_permanent: bool,
) -> i32 {
    let mut score = 0;

    if is_closure {
        score += weights.closure;
    }
    if is_drone_related {
        score += weights.drone;
    }
    if is_restriction && !is_closure {
        score += weights.restriction;
    }

    score += match notam_type {
        NotamType::New => 10,
        NotamType::Replace => 5,
        NotamType::Cancel => 0,
    };

    if is_aerodrome_scope(scope) {
        score += 10;
    }
    if is_permanent {
        score += 5;
    }
    if is_trigger_notam {
        score -= 10;
    }

    score
}

#[must_use]
pub fn is_aerodrome_scope(scope: Option<&str>) -> bool {
    scope.is_some_and(|s| s.contains('A'))
}

/// Classifies NOTAMs against the configured vocabularies.
#[derive(Debug, Clone)]
pub struct Classifier {
    weights: ScoreWeights,
    drone_patterns: Vec<Regex>,
    closure_keywords: Vec<String>,
    restriction_keywords: Vec<String>,
}

impl Classifier {
    /// Builds a classifier. A drone keyword ending in `-` matches as a
    /// prefix (`unmanned-` matches `unmanned-aircraft`), any other keyword
    /// must match a whole word.
    pub fn new(config: &ScoringConfig) -> Result<Self, regex::Error> {
        let drone_patterns = config
            .drone_keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|keyword| {
                let pattern = keyword.strip_suffix('-').map_or_else(
                    || format!(r"\b{}\b", regex::escape(keyword)),
                    |stem| format!(r"\b{}", regex::escape(stem)),
                );
                RegexBuilder::new(&pattern).case_insensitive(true).build()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let lowercase = |words: &[String]| -> Vec<String> {
            words
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };

        Ok(Self {
            weights: ScoreWeights {
                closure: config.closure_score,
                drone: config.drone_score,
                restriction: config.restriction_score,
            },
            drone_patterns,
            closure_keywords: lowercase(&config.closure_keywords),
            restriction_keywords: lowercase(&config.restriction_keywords),
        })
    }

    #[must_use]
    pub const fn weights(&self) -> ScoreWeights {
        self.weights
    }

    #[must_use]
    pub fn classify(&self, input: &ClassificationInput<'_>) -> Classification {
        let (subject, condition) = input
            .q_code
            .and_then(taxonomy::split)
            .map_or((None, None), |(s, c)| {
                (Some(s.to_ascii_uppercase()), Some(c.to_ascii_uppercase()))
            });
        let body_lower = input.body.to_lowercase();

        let is_closure = condition
            .as_deref()
            .is_some_and(|c| CLOSURE_CONDITIONS.contains(&c))
            || self
                .closure_keywords
                .iter()
                .any(|k| body_lower.contains(k.as_str()));

        let is_drone_related = self.drone_patterns.iter().any(|re| re.is_match(input.body));

        let is_restriction = subject
            .as_deref()
            .is_some_and(|s| RESTRICTION_SUBJECTS.contains(&s))
            || condition
                .as_deref()
                .is_some_and(|c| RESTRICTION_CONDITIONS.contains(&c))
            || self
                .restriction_keywords
                .iter()
                .any(|k| body_lower.contains(k.as_str()));

        let is_trigger_notam = input
            .body
            .trim_start()
            .to_ascii_uppercase()
            .starts_with(TRIGGER_PREFIX)
            || condition.as_deref() == Some(TRIGGER_CONDITION);

        Classification {
            is_closure,
            is_drone_related,
            is_restriction,
            is_trigger_notam,
            priority_score: priority_score(
                self.weights,
                is_closure,
                is_drone_related,
                is_restriction,
                is_trigger_notam,
                input.notam_type,
                input.scope,
                input.is_permanent,
            ),
        }
    }
}
