use crate::domain::SearchMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit record of one polling cycle. Written once at the end of the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRun {
    pub id: Option<i32>,
    pub mode: SearchMode,
    pub search_term: Option<String>,
    /// Comma separated designators polled in airport mode.
    pub airport_codes: Option<String>,
    pub total_fetched: i32,
    pub new_inserted: i32,
    pub updated: i32,
    /// Upserts that gave up after exhausting their retries.
    pub failed: i32,
    pub run_at: DateTime<Utc>,
}

impl SearchRun {
    #[must_use]
    pub fn new(mode: SearchMode) -> Self {
        Self {
            id: None,
            mode,
            search_term: None,
            airport_codes: None,
            total_fetched: 0,
            new_inserted: 0,
            updated: 0,
            failed: 0,
            run_at: Utc::now(),
        }
    }
}
