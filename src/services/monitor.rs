//! One polling cycle: fetch, parse, classify, enrich, store, alert, audit.

use crate::clients::faa::{FetchError, FetchSource, RawNotam};
use crate::db::{Store, StoreError, UpsertOutcome};
use crate::domain::SearchMode;
use crate::models::{AerodromeLookup, Classifier, Notam, SearchRun};
use crate::parser::parse_notam;
use crate::services::digester::Digester;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Why a cycle produced no search run.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sea_orm::DbErr> for CycleError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for CycleError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    /// Envelopes flagged cancelled or expired upstream.
    pub skipped: usize,
    pub parse_failures: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Upserts that exhausted their retries.
    pub failed: usize,
    /// NOTAMs accepted by the digester.
    pub queued_for_alert: usize,
    pub search_run_id: Option<i32>,
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

pub struct Monitor {
    store: Store,
    source: Arc<dyn FetchSource>,
    classifier: Arc<Classifier>,
    aerodromes: Arc<dyn AerodromeLookup>,
    digester: Option<Arc<Digester>>,
}

impl Monitor {
    #[must_use]
    pub fn new(
        store: Store,
        source: Arc<dyn FetchSource>,
        classifier: Arc<Classifier>,
        digester: Option<Arc<Digester>>,
    ) -> Self {
        let aerodromes: Arc<dyn AerodromeLookup> = Arc::new(store.clone());
        Self {
            store,
            source,
            classifier,
            aerodromes,
            digester,
        }
    }

    /// Replaces the aerodrome reference source (defaults to the store).
    #[must_use]
    pub fn with_aerodromes(mut self, aerodromes: Arc<dyn AerodromeLookup>) -> Self {
        self.aerodromes = aerodromes;
        self
    }

    #[must_use]
    pub fn mode(&self) -> SearchMode {
        self.source.mode()
    }

    /// Runs one cycle. A fetch failure aborts before anything is stored and
    /// records no search run; per-message failures are counted and skipped.
    pub async fn run_cycle(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<CycleReport, CycleError> {
        let mode = self.source.mode();
        let targets = self.source.describe();
        info!(event = "cycle_started", mode = mode.as_str(), targets = %targets, "Starting NOTAM check");

        let batch = match self.source.fetch(shutdown).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(event = "fetch_failed", mode = mode.as_str(), error = %e, "NOTAM fetch failed");
                return Err(e.into());
            }
        };

        let mut report = CycleReport {
            fetched: batch.total_fetched(),
            ..CycleReport::default()
        };

        for raw in &batch.messages {
            self.process(raw, mode, &mut report).await?;
        }

        let mut run = SearchRun::new(mode);
        match mode {
            SearchMode::Airport => run.airport_codes = Some(targets),
            SearchMode::FreeText => run.search_term = Some(targets),
        }
        run.total_fetched = count(report.fetched);
        run.new_inserted = count(report.inserted);
        run.updated = count(report.updated);
        run.failed = count(report.failed);
        report.search_run_id = Some(self.store.record_search_run(&run).await?);

        info!(
            event = "cycle_finished",
            mode = mode.as_str(),
            transaction_id = %batch.transaction_id,
            fetched = report.fetched,
            skipped = report.skipped,
            parse_failures = report.parse_failures,
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            queued = report.queued_for_alert,
            "NOTAM check complete"
        );

        match self.store.get_statistics().await {
            Ok(stats) => info!(
                total = stats.total,
                active = stats.active,
                drone_related = stats.drone_related,
                active_drone_related = stats.active_drone_related,
                active_closures = stats.active_closures,
                cancelled = stats.cancelled,
                "Database statistics"
            ),
            Err(e) => warn!("Failed to compute statistics: {e}"),
        }

        Ok(report)
    }

    async fn process(
        &self,
        raw: &RawNotam,
        mode: SearchMode,
        report: &mut CycleReport,
    ) -> Result<(), CycleError> {
        if raw.is_cancelled_or_expired() {
            debug!(
                notam_number = raw.notam_number.as_deref().unwrap_or("?"),
                "Skipping cancelled or expired NOTAM"
            );
            report.skipped += 1;
            return Ok(());
        }

        let parsed = match parse_notam(&raw.icao_message) {
            Ok(parsed) => parsed,
            Err(e) => {
                metrics::counter!("notam_parse_failures_total").increment(1);
                warn!(
                    reason = %e.reason,
                    facility = raw.facility_designator.as_deref().unwrap_or(""),
                    raw = %e.raw,
                    "Failed to parse NOTAM"
                );
                report.parse_failures += 1;
                return Ok(());
            }
        };

        let mut notam = Notam::from_parsed(parsed, raw.provenance(), &self.classifier);
        self.enrich(&mut notam).await;

        match self.store.upsert(&notam).await {
            Ok(outcome) => {
                metrics::counter!("notams_upserted_total", "outcome" => outcome.as_str())
                    .increment(1);
                let fresh = match outcome {
                    UpsertOutcome::Inserted => {
                        report.inserted += 1;
                        debug!(notam_id = %notam.notam_id, "New NOTAM");
                        true
                    }
                    UpsertOutcome::Updated { changed: true } => {
                        report.updated += 1;
                        debug!(notam_id = %notam.notam_id, "NOTAM changed");
                        true
                    }
                    UpsertOutcome::Updated { changed: false } => {
                        report.unchanged += 1;
                        false
                    }
                };

                if fresh
                    && let Some(digester) = &self.digester
                    && digester.add(&notam)
                {
                    report.queued_for_alert += 1;
                }
                Ok(())
            }
            Err(StoreError::Conflict { notam_id, attempts }) => {
                metrics::counter!("notam_upsert_conflicts_total").increment(1);
                warn!(
                    notam_id = %notam_id,
                    attempts,
                    mode = mode.as_str(),
                    "Gave up storing NOTAM after repeated conflicts"
                );
                report.failed += 1;
                Ok(())
            }
            Err(StoreError::Database(e)) => {
                error!(notam_id = %notam.notam_id, error = %e, "Storage failure, aborting cycle");
                Err(e.into())
            }
        }
    }

    /// Fills `airport_name` from reference data and records unknown
    /// aerodromes. Failures only cost the enrichment.
    async fn enrich(&self, notam: &mut Notam) {
        let Some(code) = notam.airport_code.clone() else {
            return;
        };

        match self.aerodromes.lookup(&code).await {
            Ok(Some(info)) => {
                if notam.airport_name.is_none() {
                    notam.airport_name = info.name.filter(|n| !n.trim().is_empty());
                }
            }
            Ok(None) => {
                if let Err(e) = self.store.infer_aerodrome(notam).await {
                    warn!(icao = %code, "Failed to record inferred aerodrome: {e}");
                }
            }
            Err(e) => warn!(icao = %code, "Aerodrome lookup failed: {e}"),
        }
    }
}
