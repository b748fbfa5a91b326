use crate::domain::{NotamId, NotamType};
use crate::entities::{notams, prelude::*};
use crate::models::{Classification, Notam};
use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

const PURGE_CHUNK: usize = 500;

/// Result of a successful upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// The row existed. `changed` is false when the observation matched the
    /// stored content and nothing was written.
    Updated { changed: bool },
}

impl UpsertOutcome {
    /// Metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Updated { changed: true } => "updated",
            Self::Updated { changed: false } => "unchanged",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("concurrent write conflict on {notam_id} not resolved after {attempts} attempts")]
    Conflict { notam_id: NotamId, attempts: u32 },

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Bounds for the upsert retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Linear backoff plus up to 50% random jitter.
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.saturating_mul(attempt);
        let jitter_ms = u64::try_from(base.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        base + Duration::from_millis(jitter)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotamStatistics {
    pub total: u64,
    pub active: u64,
    pub drone_related: u64,
    pub active_drone_related: u64,
    pub active_closures: u64,
    pub cancelled: u64,
}

enum Attempt {
    Done(UpsertOutcome),
    Conflict,
}

/// Repository for NOTAM rows
pub struct NotamRepository {
    conn: DatabaseConnection,
    retry: RetryPolicy,
}

impl NotamRepository {
    pub const fn new(conn: DatabaseConnection, retry: RetryPolicy) -> Self {
        Self { conn, retry }
    }

    // ========================================================================
    // Model Conversion Helpers
    // ========================================================================

    pub(crate) fn map_model(row: notams::Model) -> Notam {
        Notam {
            notam_id: NotamId::new(row.notam_id),
            series: row.series,
            number: row.number,
            year: row.year,
            notam_type: row.notam_type.parse().unwrap_or_default(),
            replaces_notam_id: row.replaces_notam_id.map(NotamId::new),
            cancels_notam_id: row.cancels_notam_id.map(NotamId::new),
            fir: row.fir,
            airport_code: row.airport_code,
            airport_name: row.airport_name,
            location: row.location,
            scope: row.scope,
            traffic: row.traffic,
            purpose: row.purpose,
            q_code: row.q_code,
            q_code_subject: row.q_code_subject,
            q_code_condition: row.q_code_condition,
            coordinates: row.coordinates,
            latitude: row.latitude,
            longitude: row.longitude,
            radius_nm: row.radius_nm,
            lower_limit: row.lower_limit,
            upper_limit: row.upper_limit,
            lower_limit_text: row.lower_limit_text,
            upper_limit_text: row.upper_limit_text,
            valid_from: row.valid_from,
            valid_to: row.valid_to,
            is_permanent: row.is_permanent,
            schedule: row.schedule,
            issue_date: row.issue_date,
            body: row.body,
            raw_icao_message: row.raw_icao_message,
            classification: Classification {
                is_closure: row.is_closure,
                is_drone_related: row.is_drone_related,
                is_restriction: row.is_restriction,
                is_trigger_notam: row.is_trigger_notam,
                priority_score: row.priority_score,
            },
            source: row.source,
            source_type: row.source_type,
            search_term: row.search_term,
            transaction_id: row.transaction_id,
            has_history: row.has_history,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }

    fn to_active_model(
        notam: &Notam,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        has_history: bool,
    ) -> notams::ActiveModel {
        notams::ActiveModel {
            notam_id: Set(notam.notam_id.as_str().to_string()),
            series: Set(notam.series.clone()),
            number: Set(notam.number),
            year: Set(notam.year),
            notam_type: Set(notam.notam_type.as_str().to_string()),
            replaces_notam_id: Set(notam.replaces_notam_id.as_ref().map(ToString::to_string)),
            cancels_notam_id: Set(notam.cancels_notam_id.as_ref().map(ToString::to_string)),
            fir: Set(notam.fir.clone()),
            airport_code: Set(notam.airport_code.clone()),
            airport_name: Set(notam.airport_name.clone()),
            location: Set(notam.location.clone()),
            scope: Set(notam.scope.clone()),
            traffic: Set(notam.traffic.clone()),
            purpose: Set(notam.purpose.clone()),
            q_code: Set(notam.q_code.clone()),
            q_code_subject: Set(notam.q_code_subject.clone()),
            q_code_condition: Set(notam.q_code_condition.clone()),
            coordinates: Set(notam.coordinates.clone()),
            latitude: Set(notam.latitude),
            longitude: Set(notam.longitude),
            radius_nm: Set(notam.radius_nm),
            lower_limit: Set(notam.lower_limit),
            upper_limit: Set(notam.upper_limit),
            lower_limit_text: Set(notam.lower_limit_text.clone()),
            upper_limit_text: Set(notam.upper_limit_text.clone()),
            valid_from: Set(notam.valid_from),
            valid_to: Set(notam.valid_to),
            is_permanent: Set(notam.is_permanent),
            schedule: Set(notam.schedule.clone()),
            issue_date: Set(notam.issue_date),
            body: Set(notam.body.clone()),
            raw_icao_message: Set(notam.raw_icao_message.clone()),
            is_closure: Set(notam.classification.is_closure),
            is_drone_related: Set(notam.classification.is_drone_related),
            is_restriction: Set(notam.classification.is_restriction),
            is_trigger_notam: Set(notam.classification.is_trigger_notam),
            priority_score: Set(notam.classification.priority_score),
            source: Set(notam.source.clone()),
            source_type: Set(notam.source_type.clone()),
            search_term: Set(notam.search_term.clone()),
            transaction_id: Set(notam.transaction_id),
            has_history: Set(has_history),
            created_at: Set(created_at),
            updated_at: Set(updated_at),
            ..Default::default()
        }
    }

    // ========================================================================
    // Upsert
    // ========================================================================

    /// Inserts or merges one observation.
    ///
    /// Runs as a read-modify-write transaction keyed on `notam_id`. Losing a
    /// race (unique violation on insert, a concurrent update between read
    /// and write, or a busy database) rolls back and retries from a fresh
    /// read, up to the configured number of attempts.
    pub async fn upsert(&self, notam: &Notam) -> Result<UpsertOutcome, StoreError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.try_upsert(notam).await {
                Ok(Attempt::Done(outcome)) => return Ok(outcome),
                Ok(Attempt::Conflict) => {}
                Err(err) if is_transient(&err) => {
                    debug!(notam_id = %notam.notam_id, error = %err, "Transient error during upsert");
                }
                Err(err) => return Err(StoreError::Database(err)),
            }

            if attempt >= self.retry.max_attempts {
                warn!(
                    notam_id = %notam.notam_id,
                    attempts = attempt,
                    "Giving up on upsert after repeated conflicts"
                );
                return Err(StoreError::Conflict {
                    notam_id: notam.notam_id.clone(),
                    attempts: attempt,
                });
            }

            tokio::time::sleep(self.retry.delay(attempt)).await;
        }
    }

    async fn try_upsert(&self, notam: &Notam) -> Result<Attempt, DbErr> {
        let txn = self.conn.begin().await?;

        let existing = Notams::find()
            .filter(notams::Column::NotamId.eq(notam.notam_id.as_str()))
            .one(&txn)
            .await?;

        match existing {
            None => Self::insert_new(txn, notam).await,
            Some(row) => Self::merge_existing(txn, notam, row).await,
        }
    }

    async fn insert_new(txn: DatabaseTransaction, notam: &Notam) -> Result<Attempt, DbErr> {
        let now = Utc::now();
        let model = Self::to_active_model(notam, now, now, false);

        match Notams::insert(model).exec(&txn).await {
            Ok(_) => {
                txn.commit().await?;
                Ok(Attempt::Done(UpsertOutcome::Inserted))
            }
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                txn.rollback().await?;
                debug!(notam_id = %notam.notam_id, "Insert lost race, retrying as update");
                Ok(Attempt::Conflict)
            }
            Err(err) => Err(err),
        }
    }

    async fn merge_existing(
        txn: DatabaseTransaction,
        incoming: &Notam,
        row: notams::Model,
    ) -> Result<Attempt, DbErr> {
        let row_id = row.id;
        let observed_updated_at = row.updated_at;
        let stored = Self::map_model(row);

        let mut merged = incoming.clone();
        merged.search_term = stored.search_term.clone().or(merged.search_term);
        merged.airport_name = merged.airport_name.or_else(|| stored.airport_name.clone());

        if merged.same_content(&stored) {
            txn.commit().await?;
            return Ok(Attempt::Done(UpsertOutcome::Updated { changed: false }));
        }

        let created_at = stored.created_at.unwrap_or(observed_updated_at);
        let updated_at = Utc::now().max(observed_updated_at + ChronoDuration::microseconds(1));
        let model = Self::to_active_model(&merged, created_at, updated_at, true);

        let result = Notams::update_many()
            .set(model)
            .filter(notams::Column::Id.eq(row_id))
            .filter(notams::Column::UpdatedAt.eq(observed_updated_at))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            debug!(notam_id = %incoming.notam_id, "Row changed under us, retrying");
            return Ok(Attempt::Conflict);
        }

        txn.commit().await?;
        Ok(Attempt::Done(UpsertOutcome::Updated { changed: true }))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn active_condition(now: DateTime<Utc>) -> Condition {
        Condition::all()
            .add(
                Condition::any()
                    .add(notams::Column::ValidTo.is_null())
                    .add(notams::Column::ValidTo.gte(now)),
            )
            .add(notams::Column::NotamType.ne(NotamType::Cancel.as_str()))
    }

    pub async fn get(&self, notam_id: &str) -> Result<Option<Notam>> {
        let row = Notams::find()
            .filter(notams::Column::NotamId.eq(notam_id))
            .one(&self.conn)
            .await?;

        Ok(row.map(Self::map_model))
    }

    pub async fn get_active(&self, min_score: i32) -> Result<Vec<Notam>> {
        let rows = Notams::find()
            .filter(Self::active_condition(Utc::now()))
            .filter(notams::Column::PriorityScore.gte(min_score))
            .order_by_desc(notams::Column::PriorityScore)
            .order_by_desc(notams::Column::ValidFrom)
            .all(&self.conn)
            .await?;

        Ok(rows.into_iter().map(Self::map_model).collect())
    }

    async fn get_flagged(&self, flag: notams::Column, active_only: bool) -> Result<Vec<Notam>> {
        let mut query = Notams::find().filter(flag.eq(true));
        if active_only {
            query = query.filter(Self::active_condition(Utc::now()));
        }

        let rows = query
            .order_by_desc(notams::Column::PriorityScore)
            .order_by_desc(notams::Column::ValidFrom)
            .all(&self.conn)
            .await?;

        Ok(rows.into_iter().map(Self::map_model).collect())
    }

    pub async fn get_closures(&self, active_only: bool) -> Result<Vec<Notam>> {
        self.get_flagged(notams::Column::IsClosure, active_only).await
    }

    pub async fn get_drone_notams(&self, active_only: bool) -> Result<Vec<Notam>> {
        self.get_flagged(notams::Column::IsDroneRelated, active_only)
            .await
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(Notams::find().count(&self.conn).await?)
    }

    pub async fn statistics(&self) -> Result<NotamStatistics> {
        let now = Utc::now();

        let total = Notams::find().count(&self.conn).await?;
        let active = Notams::find()
            .filter(Self::active_condition(now))
            .count(&self.conn)
            .await?;
        let drone_related = Notams::find()
            .filter(notams::Column::IsDroneRelated.eq(true))
            .count(&self.conn)
            .await?;
        let active_drone_related = Notams::find()
            .filter(Self::active_condition(now))
            .filter(notams::Column::IsDroneRelated.eq(true))
            .count(&self.conn)
            .await?;
        let active_closures = Notams::find()
            .filter(Self::active_condition(now))
            .filter(notams::Column::IsClosure.eq(true))
            .count(&self.conn)
            .await?;
        let cancelled = Notams::find()
            .filter(notams::Column::NotamType.eq(NotamType::Cancel.as_str()))
            .count(&self.conn)
            .await?;

        Ok(NotamStatistics {
            total,
            active,
            drone_related,
            active_drone_related,
            active_closures,
            cancelled,
        })
    }

    // ========================================================================
    // Retention
    // ========================================================================

    /// Deletes non-permanent rows whose end is more than `days` in the past.
    pub async fn purge_expired(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - ChronoDuration::days(days);
        let candidates = Condition::all()
            .add(notams::Column::IsPermanent.eq(false))
            .add(notams::Column::ValidTo.is_not_null())
            .add(notams::Column::ValidTo.lt(cutoff));

        let removed = self.purge(candidates).await?;
        info!(days, removed, "Purged expired NOTAMs");
        Ok(removed)
    }

    /// Deletes cancellations not touched for more than `days`.
    pub async fn purge_cancelled(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - ChronoDuration::days(days);
        let candidates = Condition::all()
            .add(notams::Column::NotamType.eq(NotamType::Cancel.as_str()))
            .add(notams::Column::UpdatedAt.lt(cutoff));

        let removed = self.purge(candidates).await?;
        info!(days, removed, "Purged cancelled NOTAMs");
        Ok(removed)
    }

    /// Deletes the rows matching `candidates`, except those still referenced
    /// through `replaces_notam_id` / `cancels_notam_id` by a row that
    /// survives this pass. Sparing a row can in turn spare the rows it
    /// references, so the survivor set is grown to a fixpoint first.
    async fn purge(&self, candidates: Condition) -> Result<u64> {
        let txn = self.conn.begin().await?;

        let rows: Vec<(i32, String)> = Notams::find()
            .select_only()
            .column(notams::Column::Id)
            .column(notams::Column::NotamId)
            .filter(candidates)
            .into_tuple()
            .all(&txn)
            .await?;

        if rows.is_empty() {
            txn.commit().await?;
            return Ok(0);
        }

        let mut doomed: HashMap<String, i32> = rows.into_iter().map(|(id, nid)| (nid, id)).collect();

        let references: Vec<(String, Option<String>, Option<String>)> = Notams::find()
            .select_only()
            .column(notams::Column::NotamId)
            .column(notams::Column::ReplacesNotamId)
            .column(notams::Column::CancelsNotamId)
            .filter(
                Condition::any()
                    .add(notams::Column::ReplacesNotamId.is_not_null())
                    .add(notams::Column::CancelsNotamId.is_not_null()),
            )
            .into_tuple()
            .all(&txn)
            .await?;

        let spared = spare_referenced(&mut doomed, &references);
        if spared > 0 {
            debug!(spared, "Kept purge candidates still referenced by surviving rows");
        }

        let ids: Vec<i32> = doomed.into_values().collect();
        let mut removed = 0;
        for chunk in ids.chunks(PURGE_CHUNK) {
            let result = Notams::delete_many()
                .filter(notams::Column::Id.is_in(chunk.to_vec()))
                .exec(&txn)
                .await?;
            removed += result.rows_affected;
        }

        txn.commit().await?;
        Ok(removed)
    }
}

/// Removes from `doomed` every entry referenced by a row outside it, until
/// nothing changes. Returns how many entries were spared.
fn spare_referenced(
    doomed: &mut HashMap<String, i32>,
    references: &[(String, Option<String>, Option<String>)],
) -> usize {
    let mut spared: HashSet<String> = HashSet::new();

    loop {
        let mut changed = false;
        for (holder, replaces, cancels) in references {
            if doomed.contains_key(holder) {
                continue;
            }
            for target in [replaces, cancels].into_iter().flatten() {
                if doomed.remove(target).is_some() {
                    spared.insert(target.clone());
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    spared.len()
}

fn is_transient(err: &DbErr) -> bool {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }
    let message = err.to_string().to_lowercase();
    message.contains("database is locked") || message.contains("busy")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(rows: &[(&str, Option<&str>, Option<&str>)]) -> Vec<(String, Option<String>, Option<String>)> {
        rows.iter()
            .map(|(h, r, c)| ((*h).to_string(), r.map(str::to_string), c.map(str::to_string)))
            .collect()
    }

    #[test]
    fn survivors_keep_their_references() {
        let mut doomed: HashMap<String, i32> =
            [("A1/25".to_string(), 1), ("A2/25".to_string(), 2)].into_iter().collect();
        let references = refs(&[("A3/25", Some("A1/25"), None)]);

        assert_eq!(spare_referenced(&mut doomed, &references), 1);
        assert!(!doomed.contains_key("A1/25"));
        assert!(doomed.contains_key("A2/25"));
    }

    #[test]
    fn sparing_is_transitive() {
        // A3 survives and replaces A2, which replaced A1. Both candidates stay.
        let mut doomed: HashMap<String, i32> =
            [("A1/25".to_string(), 1), ("A2/25".to_string(), 2)].into_iter().collect();
        let references = refs(&[
            ("A2/25", Some("A1/25"), None),
            ("A3/25", Some("A2/25"), None),
        ]);

        assert_eq!(spare_referenced(&mut doomed, &references), 2);
        assert!(doomed.is_empty());
    }

    #[test]
    fn references_between_doomed_rows_do_not_spare() {
        let mut doomed: HashMap<String, i32> =
            [("A1/25".to_string(), 1), ("C2/25".to_string(), 2)].into_iter().collect();
        let references = refs(&[("C2/25", None, Some("A1/25"))]);

        assert_eq!(spare_referenced(&mut doomed, &references), 0);
        assert_eq!(doomed.len(), 2);
    }

    #[test]
    fn retry_delay_grows_with_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        };
        let first = policy.delay(1);
        let third = policy.delay(3);
        assert!(first >= Duration::from_millis(10) && first <= Duration::from_millis(15));
        assert!(third >= Duration::from_millis(30) && third <= Duration::from_millis(45));
    }
}
