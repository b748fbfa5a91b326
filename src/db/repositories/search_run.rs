use crate::entities::{prelude::*, search_runs};
use crate::models::SearchRun;
use anyhow::Result;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, QuerySelect, Set};

/// Repository for polling-cycle audit rows
pub struct SearchRunRepository {
    conn: DatabaseConnection,
}

impl SearchRunRepository {
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(row: search_runs::Model) -> SearchRun {
        SearchRun {
            id: Some(row.id),
            mode: row.mode.parse().unwrap_or(crate::domain::SearchMode::Airport),
            search_term: row.search_term,
            airport_codes: row.airport_codes,
            total_fetched: row.total_fetched,
            new_inserted: row.new_inserted,
            updated: row.updated,
            failed: row.failed,
            run_at: row.run_at,
        }
    }

    pub async fn record(&self, run: &SearchRun) -> Result<i32> {
        let model = search_runs::ActiveModel {
            search_term: Set(run.search_term.clone()),
            airport_codes: Set(run.airport_codes.clone()),
            mode: Set(run.mode.as_str().to_string()),
            total_fetched: Set(run.total_fetched),
            new_inserted: Set(run.new_inserted),
            updated: Set(run.updated),
            failed: Set(run.failed),
            run_at: Set(run.run_at),
            ..Default::default()
        };

        let res = SearchRuns::insert(model).exec(&self.conn).await?;
        Ok(res.last_insert_id)
    }

    pub async fn recent(&self, limit: u64) -> Result<Vec<SearchRun>> {
        let rows = SearchRuns::find()
            .order_by_desc(search_runs::Column::RunAt)
            .order_by_desc(search_runs::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await?;

        Ok(rows.into_iter().map(Self::map_model).collect())
    }
}
