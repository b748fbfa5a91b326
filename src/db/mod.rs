use crate::models::{AerodromeLookup, AirportInfo, Notam, SearchRun};
use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::notam::{NotamStatistics, RetryPolicy, StoreError, UpsertOutcome};

/// Persistent store shared by every polling loop. Cheap to clone; clones
/// share one connection pool.
#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
    retry: RetryPolicy,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1, RetryPolicy::default()).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
        retry: RetryPolicy,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");
        if !in_memory {
            let path_str = db_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        if !in_memory {
            // Shared with other monitor processes.
            conn.execute_unprepared("PRAGMA journal_mode=WAL").await?;
        }

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn, retry })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn notam_repo(&self) -> repositories::notam::NotamRepository {
        repositories::notam::NotamRepository::new(self.conn.clone(), self.retry)
    }

    fn search_run_repo(&self) -> repositories::search_run::SearchRunRepository {
        repositories::search_run::SearchRunRepository::new(self.conn.clone())
    }

    fn aerodrome_repo(&self) -> repositories::aerodrome::AerodromeRepository {
        repositories::aerodrome::AerodromeRepository::new(self.conn.clone())
    }

    // ========================================================================
    // NOTAMs
    // ========================================================================

    pub async fn upsert(&self, notam: &Notam) -> Result<UpsertOutcome, StoreError> {
        self.notam_repo().upsert(notam).await
    }

    pub async fn get_notam(&self, notam_id: &str) -> Result<Option<Notam>> {
        self.notam_repo().get(notam_id).await
    }

    pub async fn get_active_notams(&self, min_score: i32) -> Result<Vec<Notam>> {
        self.notam_repo().get_active(min_score).await
    }

    pub async fn get_closures(&self, active_only: bool) -> Result<Vec<Notam>> {
        self.notam_repo().get_closures(active_only).await
    }

    pub async fn get_drone_notams(&self, active_only: bool) -> Result<Vec<Notam>> {
        self.notam_repo().get_drone_notams(active_only).await
    }

    pub async fn count_notams(&self) -> Result<u64> {
        self.notam_repo().count().await
    }

    pub async fn get_statistics(&self) -> Result<NotamStatistics> {
        self.notam_repo().statistics().await
    }

    pub async fn purge_expired(&self, days: i64) -> Result<u64> {
        self.notam_repo().purge_expired(days).await
    }

    pub async fn purge_cancelled(&self, days: i64) -> Result<u64> {
        self.notam_repo().purge_cancelled(days).await
    }

    // ========================================================================
    // Search runs
    // ========================================================================

    pub async fn record_search_run(&self, run: &SearchRun) -> Result<i32> {
        self.search_run_repo().record(run).await
    }

    pub async fn recent_search_runs(&self, limit: u64) -> Result<Vec<SearchRun>> {
        self.search_run_repo().recent(limit).await
    }

    // ========================================================================
    // Aerodromes
    // ========================================================================

    pub async fn get_aerodrome(&self, icao_code: &str) -> Result<Option<AirportInfo>> {
        self.aerodrome_repo().get(icao_code).await
    }

    pub async fn save_aerodrome(&self, info: &AirportInfo) -> Result<()> {
        self.aerodrome_repo().save(info).await
    }

    pub async fn infer_aerodrome(&self, notam: &Notam) -> Result<bool> {
        self.aerodrome_repo().infer_from_notam(notam).await
    }
}

#[async_trait::async_trait]
impl AerodromeLookup for Store {
    async fn lookup(&self, icao_code: &str) -> Result<Option<AirportInfo>> {
        self.get_aerodrome(icao_code).await
    }
}
