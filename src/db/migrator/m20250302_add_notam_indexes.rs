use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const INDEXES: &[(&str, &str)] = &[
    ("idx_notams_airport_code", "notams(airport_code)"),
    ("idx_notams_valid_to", "notams(valid_to)"),
    ("idx_notams_priority_score", "notams(priority_score)"),
    ("idx_notams_drone", "notams(is_drone_related)"),
    ("idx_notams_closure", "notams(is_closure)"),
    ("idx_notams_type_updated", "notams(notam_type, updated_at)"),
    ("idx_search_runs_run_at", "search_runs(run_at)"),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();

        for (name, target) in INDEXES {
            conn.execute_unprepared(&format!("CREATE INDEX IF NOT EXISTS {name} ON {target}"))
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();

        for (name, _) in INDEXES {
            conn.execute_unprepared(&format!("DROP INDEX IF EXISTS {name}"))
                .await?;
        }

        Ok(())
    }
}
