use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "search_runs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub search_term: Option<String>,
    pub airport_codes: Option<String>,
    pub mode: String,
    pub total_fetched: i32,
    pub new_inserted: i32,
    pub updated: i32,
    pub failed: i32,
    pub run_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
