use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notams")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub notam_id: String,
    pub series: String,
    pub number: i32,
    pub year: i32,
    pub notam_type: String,
    pub replaces_notam_id: Option<String>,
    pub cancels_notam_id: Option<String>,

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

    pub valid_from: Option<DateTimeUtc>,
    pub valid_to: Option<DateTimeUtc>,
    pub is_permanent: bool,
    pub schedule: Option<String>,
    pub issue_date: Option<DateTimeUtc>,

    #[sea_orm(column_type = "Text")]
    pub body: String,
    #[sea_orm(column_type = "Text")]
    pub raw_icao_message: String,

    pub is_closure: bool,
    pub is_drone_related: bool,
    pub is_restriction: bool,
    pub is_trigger_notam: bool,
    pub priority_score: i32,

    pub source: Option<String>,
    pub source_type: Option<String>,
    pub search_term: Option<String>,
    pub transaction_id: Option<i64>,
    pub has_history: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
