use crate::entities::{aerodromes, prelude::*};
use crate::models::Notam;
use crate::models::aerodrome::{AirportInfo, INFERRED_SOURCE};
use anyhow::Result;
use chrono::Utc;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use tracing::debug;

/// Repository for aerodrome reference rows
pub struct AerodromeRepository {
    conn: DatabaseConnection,
}

impl AerodromeRepository {
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(row: aerodromes::Model) -> AirportInfo {
        AirportInfo {
            icao_code: row.icao_code,
            iata_code: row.iata_code,
            name: row.name,
            kind: row.kind,
            latitude: row.latitude,
            longitude: row.longitude,
            elevation_ft: row.elevation_ft,
            continent: row.continent,
            country_code: row.country_code,
            country_name: row.country_name,
            region: row.region,
            municipality: row.municipality,
            gps_code: row.gps_code,
            source: row.source,
        }
    }

    pub async fn get(&self, icao_code: &str) -> Result<Option<AirportInfo>> {
        let code = icao_code.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Ok(None);
        }

        let row = Aerodromes::find_by_id(code).one(&self.conn).await?;
        Ok(row.map(Self::map_model))
    }

    /// Inserts or replaces a reference row.
    pub async fn save(&self, info: &AirportInfo) -> Result<()> {
        let now = Utc::now();
        let model = aerodromes::ActiveModel {
            icao_code: Set(info.icao_code.trim().to_ascii_uppercase()),
            iata_code: Set(info.iata_code.clone()),
            name: Set(info.name.clone()),
            kind: Set(info.kind.clone()),
            latitude: Set(info.latitude),
            longitude: Set(info.longitude),
            elevation_ft: Set(info.elevation_ft),
            continent: Set(info.continent.clone()),
            country_code: Set(info.country_code.clone()),
            country_name: Set(info.country_name.clone()),
            region: Set(info.region.clone()),
            municipality: Set(info.municipality.clone()),
            gps_code: Set(info.gps_code.clone()),
            source: Set(info.source.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Aerodromes::insert(model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(aerodromes::Column::IcaoCode)
                    .update_columns([
                        aerodromes::Column::IataCode,
                        aerodromes::Column::Name,
                        aerodromes::Column::Kind,
                        aerodromes::Column::Latitude,
                        aerodromes::Column::Longitude,
                        aerodromes::Column::ElevationFt,
                        aerodromes::Column::Continent,
                        aerodromes::Column::CountryCode,
                        aerodromes::Column::CountryName,
                        aerodromes::Column::Region,
                        aerodromes::Column::Municipality,
                        aerodromes::Column::GpsCode,
                        aerodromes::Column::Source,
                        aerodromes::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await?;

        Ok(())
    }

    /// Records a minimal row for an airport only known from NOTAM traffic.
    /// Existing rows are left alone. Returns whether a row was created.
    pub async fn infer_from_notam(&self, notam: &Notam) -> Result<bool> {
        let Some(code) = notam
            .airport_code
            .as_deref()
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
        else {
            return Ok(false);
        };

        let now = Utc::now();
        let model = aerodromes::ActiveModel {
            icao_code: Set(code.clone()),
            name: Set(notam.airport_name.clone()),
            source: Set(Some(INFERRED_SOURCE.to_string())),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let inserted = Aerodromes::insert(model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(aerodromes::Column::IcaoCode)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await?;

        if inserted > 0 {
            debug!(icao_code = %code, "Inferred aerodrome from NOTAM");
        }
        Ok(inserted > 0)
    }
}
