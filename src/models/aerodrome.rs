use serde::{Deserialize, Serialize};

/// Source tag of aerodrome rows created from NOTAM data rather than loaded
/// from a reference dataset.
pub const INFERRED_SOURCE: &str = "notam_inference";

/// Reference data for one aerodrome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirportInfo {
    pub icao_code: String,
    pub iata_code: Option<String>,
    pub name: Option<String>,
    pub kind: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation_ft: Option<i32>,
    pub continent: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub region: Option<String>,
    pub municipality: Option<String>,
    pub gps_code: Option<String>,
    pub source: Option<String>,
}

impl AirportInfo {
    #[must_use]
    pub fn is_inferred(&self) -> bool {
        self.source.as_deref() == Some(INFERRED_SOURCE)
    }
}

/// Read access to aerodrome reference data. A missing aerodrome is `None`,
/// not an error.
#[async_trait::async_trait]
pub trait AerodromeLookup: Send + Sync {
    async fn lookup(&self, icao_code: &str) -> anyhow::Result<Option<AirportInfo>>;
}
