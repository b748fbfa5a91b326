pub mod aerodrome;
pub mod classification;
pub mod notam;
pub mod search_run;

pub use aerodrome::{AerodromeLookup, AirportInfo};
pub use classification::{Classification, Classifier};
pub use notam::{Notam, Provenance};
pub use search_run::SearchRun;
