pub use super::aerodromes::Entity as Aerodromes;
pub use super::notams::Entity as Notams;
pub use super::search_runs::Entity as SearchRuns;
