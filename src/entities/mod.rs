pub mod prelude;

pub mod aerodromes;
pub mod notams;
pub mod search_runs;
