pub mod aerodrome;
pub mod notam;
pub mod search_run;
