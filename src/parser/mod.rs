pub mod datetime;
pub mod notam;
pub mod taxonomy;

use regex::Regex;
use std::sync::OnceLock;

pub use notam::{ParseError, ParseErrorReason, ParsedNotam, parse_notam};

pub(crate) fn get_regex(re: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    re.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}
