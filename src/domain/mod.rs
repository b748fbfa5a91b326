//! Domain primitives shared by the parser, the store and the alerting path.
//!
//! These are small value types that keep string-typed columns and
//! configuration out of the core logic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique business key of a NOTAM, e.g. `A3097/25`.
///
/// Wraps the raw identifier so it is not mixed up with airport codes or
/// replaced/cancelled references when passed around.
///
/// # Examples
///
/// ```rust
/// use notamwatch::domain::NotamId;
///
/// let id = NotamId::new("A3097/25");
/// assert_eq!(id.as_str(), "A3097/25");
/// assert_eq!(id.to_string(), "A3097/25");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotamId(String);

impl NotamId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NotamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotamId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NotamId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// NOTAM kind, taken from the `NOTAMN` / `NOTAMR` / `NOTAMC` header suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotamType {
    #[default]
    New,
    Replace,
    Cancel,
}

impl NotamType {
    /// Column representation used by the store.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Replace => "REPLACE",
            Self::Cancel => "CANCEL",
        }
    }

    /// Maps the header suffix letter (`N`, `R`, `C`).
    #[must_use]
    pub const fn from_suffix(suffix: char) -> Option<Self> {
        match suffix {
            'N' => Some(Self::New),
            'R' => Some(Self::Replace),
            'C' => Some(Self::Cancel),
            _ => None,
        }
    }
}

impl fmt::Display for NotamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "REPLACE" => Ok(Self::Replace),
            "CANCEL" => Ok(Self::Cancel),
            other => Err(format!("unknown NOTAM type: {other}")),
        }
    }
}

/// How a polling cycle discovered its messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Airport,
    FreeText,
}

impl SearchMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Airport => "airport",
            Self::FreeText => "free_text",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "airport" => Ok(Self::Airport),
            "free_text" => Ok(Self::FreeText),
            other => Err(format!("unknown search mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notam_type_round_trips_through_column_text() {
        for kind in [NotamType::New, NotamType::Replace, NotamType::Cancel] {
            assert_eq!(kind.as_str().parse::<NotamType>().unwrap(), kind);
        }
        assert!("EXPIRED".parse::<NotamType>().is_err());
    }

    #[test]
    fn notam_type_from_header_suffix() {
        assert_eq!(NotamType::from_suffix('N'), Some(NotamType::New));
        assert_eq!(NotamType::from_suffix('R'), Some(NotamType::Replace));
        assert_eq!(NotamType::from_suffix('C'), Some(NotamType::Cancel));
        assert_eq!(NotamType::from_suffix('X'), None);
    }

    #[test]
    fn search_mode_parses_column_text() {
        assert_eq!("free_text".parse::<SearchMode>(), Ok(SearchMode::FreeText));
        assert_eq!(SearchMode::Airport.to_string(), "airport");
    }
}
