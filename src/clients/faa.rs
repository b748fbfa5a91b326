use crate::config::SourceConfig;
use crate::domain::SearchMode;
use crate::models::Provenance;
use crate::parser::datetime::parse_faa_date;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_API_URL: &str = "https://notams.aim.faa.gov/notamSearch/search";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request for {target} failed: {source}")]
    Http {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Upstream returned HTTP {status} for {target}")]
    Status { target: String, status: u16 },

    #[error("Malformed response for {target}: {reason}")]
    Malformed { target: String, reason: String },

    #[error("Invalid API URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Fetch cancelled by shutdown")]
    Cancelled,
}

/// One message as returned by the search endpoint, with its envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNotam {
    #[serde(default)]
    pub facility_designator: Option<String>,
    #[serde(default)]
    pub notam_number: Option<String>,
    #[serde(default)]
    pub airport_name: Option<String>,
    #[serde(default)]
    pub issue_date: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub icao_message: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(rename = "transactionID", default, deserialize_with = "lenient_i64")]
    pub transaction_id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_history: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cancelled_or_expired: bool,
    #[serde(default)]
    pub status: Option<String>,
    /// Free-text term this message was found with. Not part of the payload.
    #[serde(skip)]
    pub search_term: Option<String>,
}

impl RawNotam {
    /// Envelopes already flagged as cancelled or expired upstream are not
    /// worth parsing.
    #[must_use]
    pub fn is_cancelled_or_expired(&self) -> bool {
        self.cancelled_or_expired
            || self
                .status
                .as_deref()
                .is_some_and(|s| s.trim().eq_ignore_ascii_case("expired"))
    }

    #[must_use]
    pub fn provenance(&self) -> Provenance {
        Provenance {
            airport_code: self
                .facility_designator
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_ascii_uppercase),
            airport_name: self.airport_name.clone(),
            issue_date: self.issue_date.as_deref().and_then(parse_faa_date),
            source: self.source.clone(),
            source_type: self.source_type.clone(),
            transaction_id: self.transaction_id,
            search_term: self.search_term.clone(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    List(Vec<RawNotam>),
    Wrapped(WrappedResponse),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WrappedResponse {
    #[serde(default)]
    notam_list: Option<Vec<RawNotam>>,
    #[serde(default)]
    items: Option<Vec<RawNotam>>,
    #[serde(default)]
    data: Option<Vec<RawNotam>>,
    #[serde(default)]
    notams: Option<Vec<RawNotam>>,
}

/// Decodes a search response: either a bare list or an object wrapping the
/// list under `notamList`, `items`, `data` or `notams`.
pub fn parse_response(body: &str) -> Result<Vec<RawNotam>, serde_json::Error> {
    Ok(match serde_json::from_str::<SearchResponse>(body)? {
        SearchResponse::List(items) => items,
        SearchResponse::Wrapped(wrapped) => wrapped
            .notam_list
            .or(wrapped.items)
            .or(wrapped.data)
            .or(wrapped.notams)
            .unwrap_or_default(),
    })
}

/// What a client polls and how it authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotamSource {
    /// Public FAA endpoint, one request per ICAO designator.
    Airport { airports: Vec<String> },
    /// Public FAA endpoint, free-form text search per term.
    FreeText { terms: Vec<String> },
    /// Token-authenticated endpoint, one request per ICAO designator.
    Authenticated {
        airports: Vec<String>,
        api_key: String,
    },
}

impl NotamSource {
    /// Airport-scoped source for the configured designators, authenticated
    /// when an API key is set. `None` when no airports are configured.
    #[must_use]
    pub fn for_airports(config: &SourceConfig) -> Option<Self> {
        let airports: Vec<String> = config
            .airports
            .iter()
            .map(|a| a.trim().to_ascii_uppercase())
            .filter(|a| !a.is_empty())
            .collect();
        if airports.is_empty() {
            return None;
        }

        let api_key = config.api_key.trim();
        Some(if api_key.is_empty() {
            Self::Airport { airports }
        } else {
            Self::Authenticated {
                airports,
                api_key: api_key.to_string(),
            }
        })
    }

    #[must_use]
    pub fn for_search_terms(config: &SourceConfig) -> Option<Self> {
        let terms: Vec<String> = config
            .search_terms
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        (!terms.is_empty()).then_some(Self::FreeText { terms })
    }

    #[must_use]
    pub const fn mode(&self) -> SearchMode {
        match self {
            Self::Airport { .. } | Self::Authenticated { .. } => SearchMode::Airport,
            Self::FreeText { .. } => SearchMode::FreeText,
        }
    }

    /// Designators or terms this source polls.
    #[must_use]
    pub fn targets(&self) -> &[String] {
        match self {
            Self::Airport { airports } | Self::Authenticated { airports, .. } => airports,
            Self::FreeText { terms } => terms,
        }
    }
}

/// Messages fetched in one cycle.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    pub messages: Vec<RawNotam>,
    /// Opaque identifier of this fetch, for correlating logs.
    pub transaction_id: String,
}

impl FetchBatch {
    #[must_use]
    pub fn total_fetched(&self) -> usize {
        self.messages.len()
    }
}

#[async_trait::async_trait]
pub trait FetchSource: Send + Sync {
    fn mode(&self) -> SearchMode;

    /// Comma separated targets, recorded with each search run.
    fn describe(&self) -> String;

    /// Fetches every target once. A failed request fails the whole batch.
    /// Shutdown is checked before each request.
    async fn fetch(&self, shutdown: watch::Receiver<bool>) -> Result<FetchBatch, FetchError>;
}

pub struct FaaClient {
    client: Client,
    api_url: String,
    source: NotamSource,
    min_delay: Duration,
    max_delay: Duration,
}

impl FaaClient {
    pub fn new(source: NotamSource, config: &SourceConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;

        let min_delay = Duration::from_secs_f64(config.min_request_delay_seconds.max(0.0));
        let max_delay =
            Duration::from_secs_f64(config.max_request_delay_seconds.max(0.0)).max(min_delay);

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            source,
            min_delay,
            max_delay,
        })
    }

    #[must_use]
    pub const fn source(&self) -> &NotamSource {
        &self.source
    }

    fn random_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let secs = rand::rng()
            .random_range(self.min_delay.as_secs_f64()..=self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Lookup URL for one designator on the token-authenticated endpoint.
    fn authenticated_url(&self, target: &str) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.api_url).map_err(|source| FetchError::InvalidUrl {
            url: self.api_url.clone(),
            source,
        })?;
        url.query_pairs_mut()
            .append_pair("locations", target)
            .append_pair("icao", target)
            .append_pair("format", "json");
        Ok(url)
    }

    async fn request(&self, target: &str) -> Result<Vec<RawNotam>, FetchError> {
        let request = match &self.source {
            NotamSource::Airport { .. } => self
                .client
                .post(&self.api_url)
                .header("Accept", "application/json, text/javascript, */*; q=0.01")
                .header("X-Requested-With", "XMLHttpRequest")
                .form(&[
                    ("searchType", "0"),
                    ("designatorsForLocation", target),
                    ("notamsOnly", "true"),
                    ("latLong", ""),
                    ("radius", "10"),
                ]),
            NotamSource::FreeText { .. } => self
                .client
                .post(&self.api_url)
                .header("Accept", "application/json, text/javascript, */*; q=0.01")
                .header("X-Requested-With", "XMLHttpRequest")
                .form(&[
                    ("searchType", "4"),
                    ("freeFormText", target),
                    ("notamsOnly", "true"),
                ]),
            NotamSource::Authenticated { api_key, .. } => self
                .client
                .get(self.authenticated_url(target)?)
                .bearer_auth(api_key)
                .header("Accept", "application/json"),
        };

        let response = request.send().await.map_err(|source| FetchError::Http {
            target: target.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 429 {
                warn!(query = target, "Rate limited by upstream, consider longer request delays");
            }
            return Err(FetchError::Status {
                target: target.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| FetchError::Http {
            target: target.to_string(),
            source,
        })?;

        parse_response(&body).map_err(|e| FetchError::Malformed {
            target: target.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl FetchSource for FaaClient {
    fn mode(&self) -> SearchMode {
        self.source.mode()
    }

    fn describe(&self) -> String {
        self.source.targets().join(",")
    }

    async fn fetch(&self, mut shutdown: watch::Receiver<bool>) -> Result<FetchBatch, FetchError> {
        let targets = self.source.targets();
        let transaction_id = uuid::Uuid::new_v4().to_string();
        let mut messages = Vec::new();

        info!(
            mode = %self.mode(),
            targets = targets.len(),
            transaction_id = %transaction_id,
            "Fetching NOTAMs"
        );

        for (idx, target) in targets.iter().enumerate() {
            if *shutdown.borrow() {
                return Err(FetchError::Cancelled);
            }

            let mut found = self.request(target).await?;
            debug!(
                query = %target,
                count = found.len(),
                "[{}/{}] Retrieved NOTAMs",
                idx + 1,
                targets.len()
            );

            if matches!(self.source, NotamSource::FreeText { .. }) {
                for raw in &mut found {
                    raw.search_term = Some(target.clone());
                }
            }
            messages.extend(found);

            if idx + 1 < targets.len() {
                let delay = self.random_delay();
                debug!("Waiting {:.2}s before next request", delay.as_secs_f64());
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => return Err(FetchError::Cancelled),
                }
            }
        }

        metrics::counter!("notams_fetched_total", "mode" => self.mode().as_str())
            .increment(messages.len() as u64);

        Ok(FetchBatch {
            messages,
            transaction_id,
        })
    }
}
