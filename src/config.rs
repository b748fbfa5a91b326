use crate::clients::faa::DEFAULT_API_URL;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub source: SourceConfig,

    pub scheduler: SchedulerConfig,

    pub scoring: ScoringConfig,

    pub alerts: AlertsConfig,

    pub retention: RetentionConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,

    /// Attempts per NOTAM before an upsert is reported as a conflict.
    pub upsert_max_attempts: u32,

    /// Base backoff between upsert attempts; jittered and grown per attempt.
    pub upsert_retry_backoff_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/notamwatch.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
            upsert_max_attempts: 5,
            upsert_retry_backoff_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub api_url: String,

    /// Bearer token. Empty selects the public search endpoint.
    pub api_key: String,

    /// ICAO codes polled in airport mode.
    pub airports: Vec<String>,

    /// Phrases polled in free-text mode.
    pub search_terms: Vec<String>,

    pub min_request_delay_seconds: f64,

    pub max_request_delay_seconds: f64,

    pub request_timeout_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            airports: Vec::new(),
            search_terms: Vec::new(),
            min_request_delay_seconds: 2.0,
            max_request_delay_seconds: 5.0,
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    pub check_interval_minutes: u32,

    /// Overrides the interval when set (6-field cron, seconds first).
    pub cron_expression: Option<String>,

    pub purge_interval_hours: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_minutes: 60,
            cron_expression: None,
            purge_interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub closure_score: i32,

    pub drone_score: i32,

    pub restriction_score: i32,

    /// Whole-word matches; a trailing `-` turns a keyword into a prefix.
    pub drone_keywords: Vec<String>,

    /// Substring matches against the body.
    pub closure_keywords: Vec<String>,

    /// Substring matches against the body.
    pub restriction_keywords: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            closure_score: 50,
            drone_score: 30,
            restriction_score: 20,
            drone_keywords: words(&["drone", "uas", "unmanned", "rpas"]),
            closure_keywords: words(&[
                "closed",
                "clsd",
                "closure",
                "not avbl",
                "unavailable",
                "suspended",
                "ad clsd",
                "airport closed",
                "rwy closed",
                "runway closed",
            ]),
            restriction_keywords: words(&[
                "restricted area",
                "prohibited area",
                "danger area",
                "temporary restricted",
                "activated",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// ntfy topic URL. Empty disables alerting.
    pub ntfy_url: String,

    pub digest_interval_seconds: u64,

    pub min_score: i32,

    pub max_digest_items: usize,

    /// Undeliverable items older than this are dropped.
    pub max_retention_hours: u64,

    pub priority: String,

    pub tags: Vec<String>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            ntfy_url: String::new(),
            digest_interval_seconds: 3600,
            min_score: 80,
            max_digest_items: 10,
            max_retention_hours: 24,
            priority: "default".to_string(),
            tags: vec!["bell".to_string()],
        }
    }
}

impl AlertsConfig {
    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.ntfy_url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub purge_expired_after_days: i64,

    pub purge_cancelled_after_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            purge_expired_after_days: 30,
            purge_cancelled_after_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub metrics_port: u16,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "notamwatch".to_string());

        Self {
            metrics_enabled: false,
            metrics_port: 9464,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid value for {key} ({value}): {e}"))
}

impl Config {
    /// Loads the first config file found, then applies `.env` and
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Overrides file values with the deployment environment variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("DATABASE_PATH") {
            self.general.database_path = if v.starts_with("sqlite:") {
                v
            } else {
                format!("sqlite:{v}")
            };
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.general.log_level = v.trim().to_lowercase();
        }
        if let Some(v) = lookup("NOTAM_API_URL") {
            self.source.api_url = v.trim().to_string();
        }
        if let Some(v) = lookup("NOTAM_API_KEY") {
            self.source.api_key = v.trim().to_string();
        }
        if let Some(v) = lookup("AIRPORTS") {
            self.source.airports = split_list(&v);
        }
        if let Some(v) = lookup("SEARCH_TERMS") {
            self.source.search_terms = split_list(&v);
        }
        if let Some(v) = lookup("DRONE_KEYWORDS") {
            self.scoring.drone_keywords = split_list(&v);
        }
        if let Some(v) = lookup("NTFY_URL") {
            self.alerts.ntfy_url = v.trim().to_string();
        }
        if let Some(v) = lookup("NTFY_MIN_SCORE") {
            self.alerts.min_score = parse_env("NTFY_MIN_SCORE", &v)?;
        }
        if let Some(v) = lookup("NTFY_DIGEST_INTERVAL") {
            self.alerts.digest_interval_seconds = parse_env("NTFY_DIGEST_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("NTFY_MAX_DIGEST_ITEMS") {
            self.alerts.max_digest_items = parse_env("NTFY_MAX_DIGEST_ITEMS", &v)?;
        }
        if let Some(v) = lookup("UPDATE_INTERVAL_SECONDS") {
            let seconds: u32 = parse_env("UPDATE_INTERVAL_SECONDS", &v)?;
            self.scheduler.check_interval_minutes = seconds.div_ceil(60);
        }
        Ok(())
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("notamwatch").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".notamwatch").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.airports.is_empty() && self.source.search_terms.is_empty() {
            anyhow::bail!("Either source.airports or source.search_terms must be configured");
        }

        if self.source.api_url.trim().is_empty() {
            anyhow::bail!("source.api_url cannot be empty");
        }

        if self.source.min_request_delay_seconds > self.source.max_request_delay_seconds {
            anyhow::bail!("source.min_request_delay_seconds exceeds max_request_delay_seconds");
        }

        if self.scheduler.enabled
            && self.scheduler.check_interval_minutes == 0
            && self.scheduler.cron_expression.is_none()
        {
            anyhow::bail!("Scheduler interval must be > 0 or cron expression must be set");
        }

        if self.alerts.enabled() && self.alerts.digest_interval_seconds == 0 {
            anyhow::bail!("alerts.digest_interval_seconds must be > 0 when ntfy_url is set");
        }

        if self.general.upsert_max_attempts == 0 {
            anyhow::bail!("general.upsert_max_attempts must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn with_airport() -> Config {
        let mut config = Config::default();
        config.source.airports = vec!["EKCH".to_string()];
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scheduler.check_interval_minutes, 60);
        assert_eq!(config.alerts.min_score, 80);
        assert_eq!(config.retention.purge_expired_after_days, 30);
        assert_eq!(config.retention.purge_cancelled_after_days, 7);
        assert!(!config.alerts.enabled());
        assert_eq!(config.source.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[source]"));
        assert!(toml_str.contains("[scoring]"));
        assert!(toml_str.contains("[alerts]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [source]
            airports = ["EKCH", "ESSA"]

            [alerts]
            ntfy_url = "https://ntfy.sh/notams"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.source.airports, vec!["EKCH", "ESSA"]);
        assert!(config.alerts.enabled());

        assert_eq!(config.scoring.drone_score, 30);
        assert_eq!(config.source.request_timeout_seconds, 30);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("AIRPORTS", "EKCH, ESSA,,"),
            ("SEARCH_TERMS", "drone"),
            ("DATABASE_PATH", "/tmp/notams.db"),
            ("NTFY_MIN_SCORE", "60"),
            ("UPDATE_INTERVAL_SECONDS", "90"),
        ]);
        let mut config = Config::default();
        config
            .apply_env(|k| env.get(k).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.source.airports, vec!["EKCH", "ESSA"]);
        assert_eq!(config.source.search_terms, vec!["drone"]);
        assert_eq!(config.general.database_path, "sqlite:/tmp/notams.db");
        assert_eq!(config.alerts.min_score, 60);
        assert_eq!(config.scheduler.check_interval_minutes, 2);
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let mut config = Config::default();
        let err = config
            .apply_env(|k| (k == "NTFY_MIN_SCORE").then(|| "high".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("NTFY_MIN_SCORE"));
    }

    #[test]
    fn test_validation() {
        assert!(Config::default().validate().is_err());
        assert!(with_airport().validate().is_ok());

        let mut config = with_airport();
        config.source.min_request_delay_seconds = 10.0;
        assert!(config.validate().is_err());

        let mut config = with_airport();
        config.scheduler.check_interval_minutes = 0;
        assert!(config.validate().is_err());
        config.scheduler.cron_expression = Some("0 0 * * * *".to_string());
        assert!(config.validate().is_ok());

        let mut config = with_airport();
        config.alerts.ntfy_url = "https://ntfy.sh/x".to_string();
        config.alerts.digest_interval_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = with_airport();
        config.general.upsert_max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
