use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::clients::faa::{FaaClient, FetchSource, NotamSource};
use crate::clients::ntfy::NtfySink;
use crate::config::Config;
use crate::db::{RetryPolicy, Store};
use crate::models::Classifier;
use crate::scheduler::Scheduler;
use crate::services::{DigestConfig, Digester, Monitor};

/// Everything a running process shares: one store, one classifier, at most
/// one digester, and a monitor per configured source mode.
#[derive(Clone)]
pub struct SharedState {
    pub config: Config,

    pub store: Store,

    pub classifier: Arc<Classifier>,

    pub digester: Option<Arc<Digester>>,

    pub monitors: Vec<Arc<Monitor>>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let retry = RetryPolicy {
            max_attempts: config.general.upsert_max_attempts,
            backoff: std::time::Duration::from_millis(config.general.upsert_retry_backoff_ms),
        };
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
            retry,
        )
        .await
        .with_context(|| format!("Failed to open database {}", config.general.database_path))?;

        let classifier =
            Arc::new(Classifier::new(&config.scoring).context("Invalid scoring keywords")?);

        let digester = if config.alerts.enabled() {
            let sink = NtfySink::new(
                config.alerts.ntfy_url.trim(),
                config.alerts.priority.clone(),
                config.alerts.tags.clone(),
            )
            .context("Failed to build notification client")?;
            info!(url = %config.alerts.ntfy_url, "Alert digests enabled");
            Some(Digester::new(
                DigestConfig::from_alerts(&config.alerts),
                Arc::new(sink),
            ))
        } else {
            warn!("alerts.ntfy_url not set, digests disabled");
            None
        };

        let sources = [
            NotamSource::for_airports(&config.source),
            NotamSource::for_search_terms(&config.source),
        ];
        let mut monitors = Vec::new();
        for source in sources.into_iter().flatten() {
            let client = FaaClient::new(source, &config.source)?;
            info!(mode = client.mode().as_str(), targets = %client.describe(), "Configured NOTAM source");
            monitors.push(Arc::new(Monitor::new(
                store.clone(),
                Arc::new(client),
                Arc::clone(&classifier),
                digester.clone(),
            )));
        }

        Ok(Self {
            config,
            store,
            classifier,
            digester,
            monitors,
        })
    }

    #[must_use]
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.monitors.clone(),
            self.store.clone(),
            self.config.scheduler.clone(),
            self.config.retention.clone(),
        )
    }
}
