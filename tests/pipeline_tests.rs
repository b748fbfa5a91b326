//! End-to-end polling cycle tests with a stubbed fetch source and a
//! recording notification sink.

use notamwatch::clients::faa::{FetchBatch, FetchError, FetchSource, RawNotam};
use notamwatch::clients::ntfy::{NotificationSink, SinkError};
use notamwatch::config::ScoringConfig;
use notamwatch::db::Store;
use notamwatch::domain::SearchMode;
use notamwatch::models::{AerodromeLookup, AirportInfo, Classifier};
use notamwatch::services::{CycleError, DigestConfig, Digester, FlushOutcome, Monitor};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

const DRONE_CLOSURE: &str = "A3097/25 NOTAMN
Q) EKDK/QFALC/IV/NBO/A/000/999/5537N01239E005
A) EKCH B) 2509221930 C) 2709222300
E) AD CLSD DUE TO DRONE ACTIVITY";

const TAXIWAY: &str = "A3100/25 NOTAMN
Q) EKDK/QMXLC/IV/M/A/000/999/5618N01037E005
A) EKAH B) 2509221930 C) 2709222300
E) TWY B CLSD";

const OBSTACLE: &str = "B0456/25 NOTAMN
Q) ESAA/QOBCE/IV/M/AE/000/005/5939N01755E001
A) ESSA B) 2509221930 C) 2709222300
E) CRANE ERECTED 300M SOUTH OF RWY 01L THR";

fn envelope(message: &str, designator: &str) -> RawNotam {
    RawNotam {
        facility_designator: Some(designator.to_string()),
        icao_message: message.to_string(),
        source: Some("USNS".to_string()),
        issue_date: Some("09/22/2025 1930".to_string()),
        ..RawNotam::default()
    }
}

struct StubSource {
    mode: SearchMode,
    messages: Vec<RawNotam>,
    fail: bool,
}

#[async_trait::async_trait]
impl FetchSource for StubSource {
    fn mode(&self) -> SearchMode {
        self.mode
    }

    fn describe(&self) -> String {
        match self.mode {
            SearchMode::Airport => "EKCH,EKAH,ESSA".to_string(),
            SearchMode::FreeText => "drone".to_string(),
        }
    }

    async fn fetch(&self, _shutdown: watch::Receiver<bool>) -> Result<FetchBatch, FetchError> {
        if self.fail {
            return Err(FetchError::Status {
                target: "EKCH".to_string(),
                status: 503,
            });
        }
        Ok(FetchBatch {
            messages: self.messages.clone(),
            transaction_id: uuid::Uuid::new_v4().to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, title: &str, body: &str) -> Result<(), SinkError> {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}

struct StaticAerodromes(HashMap<String, AirportInfo>);

#[async_trait::async_trait]
impl AerodromeLookup for StaticAerodromes {
    async fn lookup(&self, icao_code: &str) -> anyhow::Result<Option<AirportInfo>> {
        Ok(self.0.get(icao_code).cloned())
    }
}

async fn test_store(name: &str) -> Store {
    let db_path = std::env::temp_dir().join(format!(
        "notamwatch-{name}-test-{}.db",
        uuid::Uuid::new_v4()
    ));
    Store::new(&format!("sqlite:{}", db_path.display()))
        .await
        .expect("Failed to create store")
}

fn digester(sink: Arc<RecordingSink>) -> Arc<Digester> {
    Digester::new(
        DigestConfig {
            min_score: 80,
            interval: Duration::from_secs(3600),
            max_items: 10,
            max_retention: Duration::from_secs(3600),
            link: None,
            shutdown_attempts: 1,
            shutdown_backoff: Duration::ZERO,
        },
        sink,
    )
}

fn classifier() -> Arc<Classifier> {
    Arc::new(Classifier::new(&ScoringConfig::default()).unwrap())
}

fn shutdown() -> watch::Receiver<bool> {
    watch::channel(false).1
}

#[tokio::test]
async fn test_cycle_stores_alerts_and_audits() {
    let store = test_store("pipeline").await;
    let sink = Arc::new(RecordingSink::default());
    let digester = digester(Arc::clone(&sink));

    let mut expired = envelope(TAXIWAY, "EKAH");
    expired.cancelled_or_expired = true;

    let source = StubSource {
        mode: SearchMode::Airport,
        messages: vec![
            envelope(DRONE_CLOSURE, "EKCH"),
            envelope("GARBAGE WITHOUT FIELDS", "EKCH"),
            envelope(TAXIWAY, "EKAH"),
            expired,
            envelope(OBSTACLE, "ESSA"),
        ],
        fail: false,
    };
    let aerodromes = StaticAerodromes(HashMap::from([(
        "EKCH".to_string(),
        AirportInfo {
            icao_code: "EKCH".to_string(),
            name: Some("Copenhagen Kastrup Airport".to_string()),
            ..AirportInfo::default()
        },
    )]));

    let monitor = Monitor::new(
        store.clone(),
        Arc::new(source),
        classifier(),
        Some(Arc::clone(&digester)),
    )
    .with_aerodromes(Arc::new(aerodromes));

    let report = monitor.run_cycle(shutdown()).await.unwrap();

    assert_eq!(report.fetched, 5);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.parse_failures, 1);
    assert_eq!(report.inserted, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.queued_for_alert, 1);

    let stored = store.get_notam("A3097/25").await.unwrap().unwrap();
    assert_eq!(stored.priority_score(), 100);
    assert_eq!(stored.airport_name.as_deref(), Some("Copenhagen Kastrup Airport"));
    assert_eq!(stored.source.as_deref(), Some("USNS"));
    assert!(stored.issue_date.is_some());

    let obstacle = store.get_notam("B0456/25").await.unwrap().unwrap();
    assert!(obstacle.airport_name.is_none());
    assert!(store.get_aerodrome("ESSA").await.unwrap().unwrap().is_inferred());

    let runs = store.recent_search_runs(5).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, report.search_run_id);
    assert_eq!(runs[0].mode, SearchMode::Airport);
    assert_eq!(runs[0].airport_codes.as_deref(), Some("EKCH,EKAH,ESSA"));
    assert_eq!(runs[0].total_fetched, 5);
    assert_eq!(runs[0].new_inserted, 3);

    // The same batch again changes nothing and alerts nobody.
    let again = monitor.run_cycle(shutdown()).await.unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(again.unchanged, 3);
    assert_eq!(again.queued_for_alert, 0);

    assert_eq!(digester.shutdown().await, FlushOutcome::Sent { items: 1 });
    let sent = sink.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.contains("1 new high-priority"));
    assert!(sent[0].1.contains("A3097/25"));
    assert!(!sent[0].1.contains("A3100/25"));
}

#[tokio::test]
async fn test_two_monitors_share_one_store() {
    let store = test_store("pipeline-shared").await;

    let mut by_term = envelope(DRONE_CLOSURE, "EKCH");
    by_term.search_term = Some("drone".to_string());

    let airports = Monitor::new(
        store.clone(),
        Arc::new(StubSource {
            mode: SearchMode::Airport,
            messages: vec![envelope(DRONE_CLOSURE, "EKCH"), envelope(TAXIWAY, "EKAH")],
            fail: false,
        }),
        classifier(),
        None,
    );
    let free_text = Monitor::new(
        store.clone(),
        Arc::new(StubSource {
            mode: SearchMode::FreeText,
            messages: vec![by_term],
            fail: false,
        }),
        classifier(),
        None,
    );

    let (a, b) = tokio::join!(airports.run_cycle(shutdown()), free_text.run_cycle(shutdown()));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.failed + b.failed, 0);
    assert_eq!(a.inserted + b.inserted, 2);
    assert_eq!(store.count_notams().await.unwrap(), 2);
    assert_eq!(store.recent_search_runs(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_fetch_failure_records_no_search_run() {
    let store = test_store("pipeline-fetch-error").await;
    let monitor = Monitor::new(
        store.clone(),
        Arc::new(StubSource {
            mode: SearchMode::Airport,
            messages: Vec::new(),
            fail: true,
        }),
        classifier(),
        None,
    );

    let err = monitor.run_cycle(shutdown()).await.unwrap_err();
    assert!(matches!(err, CycleError::Fetch(FetchError::Status { status: 503, .. })));
    assert!(store.recent_search_runs(10).await.unwrap().is_empty());
    assert_eq!(store.count_notams().await.unwrap(), 0);
}
