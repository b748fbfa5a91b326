//! Batched alerting for high-priority NOTAMs.
//!
//! Producers call [`Digester::add`] from any task. A timer task flushes the
//! pending batch every interval: the buffer is swapped out under a short
//! lock, then rendered and sent with the lock released, so a slow sink never
//! blocks producers. A batch the sink rejects is merged back and retried on
//! the next flush until it exceeds the retention age.

use crate::clients::ntfy::{NotificationSink, SinkError, truncate_chars};
use crate::config::AlertsConfig;
use crate::domain::NotamId;
use crate::models::Notam;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub min_score: i32,
    pub interval: Duration,
    pub max_items: usize,
    pub max_retention: Duration,
    /// Link appended to every digest, if any.
    pub link: Option<String>,
    /// Send attempts for the final flush at shutdown.
    pub shutdown_attempts: u32,
    /// Base delay between those attempts, growing linearly.
    pub shutdown_backoff: Duration,
}

impl DigestConfig {
    #[must_use]
    pub fn from_alerts(config: &AlertsConfig) -> Self {
        let link = config
            .ntfy_url
            .trim()
            .trim_end_matches("/send")
            .to_string();
        Self {
            min_score: config.min_score,
            interval: Duration::from_secs(config.digest_interval_seconds),
            max_items: config.max_digest_items,
            max_retention: Duration::from_secs(config.max_retention_hours.saturating_mul(3600)),
            link: (!link.is_empty()).then_some(link),
            shutdown_attempts: 3,
            shutdown_backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigesterState {
    Idle,
    Accumulating,
    Flushing,
}

/// Key used both to count affected airports and to keep one shown item per
/// airport.
fn airport_key(notam: &Notam) -> &str {
    notam.display_location().trim()
}

/// Running counts over the pending batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestStats {
    pub total: usize,
    pub closures: usize,
    pub drone_related: usize,
    pub restrictions: usize,
    airports: HashMap<String, usize>,
}

impl DigestStats {
    fn record(&mut self, notam: &Notam) {
        self.total += 1;
        self.closures += usize::from(notam.is_closure());
        self.drone_related += usize::from(notam.is_drone_related());
        self.restrictions += usize::from(notam.is_restriction());
        let key = airport_key(notam);
        if !key.is_empty() {
            *self.airports.entry(key.to_string()).or_default() += 1;
        }
    }

    fn forget(&mut self, notam: &Notam) {
        self.total = self.total.saturating_sub(1);
        self.closures = self.closures.saturating_sub(usize::from(notam.is_closure()));
        self.drone_related = self
            .drone_related
            .saturating_sub(usize::from(notam.is_drone_related()));
        self.restrictions = self
            .restrictions
            .saturating_sub(usize::from(notam.is_restriction()));
        if let Entry::Occupied(mut entry) = self.airports.entry(airport_key(notam).to_string())
        {
            *entry.get_mut() -= 1;
            if *entry.get() == 0 {
                entry.remove();
            }
        }
    }

    #[must_use]
    pub fn airports_affected(&self) -> usize {
        self.airports.len()
    }
}

#[derive(Debug, Clone)]
struct PendingItem {
    notam: Notam,
    discovered_at: DateTime<Utc>,
    /// When this NOTAM first entered a batch; bounds retries.
    first_queued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct DigestBuffer {
    pending: HashMap<NotamId, PendingItem>,
    stats: DigestStats,
    window_start: Option<DateTime<Utc>>,
}

/// A rendered digest, ready for the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub title: String,
    pub body: String,
    pub stats: DigestStats,
    /// NOTAMs listed in the body, in display order.
    pub shown: Vec<NotamId>,
    /// Every NOTAM the digest accounts for.
    pub included: Vec<NotamId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Empty,
    Sent { items: usize },
    Failed { requeued: usize, dropped: usize },
}

fn render(
    items: &[PendingItem],
    stats: &DigestStats,
    window: (DateTime<Utc>, DateTime<Utc>),
    config: &DigestConfig,
) -> Digest {
    let mut ranked: Vec<&PendingItem> = items.iter().collect();
    ranked.sort_by(|a, b| {
        b.notam
            .priority_score()
            .cmp(&a.notam.priority_score())
            .then_with(|| b.discovered_at.cmp(&a.discovered_at))
            .then_with(|| a.notam.notam_id.cmp(&b.notam.notam_id))
    });

    let mut seen_airports = std::collections::HashSet::new();
    let top: Vec<&PendingItem> = ranked
        .iter()
        .copied()
        .filter(|item| seen_airports.insert(airport_key(&item.notam).to_string()))
        .take(config.max_items)
        .collect();

    let title = format!("NOTAM Digest: {} new high-priority items", stats.total);

    let mut body = String::new();
    let _ = writeln!(body, "Summary");
    let _ = writeln!(body, "- Total: {}", stats.total);
    let _ = writeln!(body, "- Closures: {}", stats.closures);
    let _ = writeln!(body, "- Drone-related: {}", stats.drone_related);
    let _ = writeln!(body, "- Restrictions: {}", stats.restrictions);
    let _ = writeln!(body, "- Airports affected: {}", stats.airports_affected());
    let _ = writeln!(
        body,
        "\nPeriod: {} - {}",
        window.0.format("%Y-%m-%d %H:%M UTC"),
        window.1.format("%Y-%m-%d %H:%M UTC")
    );

    if !top.is_empty() {
        let _ = writeln!(body, "\nTop items");
    }
    for (idx, item) in top.iter().enumerate() {
        let notam = &item.notam;
        let mut flags = Vec::new();
        if notam.is_closure() {
            flags.push("CLOSURE");
        }
        if notam.is_drone_related() {
            flags.push("DRONE");
        }
        if notam.is_restriction() {
            flags.push("RESTRICTED");
        }
        let flag_str = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };

        let preview = notam.body.replace('\n', " ");
        let _ = writeln!(
            body,
            "\n{}. {} - {} (Score: {}){}\n   {}",
            idx + 1,
            notam.notam_id,
            notam.display_location(),
            notam.priority_score(),
            flag_str,
            truncate_chars(preview.trim(), PREVIEW_CHARS)
        );
    }

    if items.len() > top.len() {
        let _ = writeln!(body, "\n... and {} more", items.len() - top.len());
    }

    if let Some(link) = &config.link {
        let _ = writeln!(body, "\nView in NOTAM system: {link}");
    }

    Digest {
        title,
        body: body.trim_end().to_string(),
        stats: stats.clone(),
        shown: top.iter().map(|i| i.notam.notam_id.clone()).collect(),
        included: ranked.iter().map(|i| i.notam.notam_id.clone()).collect(),
    }
}

pub struct Digester {
    config: DigestConfig,
    sink: Arc<dyn NotificationSink>,
    buffer: Mutex<DigestBuffer>,
    flush_gate: tokio::sync::Mutex<()>,
    flushing: AtomicBool,
    stop_tx: watch::Sender<bool>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Digester {
    #[must_use]
    pub fn new(config: DigestConfig, sink: Arc<dyn NotificationSink>) -> Arc<Self> {
        let (stop_tx, _) = watch::channel(false);
        Arc::new(Self {
            config,
            sink,
            buffer: Mutex::new(DigestBuffer::default()),
            flush_gate: tokio::sync::Mutex::new(()),
            flushing: AtomicBool::new(false),
            stop_tx,
            timer: Mutex::new(None),
        })
    }

    fn lock_buffer(&self) -> MutexGuard<'_, DigestBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the periodic flush task. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if timer.is_some() {
            return;
        }

        let digester = Arc::clone(self);
        let mut stop_rx = self.stop_tx.subscribe();
        let interval = self.config.interval;

        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        digester.flush(false).await;
                    }
                    _ = stop_rx.changed() => {
                        debug!("Digest timer stopped");
                        break;
                    }
                }
            }
        }));

        info!(
            interval_secs = interval.as_secs(),
            min_score = self.config.min_score,
            "Alert digester started"
        );
    }

    /// Queues a NOTAM if it meets the score threshold. A NOTAM already
    /// pending is replaced by the newer observation. Returns whether it was
    /// accepted.
    pub fn add(&self, notam: &Notam) -> bool {
        if notam.priority_score() < self.config.min_score {
            debug!(
                notam_id = %notam.notam_id,
                score = notam.priority_score(),
                "Below digest threshold"
            );
            return false;
        }

        let now = Utc::now();
        let mut guard = self.lock_buffer();
        let buffer = &mut *guard;

        match buffer.pending.entry(notam.notam_id.clone()) {
            Entry::Occupied(mut entry) => {
                buffer.stats.forget(&entry.get().notam);
                buffer.stats.record(notam);
                let item = entry.get_mut();
                item.notam = notam.clone();
                item.discovered_at = now;
            }
            Entry::Vacant(entry) => {
                buffer.stats.record(notam);
                entry.insert(PendingItem {
                    notam: notam.clone(),
                    discovered_at: now,
                    first_queued_at: now,
                });
            }
        }
        buffer.window_start.get_or_insert(now);
        let pending = buffer.pending.len();
        drop(guard);

        metrics::counter!("digest_items_accepted_total").increment(1);
        debug!(notam_id = %notam.notam_id, pending, "Queued for digest");
        true
    }

    #[must_use]
    pub fn state(&self) -> DigesterState {
        if self.flushing.load(Ordering::SeqCst) {
            return DigesterState::Flushing;
        }
        if self.lock_buffer().pending.is_empty() {
            DigesterState::Idle
        } else {
            DigesterState::Accumulating
        }
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock_buffer().pending.len()
    }

    #[must_use]
    pub fn stats(&self) -> DigestStats {
        self.lock_buffer().stats.clone()
    }

    /// Flushes outside the timer schedule.
    pub async fn send_immediate(&self) -> FlushOutcome {
        self.flush(false).await
    }

    /// Stops the timer, then flushes whatever is still pending. A failing
    /// sink gets `shutdown_attempts` tries; anything still undelivered after
    /// that is discarded and reported as dropped.
    pub async fn shutdown(&self) -> FlushOutcome {
        let _ = self.stop_tx.send(true);
        let handle = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!("Digest timer task ended abnormally: {e}");
        }

        let attempts = self.config.shutdown_attempts.max(1);
        let mut aged_out = 0;
        let mut outcome = FlushOutcome::Empty;
        for attempt in 1..=attempts {
            let last = attempt == attempts;
            outcome = self.flush(last).await;
            let FlushOutcome::Failed { dropped, .. } = outcome else {
                break;
            };
            aged_out += dropped;
            if !last {
                tokio::time::sleep(self.config.shutdown_backoff.saturating_mul(attempt)).await;
            }
        }

        if matches!(outcome, FlushOutcome::Failed { .. }) {
            let lost = self.discard_pending();
            outcome = FlushOutcome::Failed {
                requeued: 0,
                dropped: aged_out + lost,
            };
        }

        info!(?outcome, "Alert digester shut down");
        outcome
    }

    /// Empties the buffer, counting every item as dropped.
    fn discard_pending(&self) -> usize {
        let lost = std::mem::take(&mut *self.lock_buffer()).pending.len();
        if lost > 0 {
            metrics::counter!("digest_items_dropped_total").increment(lost as u64);
            error!(lost, "Digest items lost at shutdown, the sink never accepted them");
        }
        lost
    }

    async fn flush(&self, final_flush: bool) -> FlushOutcome {
        let _gate = self.flush_gate.lock().await;

        let batch = {
            let mut buffer = self.lock_buffer();
            if buffer.pending.is_empty() {
                debug!("No NOTAMs to digest");
                return FlushOutcome::Empty;
            }
            self.flushing.store(true, Ordering::SeqCst);
            std::mem::take(&mut *buffer)
        };

        let now = Utc::now();
        let items: Vec<PendingItem> = batch.pending.into_values().collect();
        let digest = render(
            &items,
            &batch.stats,
            (batch.window_start.unwrap_or(now), now),
            &self.config,
        );

        let outcome = match self.sink.send(&digest.title, &digest.body).await {
            Ok(()) => {
                metrics::counter!("digests_sent_total").increment(1);
                info!(
                    items = items.len(),
                    shown = digest.shown.len(),
                    airports = digest.stats.airports_affected(),
                    "Digest sent"
                );
                FlushOutcome::Sent { items: items.len() }
            }
            Err(err) => {
                metrics::counter!("digest_send_failures_total").increment(1);
                if final_flush {
                    error!(error = %err, items = items.len(), "Failed to send final digest, pending items will be lost");
                } else {
                    error!(error = %err, items = items.len(), "Failed to send digest, keeping batch for retry");
                }
                self.requeue(items, batch.window_start, now, &err)
            }
        };

        self.flushing.store(false, Ordering::SeqCst);
        outcome
    }

    /// Merges a failed batch back into the pending buffer. Items superseded
    /// by a newer observation are skipped; items past the retention age are
    /// dropped.
    fn requeue(
        &self,
        items: Vec<PendingItem>,
        window_start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        cause: &SinkError,
    ) -> FlushOutcome {
        let max_age = chrono::Duration::from_std(self.config.max_retention)
            .unwrap_or(chrono::Duration::MAX);
        let mut requeued = 0;
        let mut dropped = 0;

        let mut guard = self.lock_buffer();
        let buffer = &mut *guard;

        for item in items {
            if now - item.first_queued_at > max_age {
                dropped += 1;
                continue;
            }
            match buffer.pending.entry(item.notam.notam_id.clone()) {
                Entry::Occupied(mut newer) => {
                    let newer = newer.get_mut();
                    newer.first_queued_at = newer.first_queued_at.min(item.first_queued_at);
                }
                Entry::Vacant(slot) => {
                    buffer.stats.record(&item.notam);
                    slot.insert(item);
                    requeued += 1;
                }
            }
        }

        buffer.window_start = match (buffer.window_start, window_start) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        if buffer.pending.is_empty() {
            buffer.window_start = None;
        }
        drop(guard);

        if dropped > 0 {
            metrics::counter!("digest_items_dropped_total").increment(dropped as u64);
            warn!(
                dropped,
                max_retention_secs = self.config.max_retention.as_secs(),
                error = %cause,
                "Dropped digest items that could not be delivered within the retention window"
            );
        }

        FlushOutcome::Failed { requeued, dropped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::models::{Classifier, Provenance};
    use crate::parser::parse_notam;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, String)>>,
        fail_next: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl NotificationSink for RecordingSink {
        async fn send(&self, title: &str, body: &str) -> Result<(), SinkError> {
            if self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(SinkError::Status(503));
            }
            self.sent
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
            Ok(())
        }
    }

    /// Sink whose `send` parks until released.
    #[derive(Default)]
    struct ParkedSink {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl NotificationSink for ParkedSink {
        async fn send(&self, _title: &str, body: &str) -> Result<(), SinkError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.sent.lock().unwrap().push(body.to_string());
            Ok(())
        }
    }

    fn config(max_retention: Duration) -> DigestConfig {
        DigestConfig {
            min_score: 80,
            interval: Duration::from_secs(3600),
            max_items: 10,
            max_retention,
            link: None,
            shutdown_attempts: 3,
            shutdown_backoff: Duration::from_millis(1),
        }
    }

    fn notam(id: &str, airport: &str, body: &str) -> Notam {
        let raw = format!(
            "{id} NOTAMN\nQ) EKDK/QMRLC/IV/NBO/A/000/999/5537N01239E005\nA) {airport} B) 2502010600 C) 2502281800\nE) {body}"
        );
        let classifier = Classifier::new(&ScoringConfig::default()).unwrap();
        Notam::from_parsed(parse_notam(&raw).unwrap(), Provenance::default(), &classifier)
    }

    fn shown_ids(sink: &RecordingSink) -> Vec<String> {
        sink.sent
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, body)| {
                body.lines()
                    .filter_map(|l| l.split(". ").nth(1))
                    .filter_map(|l| l.split(' ').next())
                    .filter(|id| id.contains('/'))
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[test]
    fn below_threshold_is_rejected() {
        let digester = Digester::new(config(Duration::from_secs(60)), Arc::new(RecordingSink::default()));
        // Closure (50) + NEW (10) + aerodrome scope (10) = 70
        assert!(!digester.add(&notam("A0001/25", "EKCH", "RWY CLSD")));
        assert_eq!(digester.state(), DigesterState::Idle);

        // Drone keyword adds 30
        assert!(digester.add(&notam("A0002/25", "EKCH", "RWY CLSD DUE TO DRONE")));
        assert_eq!(digester.state(), DigesterState::Accumulating);
    }

    #[test]
    fn twelve_items_across_five_airports() {
        let airports = ["EKCH", "EKBI", "EKAH", "EKYT", "EKOD"];
        let items: Vec<PendingItem> = (0..12)
            .map(|i| {
                let mut n = notam(
                    &format!("A{:04}/25", i + 1),
                    airports[i % airports.len()],
                    "AD CLSD DUE TO DRONE ACTIVITY",
                );
                n.classification.priority_score = 80 + i32::try_from(i).unwrap();
                PendingItem {
                    notam: n,
                    discovered_at: Utc::now(),
                    first_queued_at: Utc::now(),
                }
            })
            .collect();
        let mut stats = DigestStats::default();
        for item in &items {
            stats.record(&item.notam);
        }

        let digest = render(&items, &stats, (Utc::now(), Utc::now()), &config(Duration::from_secs(60)));

        assert_eq!(digest.stats.total, 12);
        assert_eq!(digest.stats.airports_affected(), 5);
        assert_eq!(digest.shown.len(), 5);
        assert_eq!(digest.included.len(), 12);
        // Highest score per airport, best first.
        assert_eq!(digest.shown[0].as_str(), "A0012/25");
        assert_eq!(digest.shown[1].as_str(), "A0011/25");
        assert!(digest.body.contains("- Total: 12"));
        assert!(digest.body.contains("- Airports affected: 5"));
        assert!(digest.body.contains("... and 7 more"));
    }

    #[test]
    fn ties_are_broken_by_recency() {
        let older = PendingItem {
            notam: notam("A0001/25", "EKCH", "AD CLSD DRONE"),
            discovered_at: Utc::now() - chrono::Duration::minutes(5),
            first_queued_at: Utc::now(),
        };
        let newer = PendingItem {
            notam: notam("A0002/25", "EKBI", "AD CLSD DRONE"),
            discovered_at: Utc::now(),
            first_queued_at: Utc::now(),
        };
        let mut stats = DigestStats::default();
        stats.record(&older.notam);
        stats.record(&newer.notam);

        let digest = render(&[older, newer], &stats, (Utc::now(), Utc::now()), &config(Duration::from_secs(60)));
        assert_eq!(digest.shown[0].as_str(), "A0002/25");
    }

    #[test]
    fn readding_replaces_and_keeps_stats_consistent() {
        let digester = Digester::new(config(Duration::from_secs(60)), Arc::new(RecordingSink::default()));
        digester.add(&notam("A0001/25", "EKCH", "AD CLSD DRONE"));
        let mut moved = notam("A0001/25", "EKBI", "AD CLSD DRONE");
        moved.classification.is_restriction = true;
        digester.add(&moved);

        let stats = digester.stats();
        assert_eq!(digester.pending_len(), 1);
        assert_eq!(stats.total, 1);
        assert_eq!(stats.restrictions, 1);
        assert_eq!(stats.airports_affected(), 1);
    }

    #[tokio::test]
    async fn failed_send_is_retried_without_loss_or_duplicates() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail_next.store(1, Ordering::SeqCst);
        let digester = Digester::new(config(Duration::from_secs(3600)), sink.clone());

        digester.add(&notam("A0001/25", "EKCH", "AD CLSD DRONE"));
        digester.add(&notam("A0002/25", "EKBI", "AD CLSD DRONE"));

        let first = digester.send_immediate().await;
        assert_eq!(first, FlushOutcome::Failed { requeued: 2, dropped: 0 });
        assert_eq!(digester.pending_len(), 2);

        digester.add(&notam("A0003/25", "EKAH", "AD CLSD DRONE"));
        digester.add(&notam("A0001/25", "EKCH", "AD CLSD DRONE AMENDED"));

        let outcome = digester.shutdown().await;
        assert_eq!(outcome, FlushOutcome::Sent { items: 3 });
        assert_eq!(digester.state(), DigesterState::Idle);

        let shown: HashSet<String> = shown_ids(&sink).into_iter().collect();
        let expected: HashSet<String> = ["A0001/25", "A0002/25", "A0003/25"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        assert_eq!(shown, expected);
        assert_eq!(shown_ids(&sink).len(), 3);
    }

    #[tokio::test]
    async fn adds_during_a_slow_send_go_to_the_next_batch() {
        let sink = Arc::new(ParkedSink::default());
        let digester = Digester::new(config(Duration::from_secs(3600)), sink.clone());
        digester.add(&notam("A0001/25", "EKCH", "AD CLSD DRONE"));

        let first = {
            let digester = Arc::clone(&digester);
            tokio::spawn(async move { digester.send_immediate().await })
        };
        sink.entered.notified().await;
        assert_eq!(digester.state(), DigesterState::Flushing);

        let started = std::time::Instant::now();
        assert!(digester.add(&notam("A0002/25", "EKBI", "AD CLSD DRONE")));
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(digester.pending_len(), 1);

        sink.release.notify_one();
        assert_eq!(first.await.unwrap(), FlushOutcome::Sent { items: 1 });

        sink.release.notify_one();
        assert_eq!(digester.send_immediate().await, FlushOutcome::Sent { items: 1 });

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("A0001/25"));
        assert!(!sent[0].contains("A0002/25"));
        assert!(sent[1].contains("A0002/25"));
        assert!(!sent[1].contains("A0001/25"));
    }

    #[tokio::test]
    async fn twelve_adds_across_five_airports_flush_as_one_digest() {
        let sink = Arc::new(RecordingSink::default());
        let digester = Digester::new(config(Duration::from_secs(3600)), sink.clone());
        let airports = ["EKCH", "EKBI", "EKAH", "EKYT", "EKOD"];

        for i in 0..12 {
            let mut n = notam(
                &format!("A{:04}/25", i + 1),
                airports[i % airports.len()],
                "AD CLSD DUE TO DRONE ACTIVITY",
            );
            n.classification.priority_score = 80 + i32::try_from(i).unwrap();
            assert!(digester.add(&n));
        }
        assert_eq!(digester.stats().total, 12);
        assert_eq!(digester.stats().airports_affected(), 5);

        assert_eq!(digester.send_immediate().await, FlushOutcome::Sent { items: 12 });
        assert_eq!(digester.state(), DigesterState::Idle);

        let body = sink.sent.lock().unwrap()[0].1.clone();
        assert!(body.contains("- Total: 12"));
        assert!(body.contains("- Airports affected: 5"));
        assert!(body.contains("... and 7 more"));
        assert_eq!(
            shown_ids(&sink),
            ["A0012/25", "A0011/25", "A0010/25", "A0009/25", "A0008/25"]
        );
    }

    #[test]
    fn airports_without_code_count_and_dedupe_alike() {
        let digester = Digester::new(config(Duration::from_secs(60)), Arc::new(RecordingSink::default()));
        for id in ["A0001/25", "A0002/25"] {
            let mut n = notam(id, "EKCH", "AD CLSD DRONE");
            n.airport_code = None;
            digester.add(&n);
        }
        assert_eq!(digester.stats().airports_affected(), 1);

        let buffer = digester.lock_buffer();
        let items: Vec<PendingItem> = buffer.pending.values().cloned().collect();
        let digest = render(&items, &buffer.stats, (Utc::now(), Utc::now()), &digester.config);
        assert_eq!(digest.shown.len(), 1);
        assert_eq!(digest.stats.airports_affected(), 1);
    }

    #[tokio::test]
    async fn shutdown_retries_a_failing_sink() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail_next.store(1, Ordering::SeqCst);
        let digester = Digester::new(config(Duration::from_secs(3600)), sink.clone());
        digester.add(&notam("A0001/25", "EKCH", "AD CLSD DRONE"));

        assert_eq!(digester.shutdown().await, FlushOutcome::Sent { items: 1 });
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_reports_items_the_sink_never_took() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail_next.store(100, Ordering::SeqCst);
        let digester = Digester::new(config(Duration::from_secs(3600)), sink.clone());
        digester.add(&notam("A0001/25", "EKCH", "AD CLSD DRONE"));

        let outcome = digester.shutdown().await;
        assert_eq!(outcome, FlushOutcome::Failed { requeued: 0, dropped: 1 });
        assert_eq!(digester.pending_len(), 0);
        assert_eq!(digester.state(), DigesterState::Idle);
        // Three attempts, then give up.
        assert_eq!(sink.fail_next.load(Ordering::SeqCst), 97);
    }

    #[tokio::test]
    async fn items_past_retention_are_dropped() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail_next.store(1, Ordering::SeqCst);
        let digester = Digester::new(config(Duration::ZERO), sink.clone());

        digester.add(&notam("A0001/25", "EKCH", "AD CLSD DRONE"));
        tokio::time::sleep(Duration::from_millis(5)).await;

        let outcome = digester.send_immediate().await;
        assert_eq!(outcome, FlushOutcome::Failed { requeued: 0, dropped: 1 });
        assert_eq!(digester.state(), DigesterState::Idle);
        assert_eq!(digester.send_immediate().await, FlushOutcome::Empty);
    }

    #[tokio::test]
    async fn timer_flushes_periodically() {
        let sink = Arc::new(RecordingSink::default());
        let mut cfg = config(Duration::from_secs(60));
        cfg.interval = Duration::from_millis(20);
        let digester = Digester::new(cfg, sink.clone());
        digester.start();

        digester.add(&notam("A0001/25", "EKCH", "AD CLSD DRONE"));
        for _ in 0..50 {
            if !sink.sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(sink.sent.lock().unwrap().len(), 1);
        assert_eq!(digester.shutdown().await, FlushOutcome::Empty);
    }
}
