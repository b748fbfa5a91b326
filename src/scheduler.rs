use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

use crate::config::{RetentionConfig, SchedulerConfig};
use crate::db::Store;
use crate::services::{CycleReport, Monitor};

/// Drives one long-lived polling loop per monitor plus the retention purge
/// job, until [`Scheduler::stop`] is called.
pub struct Scheduler {
    monitors: Vec<Arc<Monitor>>,
    store: Store,
    config: SchedulerConfig,
    retention: RetentionConfig,
    shutdown_tx: watch::Sender<bool>,
}

/// Deletes rows past their retention age. Returns the number removed.
pub async fn purge(store: &Store, retention: &RetentionConfig) -> Result<u64> {
    let expired = store
        .purge_expired(retention.purge_expired_after_days)
        .await?;
    let cancelled = store
        .purge_cancelled(retention.purge_cancelled_after_days)
        .await?;

    info!(
        event = "purge_finished",
        expired,
        cancelled,
        "Retention purge complete"
    );
    Ok(expired + cancelled)
}

async fn run_monitor(monitor: &Monitor, shutdown: watch::Receiver<bool>) -> Option<CycleReport> {
    let mode = monitor.mode();
    match monitor.run_cycle(shutdown).await {
        Ok(report) => Some(report),
        Err(e) => {
            error!(mode = mode.as_str(), "Scheduled NOTAM check failed: {}", e);
            None
        }
    }
}

impl Scheduler {
    #[must_use]
    pub fn new(
        monitors: Vec<Arc<Monitor>>,
        store: Store,
        config: SchedulerConfig,
        retention: RetentionConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            monitors,
            store,
            config,
            retention,
            shutdown_tx,
        }
    }

    /// Requests shutdown. Loops finish their current cycle and exit.
    pub fn stop(&self) {
        info!("Stopping scheduler...");
        let _ = self.shutdown_tx.send(true);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !*self.shutdown_tx.borrow()
    }

    /// Runs until stopped. Returns once every loop has exited.
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in config");
            return Ok(());
        }

        info!(monitors = self.monitors.len(), "Starting background scheduler");

        let purge_handle = self.spawn_purge_loop();

        let result = if let Some(cron_expr) = &self.config.cron_expression {
            self.run_with_cron(cron_expr).await
        } else {
            self.run_with_interval().await
        };
        if result.is_err() {
            let _ = self.shutdown_tx.send(true);
        }

        if let Err(e) = purge_handle.await {
            warn!("Purge loop ended abnormally: {}", e);
        }

        info!("Scheduler stopped");
        result
    }

    /// Runs every monitor once, in order.
    pub async fn run_once(&self) -> Vec<CycleReport> {
        info!("Running manual check...");

        let mut reports = Vec::with_capacity(self.monitors.len());
        for monitor in &self.monitors {
            if let Some(report) = run_monitor(monitor, self.shutdown_tx.subscribe()).await {
                reports.push(report);
            }
        }
        reports
    }

    fn spawn_purge_loop(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let retention = self.retention.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        let period = Duration::from_secs(u64::from(self.config.purge_interval_hours.max(1)) * 3600);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if *shutdown.borrow() {
                            break;
                        }
                        if let Err(e) = purge(&store, &retention).await {
                            error!("Scheduled purge failed: {}", e);
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Purge loop exited");
        })
    }

    async fn run_with_interval(&self) -> Result<()> {
        let interval_mins = self.config.check_interval_minutes.max(1);
        info!("Scheduler running every {} minutes", interval_mins);

        let period = Duration::from_secs(u64::from(interval_mins) * 60);
        let handles: Vec<JoinHandle<()>> = self
            .monitors
            .iter()
            .map(|monitor| {
                let monitor = Arc::clone(monitor);
                let mut shutdown = self.shutdown_tx.subscribe();

                tokio::spawn(async move {
                    let mut ticker = interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                if *shutdown.borrow() {
                                    break;
                                }
                                run_monitor(&monitor, shutdown.clone()).await;
                            }
                            _ = shutdown.changed() => break,
                        }
                    }
                    debug!(mode = monitor.mode().as_str(), "Polling loop exited");
                })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!("Polling loop ended abnormally: {}", e);
            }
        }
        Ok(())
    }

    async fn run_with_cron(&self, cron_expr: &str) -> Result<()> {
        let mut sched = JobScheduler::new().await?;
        let mut in_flight = Vec::with_capacity(self.monitors.len());

        for monitor in &self.monitors {
            let monitor = Arc::clone(monitor);
            let shutdown = self.shutdown_tx.subscribe();
            // Cron ticks may arrive while the previous cycle is still running.
            let busy = Arc::new(Mutex::new(()));
            in_flight.push(Arc::clone(&busy));

            let job = Job::new_async(cron_expr, move |_uuid, _lock| {
                let monitor = Arc::clone(&monitor);
                let shutdown = shutdown.clone();
                let busy = Arc::clone(&busy);
                Box::pin(async move {
                    if *shutdown.borrow() {
                        return;
                    }
                    let Ok(_guard) = busy.try_lock() else {
                        warn!(
                            mode = monitor.mode().as_str(),
                            "Previous check still running, skipping this tick"
                        );
                        return;
                    };
                    run_monitor(&monitor, shutdown).await;
                })
            })?;
            sched.add(job).await?;
        }

        sched.start().await?;
        info!("Scheduler running with cron: {}", cron_expr);

        let mut shutdown = self.shutdown_tx.subscribe();
        while !*shutdown.borrow_and_update() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        sched.shutdown().await?;
        for busy in in_flight {
            let _ = busy.lock().await;
        }
        Ok(())
    }
}
