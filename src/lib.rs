pub mod cli;
pub mod clients;
pub mod config;
pub mod constants;
pub mod db;
pub mod domain;
pub mod entities;
pub mod models;
pub mod parser;
pub mod scheduler;
pub mod services;
pub mod state;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
pub use config::Config;
use services::FlushOutcome;
use state::SharedState;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_metrics(config: &Config) -> anyhow::Result<()> {
    if !config.observability.metrics_enabled {
        return Ok(());
    }

    use metrics_exporter_prometheus::PrometheusBuilder;
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.observability.metrics_port))
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!(
        "Prometheus metrics exporter listening on port {}",
        config.observability.metrics_port
    );
    Ok(())
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let mut builder = tracing_loki::builder();
        for (key, value) in &config.observability.loki_labels {
            builder = builder.label(key.as_str(), value.as_str())?;
        }
        let (layer, task) = builder.build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    Ok(())
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(());
    };

    if matches!(command, Commands::Init) {
        return cli::cmd_init();
    }

    let config = Config::load()?;
    init_tracing(&config)?;

    match command {
        Commands::Daemon => {
            config.validate()?;
            init_metrics(&config)?;
            run_daemon(config).await
        }
        Commands::Check => {
            config.validate()?;
            cli::cmd_check(config).await
        }
        Commands::Active { min_score } => cli::cmd_active(&config, min_score).await,
        Commands::Closures { all } => cli::cmd_closures(&config, all).await,
        Commands::Drones { all } => cli::cmd_drones(&config, all).await,
        Commands::Purge {
            expired_days,
            cancelled_days,
        } => cli::cmd_purge(&config, expired_days, cancelled_days).await,
        Commands::Stats => cli::cmd_stats(&config).await,
        Commands::Init => cli::cmd_init(),
    }
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    info!(
        "notamwatch v{} starting in daemon mode...",
        env!("CARGO_PKG_VERSION")
    );

    let state = SharedState::new(config).await?;

    if let Some(digester) = &state.digester {
        digester.start();
    }

    let scheduler = std::sync::Arc::new(state.scheduler());
    let scheduler_handle = {
        let sched = std::sync::Arc::clone(&scheduler);
        tokio::spawn(async move {
            if let Err(e) = sched.start().await {
                error!("Scheduler error: {}", e);
            }
        })
    };

    info!("Daemon running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    scheduler.stop();
    if let Err(e) = scheduler_handle.await {
        warn!("Scheduler task ended abnormally: {}", e);
    }

    if let Some(digester) = &state.digester {
        match digester.shutdown().await {
            FlushOutcome::Empty => {}
            FlushOutcome::Sent { items } => info!(items, "Final digest delivered"),
            FlushOutcome::Failed { dropped, .. } => {
                anyhow::bail!("{dropped} digest items could not be delivered before shutdown");
            }
        }
    }

    info!("Daemon stopped");
    Ok(())
}
