//! Single check command handler

use crate::config::Config;
use crate::services::FlushOutcome;
use crate::state::SharedState;

pub async fn cmd_check(config: Config) -> anyhow::Result<()> {
    let state = SharedState::new(config).await?;

    if state.monitors.is_empty() {
        println!("No sources configured. Set source.airports or source.search_terms.");
        return Ok(());
    }

    let reports = state.scheduler().run_once().await;

    for report in &reports {
        println!(
            "Fetched {} | new {} | updated {} | unchanged {} | skipped {} | parse errors {} | failed {}",
            report.fetched,
            report.inserted,
            report.updated,
            report.unchanged,
            report.skipped,
            report.parse_failures,
            report.failed,
        );
    }

    if reports.len() < state.monitors.len() {
        println!(
            "{} of {} sources failed, see the log for details.",
            state.monitors.len() - reports.len(),
            state.monitors.len()
        );
    }

    if let Some(digester) = &state.digester {
        match digester.shutdown().await {
            FlushOutcome::Sent { items } => println!("Alert digest sent ({items} NOTAMs)."),
            FlushOutcome::Failed { requeued, dropped } => println!(
                "Alert digest could not be delivered ({} NOTAMs not sent).",
                requeued + dropped
            ),
            FlushOutcome::Empty => {}
        }
    }

    Ok(())
}
