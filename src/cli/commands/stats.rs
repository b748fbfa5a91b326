use crate::config::Config;
use crate::constants::limits::RECENT_SEARCH_RUNS;
use crate::db::Store;

pub async fn cmd_stats(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let stats = store.get_statistics().await?;

    println!("NOTAM Statistics");
    println!("{:-<40}", "");
    println!("Total:                 {}", stats.total);
    println!("Active:                {}", stats.active);
    println!("Drone-related:         {}", stats.drone_related);
    println!("Active drone-related:  {}", stats.active_drone_related);
    println!("Active closures:       {}", stats.active_closures);
    println!("Cancelled:             {}", stats.cancelled);

    let runs = store.recent_search_runs(RECENT_SEARCH_RUNS).await?;
    if runs.is_empty() {
        return Ok(());
    }

    println!();
    println!("Recent Search Runs (last {}):", runs.len());
    println!("{:-<70}", "");
    for run in runs {
        let target = run
            .airport_codes
            .as_deref()
            .or(run.search_term.as_deref())
            .unwrap_or("-");
        println!(
            "{} [{}] {} | fetched {} | new {} | updated {} | failed {}",
            run.run_at.format("%Y-%m-%d %H:%M"),
            run.mode,
            target,
            run.total_fetched,
            run.new_inserted,
            run.updated,
            run.failed
        );
    }

    Ok(())
}
