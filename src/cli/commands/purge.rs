use crate::config::Config;
use crate::db::Store;
use crate::scheduler::purge;

pub async fn cmd_purge(
    config: &Config,
    expired_days: Option<i64>,
    cancelled_days: Option<i64>,
) -> anyhow::Result<()> {
    let mut retention = config.retention.clone();
    if let Some(days) = expired_days {
        retention.purge_expired_after_days = days;
    }
    if let Some(days) = cancelled_days {
        retention.purge_cancelled_after_days = days;
    }
    if retention.purge_expired_after_days < 0 || retention.purge_cancelled_after_days < 0 {
        anyhow::bail!("Retention days cannot be negative");
    }

    let store = Store::new(&config.general.database_path).await?;
    let removed = purge(&store, &retention).await?;

    println!(
        "Removed {removed} NOTAMs (expired > {} days, cancelled > {} days).",
        retention.purge_expired_after_days, retention.purge_cancelled_after_days
    );
    Ok(())
}
