//! Listing command handlers

use crate::clients::ntfy::truncate_chars;
use crate::config::Config;
use crate::constants::limits::LISTING_PREVIEW_CHARS;
use crate::db::Store;
use crate::models::Notam;

fn print_listing(title: &str, notams: &[Notam]) {
    if notams.is_empty() {
        println!("No {title} found.");
        return;
    }

    println!("{} ({} total)", title, notams.len());
    println!("{:-<70}", "");

    for notam in notams {
        println!("{notam}");
        let body = notam.body.replace('\n', " ");
        println!("  {}", truncate_chars(body.trim(), LISTING_PREVIEW_CHARS));
    }
}

fn print_summaries(title: &str, notams: &[Notam]) {
    if notams.is_empty() {
        println!("No {title} found.");
        return;
    }

    println!("{} ({} total)", title, notams.len());
    for notam in notams {
        println!();
        println!("{}", notam.summary());
    }
}

pub async fn cmd_active(config: &Config, min_score: i32) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let notams = store.get_active_notams(min_score).await?;
    print_listing("active NOTAMs", &notams);
    Ok(())
}

pub async fn cmd_closures(config: &Config, all: bool) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let notams = store.get_closures(!all).await?;
    print_summaries(if all { "closures" } else { "active closures" }, &notams);
    Ok(())
}

pub async fn cmd_drones(config: &Config, all: bool) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let notams = store.get_drone_notams(!all).await?;
    print_summaries(
        if all {
            "drone-related NOTAMs"
        } else {
            "active drone-related NOTAMs"
        },
        &notams,
    );
    Ok(())
}
