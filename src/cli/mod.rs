//! Command-line interface, parsed with clap.

mod commands;

use clap::{Parser, Subcommand};

/// notamwatch - NOTAM monitor with drone and closure alerting
#[derive(Parser)]
#[command(name = "notamwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as background daemon with scheduler and alert digests
    #[command(alias = "-d", alias = "--daemon")]
    Daemon,

    /// Run a single check for every configured source
    #[command(alias = "-c", alias = "--check")]
    Check,

    /// List active NOTAMs at or above a score
    #[command(alias = "a")]
    Active {
        /// Minimum priority score
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        min_score: i32,
    },

    /// List closure NOTAMs
    Closures {
        /// Include expired and cancelled NOTAMs
        #[arg(long)]
        all: bool,
    },

    /// List drone-related NOTAMs
    Drones {
        /// Include expired and cancelled NOTAMs
        #[arg(long)]
        all: bool,
    },

    /// Delete expired and cancelled NOTAMs past their retention age
    Purge {
        /// Override retention.purge_expired_after_days
        #[arg(long)]
        expired_days: Option<i64>,
        /// Override retention.purge_cancelled_after_days
        #[arg(long)]
        cancelled_days: Option<i64>,
    },

    /// Show database statistics and recent search runs
    Stats,

    /// Create default config file
    #[command(alias = "--init")]
    Init,
}

pub use commands::*;
