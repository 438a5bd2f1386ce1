use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "abcp-sync")]
#[command(about = "Replicate ABCP users into Bitrix24 contacts and deals")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local SQLite store (overrides SQLITE_PATH)
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Log level for abcp-sync targets (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Also write daily-rotated log files into this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or migrate the local store schema
    InitDb,
    /// Import every ABCP user into the local store
    ImportAll,
    /// Import users registered today
    ImportToday {
        /// Day to import instead of today (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        date: Option<NaiveDate>,
    },
    /// Load users from a saved `{"items": [...]}` JSON file without calling ABCP
    ImportFile {
        /// JSON file holding the user listing
        #[arg(long, value_name = "FILE")]
        path: PathBuf,
    },
    /// Push unsynced records to Bitrix24
    Sync {
        /// Maximum number of records to process
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Full import followed by a sync batch
    Run {
        /// Maximum number of records to sync
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show record counts and import timestamps
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import today's users and sync on a fixed interval until Ctrl-C or SIGTERM
    Daemon {
        /// Maximum number of records to sync per tick
        #[arg(short, long)]
        limit: Option<usize>,
    },
}
