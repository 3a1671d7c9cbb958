pub mod delete;
pub mod export;
pub mod import;
pub mod init;
pub mod invoices;
pub mod recurring;
pub mod status;
pub mod upload;
pub mod wipe;

use clap::{Parser, Subcommand, ValueEnum};

use crate::db::Store;
use crate::error::{PurseError, Result};
use crate::settings::load_settings;

/// Open the store named in settings. Fails if `purse init` has not been run.
pub(crate) fn open_store() -> Result<Store> {
    let db_path = load_settings().db_path();
    if !db_path.exists() {
        return Err(PurseError::Settings(format!(
            "No database found at {}\nRun `purse init` to create one.",
            db_path.display()
        )));
    }
    Store::open(&db_path)
}

#[derive(Parser)]
#[command(name = "purse", about = "Personal finance tracker: backups, restores and cloud migration.")]
pub struct Cli {
    /// Log progress to stderr (overridden by PURSE_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the local store.
    Init {
        /// Path for purse data (default: ~/Documents/purse)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Show the data directory, store size and record counts.
    Status,
    /// Write a JSON snapshot of every collection.
    Export {
        /// Output path (default: <data_dir>/backups/purse-YYYYMMDD-HHMMSS.json)
        #[arg(long)]
        output: Option<String>,
    },
    /// Replace all local data with the contents of a snapshot file.
    Import {
        /// Snapshot file: a purse export or a dump from the cloud store
        file: String,
        /// Let the store assign new ids and remap references
        #[arg(long = "fresh-ids")]
        fresh_ids: bool,
    },
    /// Send a snapshot to the remote store.
    Upload {
        /// Snapshot file to send (default: export the local store now)
        #[arg(long)]
        file: Option<String>,
    },
    /// Erase every record, locally or on the remote store.
    Wipe {
        #[arg(value_enum)]
        target: WipeTarget,
        /// Skip prompts. Must be given twice (`--yes --yes`).
        #[arg(long, action = clap::ArgAction::Count)]
        yes: u8,
    },
    /// Delete one record, applying cascade rules to its dependents.
    Delete {
        /// Collection name, e.g. lists, savings, clients
        collection: String,
        id: i64,
    },
    /// Invoice helpers.
    Invoices {
        #[command(subcommand)]
        command: InvoicesCommands,
    },
    /// Recurring expense helpers.
    Recurring {
        #[command(subcommand)]
        command: RecurringCommands,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum WipeTarget {
    Local,
    Remote,
}

#[derive(Subcommand)]
pub enum InvoicesCommands {
    /// Print the next free invoice number.
    NextNumber,
}

#[derive(Subcommand)]
pub enum RecurringCommands {
    /// Create this month's expenses from recurring parents.
    Spawn {
        /// Month: YYYY-MM
        #[arg(long)]
        month: String,
    },
}
