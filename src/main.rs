mod cascade;
mod cli;
mod db;
mod error;
mod fmt;
mod ids;
mod importer;
mod invoices;
mod logging;
mod models;
mod recurring;
mod remote;
mod settings;
mod snapshot;
mod transform;
mod wipe;

use clap::Parser;

use cli::{Cli, Commands, InvoicesCommands, RecurringCommands};

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Status => cli::status::run(),
        Commands::Export { output } => cli::export::run(output),
        Commands::Import { file, fresh_ids } => cli::import::run(&file, fresh_ids),
        Commands::Upload { file } => cli::upload::run(file),
        Commands::Wipe { target, yes } => cli::wipe::run(target, yes),
        Commands::Delete { collection, id } => cli::delete::run(&collection, id),
        Commands::Invoices { command } => match command {
            InvoicesCommands::NextNumber => cli::invoices::next_number(),
        },
        Commands::Recurring { command } => match command {
            RecurringCommands::Spawn { month } => cli::recurring::spawn(&month),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
