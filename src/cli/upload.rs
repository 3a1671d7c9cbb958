use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::remote::{HttpRemote, RemoteStore};
use crate::settings::load_settings;
use crate::snapshot::{self, Snapshot};

pub fn run(file: Option<String>) -> Result<()> {
    let remote = HttpRemote::from_settings(&load_settings())?;
    let snapshot = match file {
        Some(path) => Snapshot::from_json(&snapshot::read_file(Path::new(&path))?)?,
        None => snapshot::export(super::open_store()?.conn())?,
    };
    println!("Uploading {} records...", snapshot.total_records());
    let report = remote.upload(&snapshot)?;

    let mut table = Table::new();
    table.set_header(vec!["Collection", "Imported", "Errors"]);
    for (name, result) in &report.details {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(result.imported),
            Cell::new(result.errors.len()),
        ]);
    }
    println!("{table}");
    for (name, result) in &report.details {
        for e in &result.errors {
            let id = e.id.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "-".into());
            println!("  {name} {id}: {}", e.error);
        }
    }

    let line = format!(
        "Remote import: {} imported, {} errors.",
        report.summary.imported, report.summary.errors
    );
    if report.summary.errors == 0 {
        println!("{}", line.green());
    } else {
        println!("{}", line.yellow());
    }
    Ok(())
}
