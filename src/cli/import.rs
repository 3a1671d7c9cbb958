use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::importer::{ImportOptions, ImportOutcome, ImportReport};
use crate::snapshot;

const MAX_ERRORS_SHOWN: usize = 10;

pub fn run(file: &str, fresh_ids: bool) -> Result<()> {
    let raw = snapshot::read_file(Path::new(file))?;
    let mut store = super::open_store()?;
    let report = snapshot::import(&mut store, &raw, ImportOptions { fresh_ids })?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &ImportReport) {
    let mut table = Table::new();
    table.set_header(vec!["Collection", "Attempted", "Imported", "Errors", "Unresolved refs"]);
    for (collection, c) in &report.collections {
        table.add_row(vec![
            Cell::new(collection),
            Cell::new(c.attempted),
            Cell::new(c.imported),
            Cell::new(c.errors.len()),
            Cell::new(c.unresolved_references),
        ]);
    }
    println!("{table}");

    let errors: Vec<_> = report
        .collections
        .iter()
        .flat_map(|(collection, c)| c.errors.iter().map(move |e| (collection, e)))
        .collect();
    for (collection, e) in errors.iter().take(MAX_ERRORS_SHOWN) {
        let id = e.id.map(|id| id.to_string()).unwrap_or_else(|| "-".into());
        println!("  {collection} {id}: {}", e.error);
    }
    if errors.len() > MAX_ERRORS_SHOWN {
        println!("  ... and {} more", errors.len() - MAX_ERRORS_SHOWN);
    }
    for (collection, c) in &report.collections {
        if !c.dropped_fields.is_empty() {
            let fields: Vec<&str> = c.dropped_fields.iter().map(String::as_str).collect();
            println!("  {collection}: fields not stored: {}", fields.join(", "));
        }
    }
    for warning in &report.verification_warnings {
        println!("{} {warning}", "Warning:".yellow());
    }
    if report.remapped > 0 {
        println!("Remapped {} references.", report.remapped);
    }

    match report.outcome() {
        ImportOutcome::Complete => println!(
            "{}",
            format!("Import complete: {} records.", report.total_imported()).green()
        ),
        ImportOutcome::CompleteWithErrors => println!(
            "{}",
            format!(
                "Import complete with errors: {} records imported, {} failed.",
                report.total_imported(),
                report.total_errors()
            )
            .yellow()
        ),
    }
}
