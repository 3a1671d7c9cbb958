use comfy_table::{Cell, Table};

use crate::db::{count, Store};
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::models::Collection;
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();

    println!("User:       {}", if settings.user_name.is_empty() { "(not set)" } else { &settings.user_name });
    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!(
        "Remote:     {}",
        settings.resolved_remote_url().as_deref().unwrap_or("(not configured)")
    );

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `purse init` to set up.");
        return Ok(());
    }

    let size = std::fs::metadata(&db_path)?.len();
    println!("DB size:    {}", format_bytes(size));

    let store = Store::open(&db_path)?;
    let mut table = Table::new();
    table.set_header(vec!["Collection", "Records"]);
    let mut total = 0;
    for collection in Collection::ALL {
        let n = count(store.conn(), collection)?;
        total += n;
        table.add_row(vec![Cell::new(collection), Cell::new(n)]);
    }
    table.add_row(vec![Cell::new("total"), Cell::new(total)]);
    println!();
    println!("{table}");
    Ok(())
}
