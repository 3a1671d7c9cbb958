use crate::error::Result;
use crate::recurring::{parse_month, spawn_for_month};

pub fn spawn(month: &str) -> Result<()> {
    let first = parse_month(month)?;
    let mut store = super::open_store()?;
    let result = spawn_for_month(&mut store, first)?;
    println!(
        "{month}: created {} recurring expenses, skipped {}",
        result.created, result.skipped
    );
    Ok(())
}
