use crate::cascade::delete_record;
use crate::error::{PurseError, Result};
use crate::models::Collection;

pub fn run(collection: &str, id: i64) -> Result<()> {
    let collection = Collection::from_name(collection)
        .ok_or_else(|| PurseError::NotFound(format!("collection '{collection}'")))?;
    let mut store = super::open_store()?;
    let outcome = delete_record(&mut store, collection, id)?;

    println!("Deleted {collection} {id}");
    if outcome.reassigned > 0 {
        println!("  {} dependents moved to the Default list", outcome.reassigned);
    }
    if outcome.deleted > 0 {
        println!("  {} dependents deleted", outcome.deleted);
    }
    if outcome.nullified > 0 {
        println!("  {} references cleared", outcome.nullified);
    }
    Ok(())
}
