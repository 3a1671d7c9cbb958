use crate::error::Result;
use crate::invoices::next_invoice_number;

pub fn next_number() -> Result<()> {
    let store = super::open_store()?;
    println!("{}", next_invoice_number(store.conn())?);
    Ok(())
}
