use std::path::PathBuf;

use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::get_data_dir;
use crate::snapshot;

pub fn run(output: Option<String>) -> Result<()> {
    let store = super::open_store()?;

    let dest_path = match output {
        Some(p) => PathBuf::from(p),
        None => {
            let backups_dir = get_data_dir().join("backups");
            std::fs::create_dir_all(&backups_dir)?;
            let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
            backups_dir.join(format!("purse-{stamp}.json"))
        }
    };

    let snapshot = snapshot::export(store.conn())?;
    let size = snapshot::write_file(&dest_path, &snapshot)?;
    let checksum = snapshot::file_checksum(&dest_path)?;

    println!("Snapshot saved to {}", dest_path.display());
    println!("Records: {}", snapshot.total_records());
    println!("Size:    {}", format_bytes(size));
    println!("SHA-256: {checksum}");
    Ok(())
}
