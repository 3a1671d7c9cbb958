use colored::Colorize;
use dialoguer::Confirm;

use super::WipeTarget;
use crate::error::{PurseError, Result};
use crate::remote::HttpRemote;
use crate::settings::load_settings;
use crate::wipe::{self, Confirmed, WipeConfirmation, WipeMethod};

fn ask(prompt: &str) -> bool {
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false)
}

/// Each `--yes` stands in for one of the two prompts.
fn confirm(what: &str, yes: u8) -> Result<Confirmed> {
    let cancelled = || PurseError::Other("Wipe cancelled.".into());
    if yes < 1 && !ask(&format!("Erase ALL records from the {what}?")) {
        return Err(cancelled());
    }
    let half = WipeConfirmation::new().confirm();
    if yes < 2 && !ask("This cannot be undone. Are you absolutely sure?") {
        return Err(cancelled());
    }
    Ok(half.confirm())
}

pub fn run(target: WipeTarget, yes: u8) -> Result<()> {
    match target {
        WipeTarget::Local => {
            let mut store = super::open_store()?;
            let confirmed = confirm(&format!("local store at {}", store.path().display()), yes)?;
            let report = wipe::wipe_local(&mut store, confirmed)?;
            match report.method {
                WipeMethod::Recreated => println!("{}", "Local store erased.".green()),
                WipeMethod::Cleared => {
                    println!(
                        "{} {}",
                        "Could not delete the store file; cleared every table instead:".yellow(),
                        report.fallback_reason.unwrap_or_default()
                    );
                }
            }
        }
        WipeTarget::Remote => {
            let remote = HttpRemote::from_settings(&load_settings())?;
            let confirmed = confirm("remote store", yes)?;
            let report = wipe::wipe_remote(&remote, confirmed)?;
            match report.total_deleted {
                Some(n) => println!("{}", format!("Remote store erased: {n} documents deleted.").green()),
                None => println!("{}", "Remote store erased.".green()),
            }
        }
    }
    Ok(())
}
