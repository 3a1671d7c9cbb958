use regex::Regex;
use rusqlite::Connection;

use crate::error::{PurseError, Result};

const MIN_DIGITS: usize = 4;

/// Next invoice number: highest trailing number in use plus one, keeping the
/// prefix of that invoice. `INV-0041` is followed by `INV-0042`.
pub fn next_invoice_number(conn: &Connection) -> Result<String> {
    let mut stmt = conn.prepare("SELECT invoice_number FROM invoices WHERE invoice_number IS NOT NULL")?;
    let numbers = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    next_after(numbers.iter().map(String::as_str))
}

fn next_after<'a>(existing: impl Iterator<Item = &'a str>) -> Result<String> {
    let re = Regex::new(r"^(.*?)(\d+)$").map_err(|e| PurseError::Other(e.to_string()))?;
    let mut best: Option<(u64, &str, usize)> = None;
    for number in existing {
        let Some(caps) = re.captures(number.trim()) else {
            continue;
        };
        let (Some(prefix), Some(digits)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let Ok(value) = digits.as_str().parse::<u64>() else {
            continue;
        };
        if best.map_or(true, |(max, _, _)| value > max) {
            best = Some((value, prefix.as_str(), digits.as_str().len()));
        }
    }
    let next = match best {
        Some((max, prefix, width)) => {
            let width = width.max(MIN_DIGITS);
            format!("{prefix}{:0width$}", max + 1)
        }
        None => format!("{:0width$}", 1, width = MIN_DIGITS),
    };
    Ok(next)
}
