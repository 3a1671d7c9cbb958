use chrono::{Datelike, Months, NaiveDate, Utc};
use rusqlite::Connection;

use crate::db::{self, Store};
use crate::error::{PurseError, Result};
use crate::models::{Collection, Expense};

pub struct SpawnResult {
    pub created: usize,
    pub skipped: usize,
}

/// Parse a `YYYY-MM` month into its first day.
pub fn parse_month(month: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", month.trim()), "%Y-%m-%d")
        .map_err(|_| PurseError::Other(format!("Invalid month '{month}', expected YYYY-MM")))
}

fn last_day_of_month(first: NaiveDate) -> u32 {
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .map_or(31, |d| d.day())
}

fn parent_date(expense: &Expense) -> Option<NaiveDate> {
    let date = expense.date.as_deref()?;
    NaiveDate::parse_from_str(date.get(..10)?, "%Y-%m-%d").ok()
}

/// Whether a parent is due in `month`. Monthly (or unspecified) parents are
/// due every month after their own; yearly ones only in their anniversary month.
fn is_due(parent: &Expense, start: NaiveDate, month: NaiveDate) -> bool {
    if (start.year(), start.month()) >= (month.year(), month.month()) {
        return false;
    }
    match parent.recurring_frequency.as_deref() {
        None | Some("monthly") => true,
        Some("yearly") => start.month() == month.month(),
        Some(_) => false,
    }
}

fn has_child_in_month(conn: &Connection, parent_id: i64, month: NaiveDate) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT count(*) FROM expenses WHERE parent_recurring_id = ?1 AND substr(date, 1, 7) = ?2",
        rusqlite::params![parent_id, month.format("%Y-%m").to_string()],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

fn recurring_parents(conn: &Connection) -> Result<Vec<Expense>> {
    let mut parents = Vec::new();
    for record in db::list(conn, Collection::Expenses)? {
        let expense: Expense = serde_json::from_value(record)?;
        if expense.is_recurring == Some(true) && expense.parent_recurring_id.is_none() {
            parents.push(expense);
        }
    }
    Ok(parents)
}

/// Create this month's child expense for every recurring parent that is due.
/// Children land on the parent's day of month, clamped to the month's end.
pub fn spawn_for_month(store: &mut Store, month: NaiveDate) -> Result<SpawnResult> {
    let first = month.with_day(1).unwrap_or(month);
    let last_day = last_day_of_month(first);
    store.run_atomic(|tx| {
        let mut result = SpawnResult { created: 0, skipped: 0 };
        for parent in recurring_parents(tx)? {
            let (Some(parent_id), Some(start)) = (parent.id, parent_date(&parent)) else {
                result.skipped += 1;
                continue;
            };
            if !is_due(&parent, start, first) || has_child_in_month(tx, parent_id, first)? {
                result.skipped += 1;
                continue;
            }
            let date = first.with_day(start.day().min(last_day)).unwrap_or(first);
            let child = Expense {
                id: None,
                mongo_id: None,
                is_recurring: Some(false),
                recurring_frequency: None,
                parent_recurring_id: Some(parent_id),
                date: Some(date.format("%Y-%m-%d").to_string()),
                created_at: Some(Utc::now().to_rfc3339()),
                ..parent
            };
            db::add(tx, Collection::Expenses, &serde_json::to_value(&child)?)?;
            result.created += 1;
        }
        tracing::info!(
            month = %first.format("%Y-%m"),
            created = result.created,
            skipped = result.skipped,
            "Recurring expenses spawned"
        );
        Ok(result)
    })
}
