use rusqlite::{Connection, OptionalExtension};

use crate::db::{self, Store, DEFAULT_LIST_NAME};
use crate::error::{PurseError, Result};
use crate::models::Collection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeAction {
    /// Move dependents to the "Default" list, or delete them when there is none.
    ReassignToDefaultList,
    DeleteDependents,
    Nullify,
}

/// What happens to rows in `dependent` whose `field` points at a deleted record.
#[derive(Debug, Clone, Copy)]
pub struct CascadeRule {
    pub dependent: Collection,
    pub field: &'static str,
    pub action: CascadeAction,
}

const fn rule(dependent: Collection, field: &'static str, action: CascadeAction) -> CascadeRule {
    CascadeRule {
        dependent,
        field,
        action,
    }
}

const LIST_RULES: &[CascadeRule] = &[rule(
    Collection::Todos,
    "listId",
    CascadeAction::ReassignToDefaultList,
)];

const SAVINGS_RULES: &[CascadeRule] = &[rule(
    Collection::SavingsTransactions,
    "savingsId",
    CascadeAction::DeleteDependents,
)];

const CLIENT_RULES: &[CascadeRule] = &[
    rule(Collection::Income, "clientId", CascadeAction::Nullify),
    rule(Collection::Expenses, "clientId", CascadeAction::Nullify),
    rule(Collection::Invoices, "clientId", CascadeAction::Nullify),
    rule(Collection::ExpectedIncome, "clientId", CascadeAction::Nullify),
];

const EXPENSE_RULES: &[CascadeRule] = &[rule(
    Collection::Expenses,
    "parentRecurringId",
    CascadeAction::Nullify,
)];

pub fn rules_for(collection: Collection) -> &'static [CascadeRule] {
    match collection {
        Collection::Lists => LIST_RULES,
        Collection::Savings => SAVINGS_RULES,
        Collection::Clients => CLIENT_RULES,
        Collection::Expenses => EXPENSE_RULES,
        _ => &[],
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub reassigned: usize,
    pub deleted: usize,
    pub nullified: usize,
}

/// Delete one record and apply its cascade rules, all in one transaction.
pub fn delete_record(store: &mut Store, collection: Collection, id: i64) -> Result<CascadeOutcome> {
    store.run_atomic(|tx| {
        if db::get(tx, collection, id)?.is_none() {
            return Err(PurseError::NotFound(format!("{collection} id {id}")));
        }
        let mut outcome = CascadeOutcome::default();
        for rule in rules_for(collection) {
            apply_rule(tx, rule, id, &mut outcome)?;
        }
        db::delete(tx, collection, id)?;
        tracing::info!(
            collection = %collection,
            id,
            reassigned = outcome.reassigned,
            deleted = outcome.deleted,
            nullified = outcome.nullified,
            "Record deleted"
        );
        Ok(outcome)
    })
}

fn apply_rule(conn: &Connection, rule: &CascadeRule, id: i64, outcome: &mut CascadeOutcome) -> Result<()> {
    let column = rule
        .dependent
        .column(rule.field)
        .ok_or_else(|| PurseError::Other(format!("{} has no field {}", rule.dependent, rule.field)))?;
    let table = rule.dependent.table();
    match rule.action {
        CascadeAction::Nullify => {
            outcome.nullified += conn.execute(
                &format!("UPDATE {table} SET {col} = NULL WHERE {col} = ?1", col = column.name),
                [id],
            )?;
        }
        CascadeAction::DeleteDependents => {
            outcome.deleted += conn.execute(
                &format!("DELETE FROM {table} WHERE {} = ?1", column.name),
                [id],
            )?;
        }
        CascadeAction::ReassignToDefaultList => match fallback_list(conn, id)? {
            Some(fallback) => {
                outcome.reassigned += conn.execute(
                    &format!("UPDATE {table} SET {col} = ?1 WHERE {col} = ?2", col = column.name),
                    [fallback, id],
                )?;
            }
            None => {
                outcome.deleted += conn.execute(
                    &format!("DELETE FROM {table} WHERE {} = ?1", column.name),
                    [id],
                )?;
            }
        },
    }
    Ok(())
}

/// The Default list, unless it is the one being deleted.
fn fallback_list(conn: &Connection, deleting: i64) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM lists WHERE name = ?1 AND id != ?2 ORDER BY id LIMIT 1",
            rusqlite::params![DEFAULT_LIST_NAME, deleting],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}
