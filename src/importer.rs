use std::collections::{BTreeMap, BTreeSet, HashMap};

use rusqlite::Connection;
use serde_json::Value;

use crate::db::{self, Store};
use crate::error::{PurseError, Result};
use crate::ids::normalize;
use crate::models::{Collection, Reference};

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Ignore incoming ids and let the store assign new ones. References are
    /// rewritten to the new ids by the remapping pass.
    pub fresh_ids: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordError {
    pub id: Option<i64>,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionReport {
    pub attempted: usize,
    pub imported: usize,
    pub errors: Vec<RecordError>,
    /// References that pointed at no imported row and were cleared.
    pub unresolved_references: usize,
    /// Incoming fields with no column in the local schema. Not stored.
    pub dropped_fields: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Complete,
    CompleteWithErrors,
}

#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub collections: BTreeMap<Collection, CollectionReport>,
    /// References rewritten by the remapping pass.
    pub remapped: usize,
    /// Collections whose post-commit count differs from the records attempted.
    /// The import has committed regardless.
    pub verification_warnings: Vec<String>,
}

impl ImportReport {
    pub fn total_imported(&self) -> usize {
        self.collections.values().map(|c| c.imported).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.collections.values().map(|c| c.errors.len()).sum()
    }

    pub fn outcome(&self) -> ImportOutcome {
        if self.total_errors() == 0 {
            ImportOutcome::Complete
        } else {
            ImportOutcome::CompleteWithErrors
        }
    }
}

/// Pre-import id -> id actually written, per collection.
type IdMaps = HashMap<Collection, HashMap<i64, i64>>;

/// Replace the contents of every collection with `batches` in one transaction.
///
/// Collections missing from `batches` end up empty. Individual records that
/// cannot be written are reported and skipped; an engine-level failure rolls
/// everything back and leaves the previous data in place.
pub fn import_collections(
    store: &mut Store,
    batches: Vec<(Collection, Vec<Value>)>,
    options: ImportOptions,
) -> Result<ImportReport> {
    let mut incoming: HashMap<Collection, Vec<Value>> = batches.into_iter().collect();
    let mut report = ImportReport::default();

    tracing::info!(
        records = incoming.values().map(Vec::len).sum::<usize>(),
        fresh_ids = options.fresh_ids,
        "Starting import"
    );

    store.run_atomic(|tx| {
        for collection in Collection::ALL {
            db::clear(tx, collection)?;
        }

        let mut id_maps = IdMaps::new();
        for collection in Collection::IMPORT_ORDER {
            let records = incoming.remove(&collection).unwrap_or_default();
            let entry = report.collections.entry(collection).or_default();
            let id_map = id_maps.entry(collection).or_default();
            write_collection(tx, collection, records, options, entry, id_map)?;
        }

        report.remapped = remap_references(tx, &id_maps, &mut report.collections)?;
        Ok(())
    })?;

    for (collection, entry) in &report.collections {
        let actual = db::count(store.conn(), *collection)?;
        if actual != entry.attempted as i64 {
            tracing::warn!(
                collection = %collection,
                attempted = entry.attempted,
                actual = actual,
                "Post-import count mismatch"
            );
            report.verification_warnings.push(format!(
                "{collection}: attempted {} records but found {actual}",
                entry.attempted
            ));
        }
    }

    tracing::info!(
        imported = report.total_imported(),
        errors = report.total_errors(),
        remapped = report.remapped,
        "Import committed"
    );
    Ok(report)
}

fn write_collection(
    conn: &Connection,
    collection: Collection,
    mut records: Vec<Value>,
    options: ImportOptions,
    entry: &mut CollectionReport,
    id_map: &mut HashMap<i64, i64>,
) -> Result<()> {
    // Explicit ids first, so an auto-assigned id never lands on one still to come.
    records.sort_by_key(|record| record.get("id").and_then(Value::as_i64).is_none());
    for mut record in records {
        entry.attempted += 1;
        let original_id = record.get("id").and_then(Value::as_i64);
        resolve_reference_values(collection, &mut record);

        match write_record(conn, collection, &record, original_id, options) {
            Ok(written_id) => {
                entry.imported += 1;
                entry
                    .dropped_fields
                    .extend(collection.unmapped_fields(&record).into_iter().map(String::from));
                if let Some(old) = original_id {
                    id_map.insert(old, written_id);
                }
            }
            Err(e) => {
                ensure_transaction_alive(conn)?;
                tracing::debug!(collection = %collection, id = ?original_id, error = %e, "Record skipped");
                entry.errors.push(RecordError {
                    id: original_id,
                    error: e.to_string(),
                });
            }
        }
    }
    if !entry.dropped_fields.is_empty() {
        tracing::debug!(
            collection = %collection,
            fields = ?entry.dropped_fields,
            "Fields without a local column were not stored"
        );
    }
    Ok(())
}

/// Turn every reference value into an integer in the pre-import id space.
fn resolve_reference_values(collection: Collection, record: &mut Value) {
    let Some(obj) = record.as_object_mut() else {
        return;
    };
    for reference in collection.references() {
        let Some(value) = obj.get_mut(reference.field) else {
            continue;
        };
        *value = normalize(value).map(Value::from).unwrap_or(Value::Null);
    }
}

fn write_record(
    conn: &Connection,
    collection: Collection,
    record: &Value,
    original_id: Option<i64>,
    options: ImportOptions,
) -> Result<i64> {
    collection.validate(record).map_err(PurseError::InvalidRecord)?;
    match original_id {
        Some(_) if !options.fresh_ids => db::put(conn, collection, record),
        _ => db::add(conn, collection, record),
    }
}

/// SQLite can roll the whole transaction back on its own (e.g. a
/// `RAISE(ROLLBACK)` trigger). Continuing would write in autocommit mode.
fn ensure_transaction_alive(conn: &Connection) -> Result<()> {
    if conn.is_autocommit() {
        return Err(PurseError::TransactionAborted(
            "the storage engine rolled back the import".into(),
        ));
    }
    Ok(())
}

fn remap_references(
    conn: &Connection,
    id_maps: &IdMaps,
    reports: &mut BTreeMap<Collection, CollectionReport>,
) -> Result<usize> {
    let mut remapped = 0usize;
    for collection in Collection::IMPORT_ORDER {
        for reference in collection.references() {
            let empty = HashMap::new();
            let map = id_maps.get(&reference.target).unwrap_or(&empty);
            let entry = reports.entry(collection).or_default();
            remapped += remap_reference(conn, collection, reference, map, entry)?;
        }
    }
    Ok(remapped)
}

fn remap_reference(
    conn: &Connection,
    collection: Collection,
    reference: &Reference,
    map: &HashMap<i64, i64>,
    entry: &mut CollectionReport,
) -> Result<usize> {
    let column = collection
        .column(reference.field)
        .ok_or_else(|| PurseError::Other(format!("{collection} has no field {}", reference.field)))?;
    let rows: Vec<(i64, i64)> = conn
        .prepare(&format!(
            "SELECT id, {col} FROM {table} WHERE {col} IS NOT NULL",
            col = column.name,
            table = collection.table()
        ))?
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut remapped = 0usize;
    for (id, current) in rows {
        let target = map.get(&current).copied();
        if target == Some(current) {
            continue;
        }
        if target.is_none() {
            tracing::warn!(
                collection = %collection,
                id = id,
                field = reference.field,
                value = current,
                "Reference points at no imported {}; clearing it",
                reference.target
            );
            entry.unresolved_references += 1;
        }
        match db::set_reference(conn, collection, id, reference.field, target) {
            Ok(()) => {
                if target.is_some() {
                    remapped += 1;
                }
            }
            Err(e) => {
                ensure_transaction_alive(conn)?;
                entry.errors.push(RecordError {
                    id: Some(id),
                    error: e.to_string(),
                });
            }
        }
    }
    Ok(remapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use serde_json::json;

    fn seed_old_data(store: &Store) {
        let conn = store.conn();
        db::put(conn, Collection::Clients, &json!({"id": 100, "name": "Old Client"})).unwrap();
        db::put(conn, Collection::Todos, &json!({"id": 5, "title": "Old todo"})).unwrap();
        db::put(conn, Collection::Debts, &json!({"id": 8, "name": "Loan", "amount": 900.0})).unwrap();
    }

    #[test]
    fn test_import_replaces_every_collection() {
        let (_dir, mut store) = test_db();
        seed_old_data(&store);
        let report = import_collections(
            &mut store,
            vec![(Collection::Clients, vec![json!({"id": 1, "name": "New"})])],
            ImportOptions::default(),
        )
        .unwrap();
        assert_eq!(report.total_imported(), 1);
        assert_eq!(report.outcome(), ImportOutcome::Complete);
        let conn = store.conn();
        assert_eq!(db::count(conn, Collection::Clients).unwrap(), 1);
        assert_eq!(db::count(conn, Collection::Todos).unwrap(), 0);
        assert_eq!(db::count(conn, Collection::Debts).unwrap(), 0);
    }

    #[test]
    fn test_bad_record_does_not_abort_batch() {
        let (_dir, mut store) = test_db();
        let report = import_collections(
            &mut store,
            vec![
                (
                    Collection::Income,
                    vec![
                        json!({"id": 1, "amount": 10.0}),
                        json!({"id": 2, "amount": "ten"}),
                        json!({"id": 3, "amount": 30.0}),
                    ],
                ),
                (Collection::Debts, vec![json!({"id": 1, "name": "Card", "amount": 5.0})]),
            ],
            ImportOptions::default(),
        )
        .unwrap();
        assert_eq!(
            report.verification_warnings,
            vec!["income: attempted 3 records but found 2".to_string()]
        );
        let income = &report.collections[&Collection::Income];
        assert_eq!(income.attempted, 3);
        assert_eq!(income.imported, 2);
        assert_eq!(income.errors.len(), 1);
        assert_eq!(income.errors[0].id, Some(2));
        assert_eq!(report.outcome(), ImportOutcome::CompleteWithErrors);
        assert_eq!(db::count(store.conn(), Collection::Debts).unwrap(), 1);
    }

    #[test]
    fn test_composite_key_duplicate_reported() {
        let (_dir, mut store) = test_db();
        let report = import_collections(
            &mut store,
            vec![(
                Collection::OpeningBalances,
                vec![
                    json!({"id": 1, "periodType": "monthly", "period": "2024-01", "amount": 1.0}),
                    json!({"id": 2, "periodType": "monthly", "period": "2024-01", "amount": 2.0}),
                ],
            )],
            ImportOptions::default(),
        )
        .unwrap();
        let balances = &report.collections[&Collection::OpeningBalances];
        assert_eq!(balances.imported, 1);
        assert_eq!(balances.errors.len(), 1);
        assert_eq!(db::count(store.conn(), Collection::OpeningBalances).unwrap(), 1);
    }

    #[test]
    fn test_fresh_ids_remaps_references() {
        let (_dir, mut store) = test_db();
        let report = import_collections(
            &mut store,
            vec![
                (Collection::Clients, vec![json!({"id": 500, "name": "Acme"})]),
                (
                    Collection::Expenses,
                    vec![
                        json!({"id": 900, "amount": 50.0, "clientId": 500, "isRecurring": true}),
                        json!({"id": 901, "amount": 50.0, "clientId": 500, "parentRecurringId": 900}),
                    ],
                ),
            ],
            ImportOptions { fresh_ids: true },
        )
        .unwrap();
        assert!(report.remapped >= 3);
        let conn = store.conn();
        let clients = db::list(conn, Collection::Clients).unwrap();
        let client_id = clients[0]["id"].as_i64().unwrap();
        assert_ne!(client_id, 500);
        let expenses = db::list(conn, Collection::Expenses).unwrap();
        let parent = expenses.iter().find(|e| e.get("parentRecurringId").is_none()).unwrap();
        let child = expenses.iter().find(|e| e.get("parentRecurringId").is_some()).unwrap();
        assert_eq!(child["parentRecurringId"], parent["id"]);
        for expense in &expenses {
            assert_eq!(expense["clientId"].as_i64(), Some(client_id));
        }
    }

    #[test]
    fn test_unresolved_reference_is_cleared() {
        let (_dir, mut store) = test_db();
        let report = import_collections(
            &mut store,
            vec![
                (Collection::Lists, vec![json!({"id": 1, "name": "Work"})]),
                (
                    Collection::Todos,
                    vec![
                        json!({"id": 1, "title": "kept", "listId": 1}),
                        json!({"id": 2, "title": "orphan", "listId": 77}),
                    ],
                ),
            ],
            ImportOptions::default(),
        )
        .unwrap();
        assert_eq!(report.collections[&Collection::Todos].unresolved_references, 1);
        let orphan = db::get(store.conn(), Collection::Todos, 2).unwrap().unwrap();
        assert!(orphan.get("listId").is_none());
        let kept = db::get(store.conn(), Collection::Todos, 1).unwrap().unwrap();
        assert_eq!(kept["listId"], json!(1));
    }

    #[test]
    fn test_id_less_record_does_not_collide_with_explicit_id() {
        let (_dir, mut store) = test_db();
        let report = import_collections(
            &mut store,
            vec![(
                Collection::Lists,
                vec![json!({"name": "A"}), json!({"id": 1, "name": "B"})],
            )],
            ImportOptions::default(),
        )
        .unwrap();
        assert!(report.verification_warnings.is_empty());
        let lists = db::list(store.conn(), Collection::Lists).unwrap();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0], json!({"id": 1, "name": "B"}));
        assert_eq!(lists[1]["name"], "A");
        assert_eq!(report.collections[&Collection::Lists].imported, 2);
    }

    #[test]
    fn test_unknown_fields_are_reported() {
        let (_dir, mut store) = test_db();
        let report = import_collections(
            &mut store,
            vec![(
                Collection::Clients,
                vec![
                    json!({"id": 1, "name": "Acme", "website": "acme.test"}),
                    json!({"id": 2, "name": "Globex", "website": "globex.test", "vatNumber": "X1"}),
                ],
            )],
            ImportOptions::default(),
        )
        .unwrap();
        let clients = &report.collections[&Collection::Clients];
        assert_eq!(clients.imported, 2);
        let dropped: Vec<&str> = clients.dropped_fields.iter().map(String::as_str).collect();
        assert_eq!(dropped, vec!["vatNumber", "website"]);
        assert!(report.collections[&Collection::Debts].dropped_fields.is_empty());
    }

    #[test]
    fn test_duplicate_ids_raise_verification_warning() {
        let (_dir, mut store) = test_db();
        let report = import_collections(
            &mut store,
            vec![(
                Collection::Debts,
                vec![
                    json!({"id": 4, "name": "A", "amount": 1.0}),
                    json!({"id": 4, "name": "B", "amount": 2.0}),
                ],
            )],
            ImportOptions::default(),
        )
        .unwrap();
        assert_eq!(report.verification_warnings.len(), 1);
        assert!(report.verification_warnings[0].contains("debts"));
        assert_eq!(report.outcome(), ImportOutcome::Complete);
    }

    #[test]
    fn test_engine_rollback_mid_import_keeps_old_data() {
        let (_dir, mut store) = test_db();
        seed_old_data(&store);
        store
            .conn()
            .execute_batch(
                "CREATE TRIGGER fail_savings BEFORE INSERT ON savings \
                 BEGIN SELECT RAISE(ROLLBACK, 'forced failure'); END;",
            )
            .unwrap();
        let err = import_collections(
            &mut store,
            vec![
                (Collection::Clients, vec![json!({"id": 1, "name": "New"})]),
                (Collection::Savings, vec![json!({"id": 1, "name": "Pot"})]),
                (Collection::Debts, vec![json!({"id": 1, "name": "New debt", "amount": 1.0})]),
            ],
            ImportOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PurseError::TransactionAborted(_)));
        let conn = store.conn();
        let clients = db::list(conn, Collection::Clients).unwrap();
        assert_eq!(clients, vec![json!({"id": 100, "name": "Old Client"})]);
        assert_eq!(db::count(conn, Collection::Todos).unwrap(), 1);
        assert_eq!(db::count(conn, Collection::Debts).unwrap(), 1);
        assert_eq!(db::count(conn, Collection::Savings).unwrap(), 0);
    }

    #[test]
    fn test_failed_clear_keeps_old_data() {
        let (_dir, mut store) = test_db();
        seed_old_data(&store);
        store
            .conn()
            .execute_batch(
                "CREATE TRIGGER fail_todo_delete BEFORE DELETE ON todos \
                 BEGIN SELECT RAISE(ABORT, 'forced failure'); END;",
            )
            .unwrap();
        let result = import_collections(
            &mut store,
            vec![(Collection::Clients, vec![json!({"id": 1, "name": "New"})])],
            ImportOptions::default(),
        );
        assert!(result.is_err());
        let conn = store.conn();
        assert_eq!(db::count(conn, Collection::Clients).unwrap(), 1);
        assert_eq!(db::get(conn, Collection::Clients, 100).unwrap().unwrap()["name"], json!("Old Client"));
        assert_eq!(db::count(conn, Collection::Debts).unwrap(), 1);
    }
}
