use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::db::{self, Store};
use crate::error::{PurseError, Result};
use crate::importer::{import_collections, ImportOptions, ImportReport};
use crate::models::Collection;
use crate::transform::transform;

/// Every collection plus the time it was taken. Also the upload payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub clients: Vec<Value>,
    pub income: Vec<Value>,
    pub expenses: Vec<Value>,
    pub debts: Vec<Value>,
    pub goals: Vec<Value>,
    pub invoices: Vec<Value>,
    pub todos: Vec<Value>,
    pub lists: Vec<Value>,
    pub savings: Vec<Value>,
    pub savings_transactions: Vec<Value>,
    pub opening_balances: Vec<Value>,
    pub expected_income: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
}

impl Snapshot {
    pub fn records(&self, collection: Collection) -> &[Value] {
        match collection {
            Collection::Clients => &self.clients,
            Collection::Income => &self.income,
            Collection::Expenses => &self.expenses,
            Collection::Debts => &self.debts,
            Collection::Goals => &self.goals,
            Collection::Invoices => &self.invoices,
            Collection::Todos => &self.todos,
            Collection::Lists => &self.lists,
            Collection::Savings => &self.savings,
            Collection::SavingsTransactions => &self.savings_transactions,
            Collection::OpeningBalances => &self.opening_balances,
            Collection::ExpectedIncome => &self.expected_income,
        }
    }

    fn records_mut(&mut self, collection: Collection) -> &mut Vec<Value> {
        match collection {
            Collection::Clients => &mut self.clients,
            Collection::Income => &mut self.income,
            Collection::Expenses => &mut self.expenses,
            Collection::Debts => &mut self.debts,
            Collection::Goals => &mut self.goals,
            Collection::Invoices => &mut self.invoices,
            Collection::Todos => &mut self.todos,
            Collection::Lists => &mut self.lists,
            Collection::Savings => &mut self.savings,
            Collection::SavingsTransactions => &mut self.savings_transactions,
            Collection::OpeningBalances => &mut self.opening_balances,
            Collection::ExpectedIncome => &mut self.expected_income,
        }
    }

    pub fn total_records(&self) -> usize {
        Collection::ALL.iter().map(|c| self.records(*c).len()).sum()
    }

    /// Validate untyped input and turn it into a snapshot.
    ///
    /// Rejects anything that is not an object, members that are not arrays,
    /// and backups with no clients, income, expenses, debts or goals.
    pub fn from_json(raw: &Value) -> Result<Self> {
        let Some(obj) = raw.as_object() else {
            return Err(PurseError::InvalidBackup("backup is not a JSON object".into()));
        };
        let mut snapshot = Snapshot {
            exported_at: obj.get("exportedAt").and_then(Value::as_str).map(String::from),
            ..Default::default()
        };
        for collection in Collection::ALL {
            match obj.get(collection.key()) {
                None | Some(Value::Null) => {}
                Some(Value::Array(items)) => *snapshot.records_mut(collection) = items.clone(),
                Some(_) => {
                    return Err(PurseError::InvalidBackup(format!(
                        "{} is not an array",
                        collection.key()
                    )))
                }
            }
        }
        if Collection::PRIMARY.iter().all(|c| snapshot.records(*c).is_empty()) {
            return Err(PurseError::InvalidBackup(
                "no clients, income, expenses, debts or goals found".into(),
            ));
        }
        Ok(snapshot)
    }
}

pub fn export(conn: &Connection) -> Result<Snapshot> {
    let mut snapshot = Snapshot::default();
    for collection in Collection::ALL {
        *snapshot.records_mut(collection) = db::list(conn, collection)?;
    }
    snapshot.exported_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
    tracing::info!(records = snapshot.total_records(), "Exported snapshot");
    Ok(snapshot)
}

/// Validate, transform and import a backup. Invalid input fails before the
/// store is touched.
pub fn import(store: &mut Store, raw: &Value, options: ImportOptions) -> Result<ImportReport> {
    let mut snapshot = Snapshot::from_json(raw)?;
    let batches: Vec<(Collection, Vec<Value>)> = Collection::IMPORT_ORDER
        .iter()
        .map(|collection| {
            let records: Vec<Value> = std::mem::take(snapshot.records_mut(*collection))
                .into_iter()
                .map(|record| transform(*collection, record))
                .collect();
            (*collection, records)
        })
        .collect();
    import_collections(store, batches, options)
}

pub fn write_file(path: &Path, snapshot: &Snapshot) -> Result<u64> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(std::fs::metadata(path)?.len())
}

pub fn read_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| PurseError::InvalidBackup(format!("{} is not valid JSON: {e}", path.display())))
}

pub fn file_checksum(path: &Path) -> Result<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::ids::normalize_str;
    use serde_json::json;

    fn seed_store(store: &Store) {
        let conn = store.conn();
        for i in 1..=3 {
            db::add(conn, Collection::Clients, &json!({"name": format!("Client {i}")})).unwrap();
        }
        for i in 1..=5 {
            db::add(
                conn,
                Collection::Income,
                &json!({"clientId": (i % 3) + 1, "amount": 100.0 * i as f64, "date": "2024-05-01"}),
            )
            .unwrap();
        }
        let parent = db::add(
            conn,
            Collection::Expenses,
            &json!({"amount": 20.0, "isRecurring": true, "recurringFrequency": "monthly", "clientId": 1}),
        )
        .unwrap();
        db::add(
            conn,
            Collection::Expenses,
            &json!({"amount": 20.0, "parentRecurringId": parent, "clientId": 1}),
        )
        .unwrap();
    }

    fn assert_references_resolve(store: &Store) {
        let conn = store.conn();
        for collection in Collection::ALL {
            for reference in collection.references() {
                let targets: Vec<i64> = db::list(conn, reference.target)
                    .unwrap()
                    .iter()
                    .map(|r| r["id"].as_i64().unwrap())
                    .collect();
                for record in db::list(conn, collection).unwrap() {
                    if let Some(value) = record.get(reference.field) {
                        let id = value.as_i64().unwrap();
                        assert!(targets.contains(&id), "{collection}.{} = {id} dangles", reference.field);
                    }
                }
            }
        }
    }

    fn snapshot_json(store: &Store) -> Value {
        serde_json::to_value(export(store.conn()).unwrap()).unwrap()
    }

    #[test]
    fn test_export_counts_and_empty_collections() {
        let (_dir, store) = test_db();
        seed_store(&store);
        let snapshot = export(store.conn()).unwrap();
        assert_eq!(snapshot.clients.len(), 3);
        assert_eq!(snapshot.income.len(), 5);
        assert_eq!(snapshot.expenses.len(), 2);
        assert!(snapshot.exported_at.is_some());
        let raw = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(raw["savingsTransactions"], json!([]));
        assert!(raw["exportedAt"].is_string());
    }

    #[test]
    fn test_reimport_keeps_counts_and_recurring_link() {
        let (_dir, mut store) = test_db();
        seed_store(&store);
        let raw = snapshot_json(&store);
        let report = import(&mut store, &raw, ImportOptions::default()).unwrap();
        assert_eq!(report.total_errors(), 0);
        assert!(report.verification_warnings.is_empty());

        let after = export(store.conn()).unwrap();
        assert_eq!(after.clients.len(), 3);
        assert_eq!(after.income.len(), 5);
        assert_eq!(after.expenses.len(), 2);
        let parent = after.expenses.iter().find(|e| e["isRecurring"] == json!(true)).unwrap();
        let child = after.expenses.iter().find(|e| e.get("parentRecurringId").is_some()).unwrap();
        assert_eq!(child["parentRecurringId"], parent["id"]);
        assert_references_resolve(&store);
    }

    #[test]
    fn test_import_twice_is_idempotent() {
        let (_dir, mut store) = test_db();
        seed_store(&store);
        let raw = snapshot_json(&store);
        import(&mut store, &raw, ImportOptions::default()).unwrap();
        let first = export(store.conn()).unwrap();
        import(&mut store, &raw, ImportOptions::default()).unwrap();
        let second = export(store.conn()).unwrap();
        for collection in Collection::ALL {
            assert_eq!(first.records(collection), second.records(collection), "{collection} differs");
        }
    }

    #[test]
    fn test_foreign_dump_hex_references_resolve() {
        let (_dir, mut store) = test_db();
        let client_hex = "65a1f0c2e4b0a1b2c3d4e5f6";
        let raw = json!({
            "clients": [{"_id": client_hex, "name": "Acme", "__v": 0}],
            "expenses": [
                {"_id": "65a1f0c2e4b0a1b2c3d4e5f7", "amount": 12.5, "clientId": client_hex},
                {"_id": "65a1f0c2e4b0a1b2c3d4e5f8", "amount": 7.0, "clientId": {"_id": client_hex, "name": "Acme"}}
            ],
            "exportedAt": "2024-09-01T00:00:00.000Z"
        });
        let report = import(&mut store, &raw, ImportOptions::default()).unwrap();
        assert_eq!(report.total_errors(), 0);
        let client_id = normalize_str(client_hex).unwrap();
        let client = db::get(store.conn(), Collection::Clients, client_id).unwrap().unwrap();
        assert_eq!(client["mongoId"], json!(client_hex));
        for expense in db::list(store.conn(), Collection::Expenses).unwrap() {
            assert_eq!(expense["clientId"], json!(client_id));
        }
        assert_references_resolve(&store);
    }

    #[test]
    fn test_foreign_dump_import_is_idempotent() {
        let (_dir, mut store) = test_db();
        let raw = json!({
            "clients": [{"_id": "aaa111", "name": "A"}, {"_id": "bbb222", "name": "B"}],
            "expectedIncome": [{"_id": "ccc333", "clientId": "aaa111", "period": "2024-07", "amount": 10}],
            "openingBalances": [{"_id": "ddd444", "periodType": "month", "period": "2024-07", "amount": 5}]
        });
        import(&mut store, &raw, ImportOptions::default()).unwrap();
        let first = export(store.conn()).unwrap();
        import(&mut store, &raw, ImportOptions::default()).unwrap();
        let second = export(store.conn()).unwrap();
        assert_eq!(first.clients, second.clients);
        assert_eq!(first.expected_income, second.expected_income);
        assert_eq!(second.expected_income.len(), 1);
        assert_eq!(second.opening_balances[0]["periodType"], json!("monthly"));
    }

    #[test]
    fn test_goal_period_value_backfilled_on_import() {
        let (_dir, mut store) = test_db();
        let raw = json!({
            "goals": [{"id": 1, "title": "Holiday", "period": "quarterly", "createdAt": "2024-08-15T00:00:00Z"}]
        });
        import(&mut store, &raw, ImportOptions::default()).unwrap();
        let goal = db::get(store.conn(), Collection::Goals, 1).unwrap().unwrap();
        assert_eq!(goal["periodValue"], json!("2024-Q3"));
    }

    #[test]
    fn test_extended_json_dates_import_cleanly() {
        let (_dir, mut store) = test_db();
        let raw = json!({
            "clients": [{
                "_id": {"$oid": "65a1f0c2e4b0a1b2c3d4e5f6"},
                "name": "Acme",
                "createdAt": {"$date": "2024-01-02T00:00:00.000Z"}
            }],
            "goals": [{
                "_id": {"$oid": "65a1f0c2e4b0a1b2c3d4e5f8"},
                "title": "Save",
                "period": "monthly",
                "createdAt": {"$date": "2024-01-02T00:00:00.000Z"}
            }]
        });
        let report = import(&mut store, &raw, ImportOptions::default()).unwrap();
        assert_eq!(report.total_errors(), 0);
        let clients = db::list(store.conn(), Collection::Clients).unwrap();
        assert_eq!(clients[0]["createdAt"], json!("2024-01-02T00:00:00.000Z"));
        let goals = db::list(store.conn(), Collection::Goals).unwrap();
        assert_eq!(goals[0]["createdAt"], json!("2024-01-02T00:00:00.000Z"));
        assert_eq!(goals[0]["periodValue"], json!("2024-01"));
    }

    #[test]
    fn test_empty_input_rejected_without_touching_store() {
        let (_dir, mut store) = test_db();
        seed_store(&store);
        let inputs = [
            json!({}),
            json!(null),
            json!([1, 2]),
            json!({"clients": [], "income": [], "expenses": [], "debts": [], "goals": []}),
            json!({"todos": [{"title": "only todos"}]}),
            json!({"clients": "nope"}),
        ];
        for raw in inputs {
            let err = import(&mut store, &raw, ImportOptions::default()).unwrap_err();
            assert!(matches!(err, PurseError::InvalidBackup(_)), "{raw} gave {err}");
        }
        assert_eq!(db::count(store.conn(), Collection::Clients).unwrap(), 3);
        assert_eq!(db::count(store.conn(), Collection::Income).unwrap(), 5);
    }

    #[test]
    fn test_file_roundtrip_and_checksum() {
        let (dir, store) = test_db();
        seed_store(&store);
        let path = dir.path().join("backups").join("snap.json");
        let size = write_file(&path, &export(store.conn()).unwrap()).unwrap();
        assert!(size > 0);
        let raw = read_file(&path).unwrap();
        assert_eq!(raw["clients"].as_array().unwrap().len(), 3);
        assert_eq!(file_checksum(&path).unwrap().len(), 64);
    }

    #[test]
    fn test_read_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(read_file(&path), Err(PurseError::InvalidBackup(_))));
    }
}
