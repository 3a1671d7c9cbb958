use std::path::{Path, PathBuf};

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use serde_json::{Map, Number, Value};

use crate::error::{PurseError, Result};
use crate::models::{Collection, Column, ColumnKind};

pub const DB_FILE: &str = "purse.db";

pub const DEFAULT_LIST_NAME: &str = "Default";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS clients (
    id INTEGER PRIMARY KEY,
    mongo_id TEXT,
    name TEXT NOT NULL,
    email TEXT,
    phone TEXT,
    company TEXT,
    address TEXT,
    notes TEXT,
    created_at TEXT
);

CREATE TABLE IF NOT EXISTS income (
    id INTEGER PRIMARY KEY,
    mongo_id TEXT,
    client_id INTEGER,
    amount REAL NOT NULL,
    currency TEXT,
    date TEXT,
    description TEXT,
    category TEXT,
    created_at TEXT
);

CREATE TABLE IF NOT EXISTS expenses (
    id INTEGER PRIMARY KEY,
    mongo_id TEXT,
    client_id INTEGER,
    amount REAL NOT NULL,
    currency TEXT,
    date TEXT,
    category TEXT,
    description TEXT,
    is_recurring INTEGER,
    recurring_frequency TEXT,
    parent_recurring_id INTEGER,
    created_at TEXT
);

CREATE TABLE IF NOT EXISTS debts (
    id INTEGER PRIMARY KEY,
    mongo_id TEXT,
    name TEXT NOT NULL,
    amount REAL NOT NULL,
    paid_amount REAL,
    interest_rate REAL,
    due_date TEXT,
    creditor TEXT,
    notes TEXT,
    created_at TEXT
);

CREATE TABLE IF NOT EXISTS goals (
    id INTEGER PRIMARY KEY,
    mongo_id TEXT,
    title TEXT NOT NULL,
    target_amount REAL,
    current_amount REAL,
    period TEXT,
    period_value TEXT NOT NULL,
    deadline TEXT,
    created_at TEXT
);

CREATE TABLE IF NOT EXISTS invoices (
    id INTEGER PRIMARY KEY,
    mongo_id TEXT,
    invoice_number TEXT,
    client_id INTEGER,
    items TEXT,
    total REAL,
    currency TEXT,
    status TEXT,
    issue_date TEXT,
    due_date TEXT,
    created_at TEXT
);

CREATE TABLE IF NOT EXISTS todos (
    id INTEGER PRIMARY KEY,
    mongo_id TEXT,
    list_id INTEGER,
    title TEXT NOT NULL,
    completed INTEGER,
    due_date TEXT,
    priority TEXT,
    created_at TEXT
);

CREATE TABLE IF NOT EXISTS lists (
    id INTEGER PRIMARY KEY,
    mongo_id TEXT,
    name TEXT NOT NULL,
    color TEXT,
    created_at TEXT
);

CREATE TABLE IF NOT EXISTS savings (
    id INTEGER PRIMARY KEY,
    mongo_id TEXT,
    name TEXT NOT NULL,
    target_amount REAL,
    current_amount REAL,
    currency TEXT,
    created_at TEXT
);

CREATE TABLE IF NOT EXISTS savings_transactions (
    id INTEGER PRIMARY KEY,
    mongo_id TEXT,
    savings_id INTEGER,
    amount REAL NOT NULL,
    txn_type TEXT,
    date TEXT,
    note TEXT,
    created_at TEXT
);

CREATE TABLE IF NOT EXISTS opening_balances (
    id INTEGER PRIMARY KEY,
    mongo_id TEXT,
    period_type TEXT NOT NULL,
    period TEXT NOT NULL,
    amount REAL NOT NULL,
    currency TEXT,
    created_at TEXT,
    UNIQUE (period_type, period)
);

CREATE TABLE IF NOT EXISTS expected_income (
    id INTEGER PRIMARY KEY,
    mongo_id TEXT,
    client_id INTEGER,
    period TEXT NOT NULL,
    amount REAL NOT NULL,
    notes TEXT,
    created_at TEXT,
    UNIQUE (client_id, period)
);

CREATE INDEX IF NOT EXISTS idx_income_client ON income(client_id);
CREATE INDEX IF NOT EXISTS idx_expenses_client ON expenses(client_id);
CREATE INDEX IF NOT EXISTS idx_expenses_parent ON expenses(parent_recurring_id);
CREATE INDEX IF NOT EXISTS idx_todos_list ON todos(list_id);
CREATE INDEX IF NOT EXISTS idx_savings_txn_savings ON savings_transactions(savings_id);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Create the "Default" todo list if none exists. Returns its id.
pub fn ensure_default_list(conn: &Connection) -> Result<i64> {
    if let Some(id) = default_list_id(conn)? {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO lists (name, created_at) VALUES (?1, ?2)",
        rusqlite::params![DEFAULT_LIST_NAME, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn default_list_id(conn: &Connection) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM lists WHERE name = ?1 ORDER BY id LIMIT 1",
            [DEFAULT_LIST_NAME],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

// ---------------------------------------------------------------------------
// Store handle
// ---------------------------------------------------------------------------

/// Owned handle to the local database file.
pub struct Store {
    path: PathBuf,
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = get_connection(path)?;
        init_db(&conn)?;
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside one transaction covering every table. Any error rolls
    /// the whole transaction back.
    pub fn run_atomic<T>(&mut self, f: impl FnOnce(&Transaction) -> Result<T>) -> Result<T> {
        let tx = self.conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Close the connection and remove the database files.
    ///
    /// The handle points at an in-memory placeholder afterwards; call
    /// [`Store::reopen`] before using it again.
    pub fn delete_store(&mut self) -> Result<()> {
        let placeholder = Connection::open_in_memory()?;
        let conn = std::mem::replace(&mut self.conn, placeholder);
        if let Err((conn, e)) = conn.close() {
            self.conn = conn;
            return Err(PurseError::StoreBlocked(e.to_string()));
        }
        for suffix in ["", "-wal", "-shm"] {
            let file = PathBuf::from(format!("{}{suffix}", self.path.display()));
            match std::fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                    return Err(PurseError::StoreBlocked(format!("{}: {e}", file.display())));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub fn reopen(&mut self) -> Result<()> {
        let conn = get_connection(&self.path)?;
        init_db(&conn)?;
        self.conn = conn;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Record access
// ---------------------------------------------------------------------------

fn select_sql(collection: Collection) -> String {
    let cols: Vec<&str> = collection.columns().iter().map(|c| c.name).collect();
    format!(
        "SELECT id, mongo_id, {} FROM {}",
        cols.join(", "),
        collection.table()
    )
}

fn row_to_record(collection: Collection, row: &Row) -> rusqlite::Result<Value> {
    let mut map = Map::new();
    map.insert("id".into(), Value::from(row.get::<_, i64>(0)?));
    if let Some(mongo_id) = row.get::<_, Option<String>>(1)? {
        map.insert("mongoId".into(), Value::String(mongo_id));
    }
    for (i, column) in collection.columns().iter().enumerate() {
        let idx = i + 2;
        let value = match column.kind {
            ColumnKind::Integer => row.get::<_, Option<i64>>(idx)?.map(Value::from),
            ColumnKind::Real => row
                .get::<_, Option<f64>>(idx)?
                .and_then(Number::from_f64)
                .map(Value::Number),
            ColumnKind::Text => row.get::<_, Option<String>>(idx)?.map(Value::String),
            ColumnKind::Bool => row.get::<_, Option<i64>>(idx)?.map(|b| Value::Bool(b != 0)),
            ColumnKind::Json => row
                .get::<_, Option<String>>(idx)?
                .map(|s| serde_json::from_str(&s).unwrap_or(Value::String(s))),
        };
        if let Some(value) = value {
            map.insert(column.field.into(), value);
        }
    }
    Ok(Value::Object(map))
}

fn to_sql(column: &Column, value: Option<&Value>) -> Result<SqlValue> {
    let value = match value {
        None | Some(Value::Null) => return Ok(SqlValue::Null),
        Some(v) => v,
    };
    let mismatch = || {
        PurseError::InvalidRecord(format!(
            "field {} expects {:?}, got {value}",
            column.field, column.kind
        ))
    };
    let sql = match column.kind {
        ColumnKind::Integer => match value.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => match value.as_f64().filter(|f| f.fract() == 0.0) {
                Some(f) => SqlValue::Integer(f as i64),
                None => return Err(mismatch()),
            },
        },
        ColumnKind::Real => SqlValue::Real(value.as_f64().ok_or_else(mismatch)?),
        ColumnKind::Text => SqlValue::Text(value.as_str().ok_or_else(mismatch)?.to_string()),
        ColumnKind::Bool => match value {
            Value::Bool(b) => SqlValue::Integer(*b as i64),
            Value::Number(n) => SqlValue::Integer((n.as_f64().unwrap_or(0.0) != 0.0) as i64),
            _ => return Err(mismatch()),
        },
        ColumnKind::Json => SqlValue::Text(serde_json::to_string(value)?),
    };
    Ok(sql)
}

fn record_values(collection: Collection, record: &Value) -> Result<Vec<SqlValue>> {
    let obj = record
        .as_object()
        .ok_or_else(|| PurseError::InvalidRecord(format!("{collection} record is not an object")))?;
    let mongo_id = match obj.get("mongoId") {
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
        _ => SqlValue::Null,
    };
    let mut values = vec![mongo_id];
    for column in collection.columns() {
        values.push(to_sql(column, obj.get(column.field))?);
    }
    Ok(values)
}

pub fn list(conn: &Connection, collection: Collection) -> Result<Vec<Value>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY id", select_sql(collection)))?;
    let records = stmt
        .query_map([], |row| row_to_record(collection, row))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

pub fn get(conn: &Connection, collection: Collection, id: i64) -> Result<Option<Value>> {
    let record = conn
        .query_row(
            &format!("{} WHERE id = ?1", select_sql(collection)),
            [id],
            |row| row_to_record(collection, row),
        )
        .optional()?;
    Ok(record)
}

pub fn count(conn: &Connection, collection: Collection) -> Result<i64> {
    let n = conn.query_row(
        &format!("SELECT count(*) FROM {}", collection.table()),
        [],
        |row| row.get(0),
    )?;
    Ok(n)
}

pub fn clear(conn: &Connection, collection: Collection) -> Result<usize> {
    let removed = conn.execute(&format!("DELETE FROM {}", collection.table()), [])?;
    Ok(removed)
}

/// Upsert a record under its explicit `id`. Every column is overwritten, so
/// fields missing from `record` end up null.
pub fn put(conn: &Connection, collection: Collection, record: &Value) -> Result<i64> {
    let id = record
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| PurseError::InvalidRecord(format!("{collection} record has no integer id")))?;
    let names: Vec<&str> = collection.columns().iter().map(|c| c.name).collect();
    let placeholders: Vec<String> = (1..=names.len() + 2).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = std::iter::once("mongo_id")
        .chain(names.iter().copied())
        .map(|n| format!("{n} = excluded.{n}"))
        .collect();
    let sql = format!(
        "INSERT INTO {} (id, mongo_id, {}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
        collection.table(),
        names.join(", "),
        placeholders.join(", "),
        updates.join(", "),
    );
    let mut values = vec![SqlValue::Integer(id)];
    values.extend(record_values(collection, record)?);
    conn.prepare_cached(&sql)?
        .execute(rusqlite::params_from_iter(values))?;
    Ok(id)
}

/// Insert a record and let SQLite assign its id. Any `id` on `record` is ignored.
pub fn add(conn: &Connection, collection: Collection, record: &Value) -> Result<i64> {
    let names: Vec<&str> = collection.columns().iter().map(|c| c.name).collect();
    let placeholders: Vec<String> = (1..=names.len() + 1).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} (mongo_id, {}) VALUES ({})",
        collection.table(),
        names.join(", "),
        placeholders.join(", "),
    );
    let values = record_values(collection, record)?;
    conn.prepare_cached(&sql)?
        .execute(rusqlite::params_from_iter(values))?;
    Ok(conn.last_insert_rowid())
}

/// Set a single integer reference column on one row.
pub fn set_reference(
    conn: &Connection,
    collection: Collection,
    id: i64,
    field: &str,
    value: Option<i64>,
) -> Result<()> {
    let column = collection
        .column(field)
        .ok_or_else(|| PurseError::Other(format!("{collection} has no field {field}")))?;
    conn.execute(
        &format!("UPDATE {} SET {} = ?1 WHERE id = ?2", collection.table(), column.name),
        rusqlite::params![value, id],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, collection: Collection, id: i64) -> Result<usize> {
    let removed = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", collection.table()),
        [id],
    )?;
    Ok(removed)
}

#[cfg(test)]
pub(crate) fn test_db() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("test.db")).unwrap();
    (dir, store)
}
