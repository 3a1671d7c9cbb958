use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Clients,
    Income,
    Expenses,
    Debts,
    Goals,
    Invoices,
    Todos,
    Lists,
    Savings,
    SavingsTransactions,
    OpeningBalances,
    ExpectedIncome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
    Bool,
    /// Arbitrary JSON stored as text (e.g. invoice line items).
    Json,
}

/// Mapping between a camelCase record field and its SQLite column.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub field: &'static str,
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(field: &'static str, name: &'static str, kind: ColumnKind) -> Column {
    Column { field, name, kind }
}

use ColumnKind::{Bool, Integer, Json, Real, Text};

const CLIENT_COLUMNS: &[Column] = &[
    col("name", "name", Text),
    col("email", "email", Text),
    col("phone", "phone", Text),
    col("company", "company", Text),
    col("address", "address", Text),
    col("notes", "notes", Text),
    col("createdAt", "created_at", Text),
];

const INCOME_COLUMNS: &[Column] = &[
    col("clientId", "client_id", Integer),
    col("amount", "amount", Real),
    col("currency", "currency", Text),
    col("date", "date", Text),
    col("description", "description", Text),
    col("category", "category", Text),
    col("createdAt", "created_at", Text),
];

const EXPENSE_COLUMNS: &[Column] = &[
    col("clientId", "client_id", Integer),
    col("amount", "amount", Real),
    col("currency", "currency", Text),
    col("date", "date", Text),
    col("category", "category", Text),
    col("description", "description", Text),
    col("isRecurring", "is_recurring", Bool),
    col("recurringFrequency", "recurring_frequency", Text),
    col("parentRecurringId", "parent_recurring_id", Integer),
    col("createdAt", "created_at", Text),
];

const DEBT_COLUMNS: &[Column] = &[
    col("name", "name", Text),
    col("amount", "amount", Real),
    col("paidAmount", "paid_amount", Real),
    col("interestRate", "interest_rate", Real),
    col("dueDate", "due_date", Text),
    col("creditor", "creditor", Text),
    col("notes", "notes", Text),
    col("createdAt", "created_at", Text),
];

const GOAL_COLUMNS: &[Column] = &[
    col("title", "title", Text),
    col("targetAmount", "target_amount", Real),
    col("currentAmount", "current_amount", Real),
    col("period", "period", Text),
    col("periodValue", "period_value", Text),
    col("deadline", "deadline", Text),
    col("createdAt", "created_at", Text),
];

const INVOICE_COLUMNS: &[Column] = &[
    col("invoiceNumber", "invoice_number", Text),
    col("clientId", "client_id", Integer),
    col("items", "items", Json),
    col("total", "total", Real),
    col("currency", "currency", Text),
    col("status", "status", Text),
    col("issueDate", "issue_date", Text),
    col("dueDate", "due_date", Text),
    col("createdAt", "created_at", Text),
];

const TODO_COLUMNS: &[Column] = &[
    col("listId", "list_id", Integer),
    col("title", "title", Text),
    col("completed", "completed", Bool),
    col("dueDate", "due_date", Text),
    col("priority", "priority", Text),
    col("createdAt", "created_at", Text),
];

const LIST_COLUMNS: &[Column] = &[
    col("name", "name", Text),
    col("color", "color", Text),
    col("createdAt", "created_at", Text),
];

const SAVINGS_COLUMNS: &[Column] = &[
    col("name", "name", Text),
    col("targetAmount", "target_amount", Real),
    col("currentAmount", "current_amount", Real),
    col("currency", "currency", Text),
    col("createdAt", "created_at", Text),
];

const SAVINGS_TRANSACTION_COLUMNS: &[Column] = &[
    col("savingsId", "savings_id", Integer),
    col("amount", "amount", Real),
    col("type", "txn_type", Text),
    col("date", "date", Text),
    col("note", "note", Text),
    col("createdAt", "created_at", Text),
];

const OPENING_BALANCE_COLUMNS: &[Column] = &[
    col("periodType", "period_type", Text),
    col("period", "period", Text),
    col("amount", "amount", Real),
    col("currency", "currency", Text),
    col("createdAt", "created_at", Text),
];

const EXPECTED_INCOME_COLUMNS: &[Column] = &[
    col("clientId", "client_id", Integer),
    col("period", "period", Text),
    col("amount", "amount", Real),
    col("notes", "notes", Text),
    col("createdAt", "created_at", Text),
];

/// A foreign-key field and the collection whose ids it points at.
#[derive(Debug, Clone, Copy)]
pub struct Reference {
    pub field: &'static str,
    pub target: Collection,
}

const fn reference(field: &'static str, target: Collection) -> Reference {
    Reference { field, target }
}

/// Foreign-key field names recognized on any record.
pub const FOREIGN_KEY_FIELDS: &[&str] = &["clientId", "listId", "savingsId", "parentRecurringId"];

impl Collection {
    /// Snapshot member order.
    pub const ALL: [Collection; 12] = [
        Collection::Clients,
        Collection::Income,
        Collection::Expenses,
        Collection::Debts,
        Collection::Goals,
        Collection::Invoices,
        Collection::Todos,
        Collection::Lists,
        Collection::Savings,
        Collection::SavingsTransactions,
        Collection::OpeningBalances,
        Collection::ExpectedIncome,
    ];

    /// Referenced collections come before the collections that point at them.
    pub const IMPORT_ORDER: [Collection; 12] = [
        Collection::Lists,
        Collection::Clients,
        Collection::Savings,
        Collection::Expenses,
        Collection::Income,
        Collection::Debts,
        Collection::Goals,
        Collection::Invoices,
        Collection::Todos,
        Collection::SavingsTransactions,
        Collection::OpeningBalances,
        Collection::ExpectedIncome,
    ];

    /// Collections whose presence makes a backup worth importing.
    pub const PRIMARY: [Collection; 5] = [
        Collection::Clients,
        Collection::Income,
        Collection::Expenses,
        Collection::Debts,
        Collection::Goals,
    ];

    /// Member name in the snapshot format.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Clients => "clients",
            Self::Income => "income",
            Self::Expenses => "expenses",
            Self::Debts => "debts",
            Self::Goals => "goals",
            Self::Invoices => "invoices",
            Self::Todos => "todos",
            Self::Lists => "lists",
            Self::Savings => "savings",
            Self::SavingsTransactions => "savingsTransactions",
            Self::OpeningBalances => "openingBalances",
            Self::ExpectedIncome => "expectedIncome",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Clients => "clients",
            Self::Income => "income",
            Self::Expenses => "expenses",
            Self::Debts => "debts",
            Self::Goals => "goals",
            Self::Invoices => "invoices",
            Self::Todos => "todos",
            Self::Lists => "lists",
            Self::Savings => "savings",
            Self::SavingsTransactions => "savings_transactions",
            Self::OpeningBalances => "opening_balances",
            Self::ExpectedIncome => "expected_income",
        }
    }

    /// Accepts either the snapshot key or the table name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|c| c.key() == name || c.table() == name)
            .copied()
    }

    /// Columns besides `id` and `mongo_id`.
    pub fn columns(&self) -> &'static [Column] {
        match self {
            Self::Clients => CLIENT_COLUMNS,
            Self::Income => INCOME_COLUMNS,
            Self::Expenses => EXPENSE_COLUMNS,
            Self::Debts => DEBT_COLUMNS,
            Self::Goals => GOAL_COLUMNS,
            Self::Invoices => INVOICE_COLUMNS,
            Self::Todos => TODO_COLUMNS,
            Self::Lists => LIST_COLUMNS,
            Self::Savings => SAVINGS_COLUMNS,
            Self::SavingsTransactions => SAVINGS_TRANSACTION_COLUMNS,
            Self::OpeningBalances => OPENING_BALANCE_COLUMNS,
            Self::ExpectedIncome => EXPECTED_INCOME_COLUMNS,
        }
    }

    pub fn column(&self, field: &str) -> Option<&'static Column> {
        self.columns().iter().find(|c| c.field == field)
    }

    pub fn references(&self) -> &'static [Reference] {
        const CLIENT_REF: &[Reference] = &[reference("clientId", Collection::Clients)];
        const EXPENSE_REFS: &[Reference] = &[
            reference("clientId", Collection::Clients),
            reference("parentRecurringId", Collection::Expenses),
        ];
        const TODO_REF: &[Reference] = &[reference("listId", Collection::Lists)];
        const SAVINGS_REF: &[Reference] = &[reference("savingsId", Collection::Savings)];
        match self {
            Self::Income | Self::Invoices | Self::ExpectedIncome => CLIENT_REF,
            Self::Expenses => EXPENSE_REFS,
            Self::Todos => TODO_REF,
            Self::SavingsTransactions => SAVINGS_REF,
            _ => &[],
        }
    }

    /// Fields of `record` that have no column and would not be stored.
    pub fn unmapped_fields<'a>(&self, record: &'a Value) -> Vec<&'a str> {
        record
            .as_object()
            .map(|obj| {
                obj.keys()
                    .map(String::as_str)
                    .filter(|k| *k != "id" && *k != "mongoId" && self.column(k).is_none())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check that a record deserializes into this collection's typed shape.
    pub fn validate(&self, record: &Value) -> std::result::Result<(), String> {
        match self {
            Self::Clients => check::<Client>(record),
            Self::Income => check::<IncomeRecord>(record),
            Self::Expenses => check::<Expense>(record),
            Self::Debts => check::<Debt>(record),
            Self::Goals => check::<Goal>(record),
            Self::Invoices => check::<Invoice>(record),
            Self::Todos => check::<Todo>(record),
            Self::Lists => check::<List>(record),
            Self::Savings => check::<Savings>(record),
            Self::SavingsTransactions => check::<SavingsTransaction>(record),
            Self::OpeningBalances => check::<OpeningBalance>(record),
            Self::ExpectedIncome => check::<ExpectedIncome>(record),
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

fn check<T: DeserializeOwned>(record: &Value) -> std::result::Result<(), String> {
    T::deserialize(record).map(|_| ()).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Typed record shapes
// ---------------------------------------------------------------------------

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Option<i64>,
    pub mongo_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeRecord {
    pub id: Option<i64>,
    pub mongo_id: Option<String>,
    pub client_id: Option<i64>,
    pub amount: f64,
    pub currency: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mongo_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_recurring: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring_frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_recurring_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Debt {
    pub id: Option<i64>,
    pub mongo_id: Option<String>,
    pub name: String,
    pub amount: f64,
    pub paid_amount: Option<f64>,
    pub interest_rate: Option<f64>,
    pub due_date: Option<String>,
    pub creditor: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: Option<i64>,
    pub mongo_id: Option<String>,
    pub title: String,
    pub target_amount: Option<f64>,
    pub current_amount: Option<f64>,
    pub period: Option<String>,
    pub period_value: String,
    pub deadline: Option<String>,
    pub created_at: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Option<i64>,
    pub mongo_id: Option<String>,
    pub invoice_number: Option<String>,
    pub client_id: Option<i64>,
    pub items: Option<Value>,
    pub total: Option<f64>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub issue_date: Option<String>,
    pub due_date: Option<String>,
    pub created_at: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: Option<i64>,
    pub mongo_id: Option<String>,
    pub list_id: Option<i64>,
    pub title: String,
    pub completed: Option<bool>,
    pub due_date: Option<String>,
    pub priority: Option<String>,
    pub created_at: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub id: Option<i64>,
    pub mongo_id: Option<String>,
    pub name: String,
    pub color: Option<String>,
    pub created_at: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Savings {
    pub id: Option<i64>,
    pub mongo_id: Option<String>,
    pub name: String,
    pub target_amount: Option<f64>,
    pub current_amount: Option<f64>,
    pub currency: Option<String>,
    pub created_at: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsTransaction {
    pub id: Option<i64>,
    pub mongo_id: Option<String>,
    pub savings_id: Option<i64>,
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub date: Option<String>,
    pub note: Option<String>,
    pub created_at: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningBalance {
    pub id: Option<i64>,
    pub mongo_id: Option<String>,
    pub period_type: String,
    pub period: String,
    pub amount: f64,
    pub currency: Option<String>,
    pub created_at: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedIncome {
    pub id: Option<i64>,
    pub mongo_id: Option<String>,
    pub client_id: Option<i64>,
    pub period: String,
    pub amount: f64,
    pub notes: Option<String>,
    pub created_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_import_order_covers_every_collection() {
        let mut order = Collection::IMPORT_ORDER.to_vec();
        order.sort();
        let mut all = Collection::ALL.to_vec();
        all.sort();
        assert_eq!(order, all);
    }

    #[test]
    fn test_referenced_collections_import_first() {
        let pos = |c: Collection| Collection::IMPORT_ORDER.iter().position(|x| *x == c).unwrap();
        for c in Collection::ALL {
            for r in c.references() {
                if r.target != c {
                    assert!(pos(r.target) < pos(c), "{} must import before {}", r.target, c);
                }
            }
        }
    }

    #[test]
    fn test_from_name_accepts_key_and_table() {
        assert_eq!(Collection::from_name("savingsTransactions"), Some(Collection::SavingsTransactions));
        assert_eq!(Collection::from_name("savings_transactions"), Some(Collection::SavingsTransactions));
        assert_eq!(Collection::from_name("nope"), None);
    }

    #[test]
    fn test_validate_rejects_wrong_shape() {
        assert!(Collection::Clients.validate(&json!({"id": 1, "name": "Acme"})).is_ok());
        assert!(Collection::Clients.validate(&json!({"id": 1})).is_err());
        assert!(Collection::Income.validate(&json!({"amount": "lots"})).is_err());
        assert!(Collection::Goals.validate(&json!({"title": "Save"})).is_err());
    }

    #[test]
    fn test_reference_fields_are_columns() {
        for c in Collection::ALL {
            for r in c.references() {
                assert!(FOREIGN_KEY_FIELDS.contains(&r.field));
                assert_eq!(c.column(r.field).map(|col| col.kind), Some(ColumnKind::Integer));
            }
        }
    }
}
