//! Conversion of foreign-store documents and older exports into canonical
//! local records.
//!
//! Nothing here fails. A field that cannot be interpreted is left as it was
//! supplied so the importer can report the record individually.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::ids::{identity_string, normalize};
use crate::models::{Collection, FOREIGN_KEY_FIELDS};

const FOREIGN_ID_FIELD: &str = "_id";

/// Remote-store bookkeeping with no local meaning.
const BOOKKEEPING_FIELDS: &[&str] = &["__v", "userId"];

pub fn transform(collection: Collection, raw: Value) -> Value {
    let Value::Object(mut record) = raw else {
        return raw;
    };
    assign_identity(&mut record);
    flatten_extended_dates(&mut record);
    shape_foreign_keys(&mut record);
    if collection == Collection::Goals {
        backfill_period_value(&mut record);
    }
    normalize_period_type(&mut record);
    for field in BOOKKEEPING_FIELDS {
        record.remove(*field);
    }
    Value::Object(record)
}

fn assign_identity(record: &mut Map<String, Value>) {
    let foreign = record.remove(FOREIGN_ID_FIELD).filter(|v| !v.is_null());
    if let Some(foreign) = foreign {
        let original = identity_string(&foreign).unwrap_or_else(|| foreign.to_string());
        record.insert("mongoId".into(), Value::String(original));
        if let Some(id) = normalize(&foreign) {
            record.insert("id".into(), Value::from(id));
            return;
        }
    }
    match record.get("id").map(normalize) {
        Some(Some(id)) => {
            record.insert("id".into(), Value::from(id));
        }
        Some(None) => {
            record.remove("id");
        }
        None => {}
    }
}

/// Replace `{"$date": ...}` wrappers with RFC 3339 strings, on any field.
fn flatten_extended_dates(record: &mut Map<String, Value>) {
    for value in record.values_mut() {
        if let Some(flat) = extended_date(value) {
            *value = Value::String(flat);
        }
    }
}

fn extended_date(value: &Value) -> Option<String> {
    let Value::Object(map) = value else {
        return None;
    };
    if map.len() != 1 {
        return None;
    }
    let millis = match map.get("$date")? {
        Value::String(s) => return Some(s.clone()),
        Value::Number(n) => n.as_i64()?,
        Value::Object(inner) => inner.get("$numberLong")?.as_str()?.parse().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp_millis(millis).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Shape reference fields without resolving them: the ids they point at are
/// only known once the referenced collection has been written.
fn shape_foreign_keys(record: &mut Map<String, Value>) {
    for field in FOREIGN_KEY_FIELDS {
        let Some(value) = record.get_mut(*field) else {
            continue;
        };
        if value.is_object() {
            if let Some(flat) = identity_string(value) {
                *value = Value::String(flat);
            }
        }
        if let Value::String(s) = value {
            if let Ok(n) = s.trim().parse::<i64>() {
                *value = Value::from(n);
            }
        }
    }
}

fn backfill_period_value(record: &mut Map<String, Value>) {
    let present = match record.get("periodValue") {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    };
    if present {
        return;
    }
    let period = record
        .get("period")
        .and_then(Value::as_str)
        .unwrap_or("monthly");
    let created = record
        .get("createdAt")
        .and_then(parse_date)
        .unwrap_or_else(|| Utc::now().date_naive());
    record.insert(
        "periodValue".into(),
        Value::String(period_value(period, created)),
    );
}

/// `YYYY-MM` for monthly, `YYYY-Qn` for quarterly, `YYYY` for yearly.
/// Anything unrecognized is treated as monthly.
pub fn period_value(period: &str, date: NaiveDate) -> String {
    match long_period_form(period).unwrap_or("monthly") {
        "yearly" => format!("{}", date.year()),
        "quarterly" => format!("{}-Q{}", date.year(), date.month0() / 3 + 1),
        _ => format!("{}-{:02}", date.year(), date.month()),
    }
}

fn normalize_period_type(record: &mut Map<String, Value>) {
    if let Some(Value::String(s)) = record.get_mut("periodType") {
        if let Some(long) = long_period_form(s) {
            *s = long.to_string();
        }
    }
}

fn long_period_form(raw: &str) -> Option<&'static str> {
    match raw.trim().to_lowercase().as_str() {
        "day" | "daily" => Some("daily"),
        "week" | "weekly" => Some("weekly"),
        "month" | "monthly" => Some("monthly"),
        "quarter" | "quarterly" => Some("quarterly"),
        "year" | "yearly" => Some("yearly"),
        _ => None,
    }
}

/// Accepts RFC 3339 strings, naive date-times, plain dates, epoch
/// milliseconds and `{"$date": ...}` wrappers.
fn parse_date(raw: &Value) -> Option<NaiveDate> {
    match raw {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc).date_naive());
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(dt.date());
            }
            NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok()
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| dt.date_naive()),
        Value::Object(map) => map.get("$date").and_then(parse_date),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_foreign_id_becomes_local_id() {
        let out = transform(
            Collection::Clients,
            json!({"_id": "65a1f0c2e4b0a1b2c3d4e5f6", "name": "Acme", "__v": 0}),
        );
        assert_eq!(out["id"], json!(1012582501));
        assert_eq!(out["mongoId"], json!("65a1f0c2e4b0a1b2c3d4e5f6"));
        assert!(out.get("_id").is_none());
        assert!(out.get("__v").is_none());
    }

    #[test]
    fn test_extended_json_id_matches_plain_id() {
        let plain = transform(Collection::Clients, json!({"_id": "5f8d0a4b7c9e1f2a3b4c5d6e"}));
        let wrapped = transform(
            Collection::Clients,
            json!({"_id": {"$oid": "5f8d0a4b7c9e1f2a3b4c5d6e"}}),
        );
        assert_eq!(plain["id"], wrapped["id"]);
        assert_eq!(wrapped["mongoId"], json!("5f8d0a4b7c9e1f2a3b4c5d6e"));
    }

    #[test]
    fn test_extended_json_dates_become_strings() {
        let client = transform(
            Collection::Clients,
            json!({"name": "Acme", "createdAt": {"$date": "2024-01-02T00:00:00.000Z"}}),
        );
        assert_eq!(client["createdAt"], json!("2024-01-02T00:00:00.000Z"));

        let goal = transform(
            Collection::Goals,
            json!({
                "title": "Save",
                "period": "quarterly",
                "createdAt": {"$date": 1717200000000i64},
                "deadline": {"$date": {"$numberLong": "1735603200000"}}
            }),
        );
        assert_eq!(goal["createdAt"], json!("2024-06-01T00:00:00.000Z"));
        assert_eq!(goal["deadline"], json!("2024-12-31T00:00:00.000Z"));
        assert_eq!(goal["periodValue"], json!("2024-Q2"));
        assert!(Collection::Goals.validate(&goal).is_ok());
        assert!(Collection::Clients.validate(&client).is_ok());
    }

    #[test]
    fn test_objects_that_are_not_dates_are_left_alone() {
        let out = transform(
            Collection::Invoices,
            json!({"items": {"$date": "x", "qty": 1}}),
        );
        assert_eq!(out["items"], json!({"$date": "x", "qty": 1}));
    }

    #[test]
    fn test_existing_id_normalized_in_place() {
        let out = transform(Collection::Lists, json!({"id": "12", "name": "Work"}));
        assert_eq!(out["id"], json!(12));
        let out = transform(Collection::Lists, json!({"id": null, "name": "Work"}));
        assert!(out.get("id").is_none());
    }

    #[test]
    fn test_foreign_keys_are_shaped() {
        let out = transform(
            Collection::Expenses,
            json!({
                "amount": 10.0,
                "clientId": {"_id": "65a1f0c2e4b0a1b2c3d4e5f6", "name": "Acme"},
                "parentRecurringId": "7",
                "listId": {"name": "no identity"}
            }),
        );
        assert_eq!(out["clientId"], json!("65a1f0c2e4b0a1b2c3d4e5f6"));
        assert_eq!(out["parentRecurringId"], json!(7));
        assert_eq!(out["listId"], json!({"name": "no identity"}));
    }

    #[test]
    fn test_goal_quarterly_period_value() {
        let out = transform(
            Collection::Goals,
            json!({"title": "Emergency fund", "period": "quarterly", "createdAt": "2024-08-15T00:00:00Z"}),
        );
        assert_eq!(out["periodValue"], json!("2024-Q3"));
    }

    #[test]
    fn test_goal_period_values() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(period_value("monthly", date), "2024-01");
        assert_eq!(period_value("quarterly", date), "2024-Q1");
        assert_eq!(period_value("yearly", date), "2024");
        assert_eq!(period_value("fortnightly", date), "2024-01");
        let december = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        assert_eq!(period_value("quarter", december), "2023-Q4");
    }

    #[test]
    fn test_goal_keeps_existing_period_value() {
        let out = transform(
            Collection::Goals,
            json!({"title": "x", "period": "yearly", "periodValue": "2020", "createdAt": "2024-08-15"}),
        );
        assert_eq!(out["periodValue"], json!("2020"));
    }

    #[test]
    fn test_goal_backfill_accepts_epoch_millis_and_date_wrapper() {
        let out = transform(
            Collection::Goals,
            json!({"title": "x", "period": "monthly", "createdAt": 1717200000000i64}),
        );
        assert_eq!(out["periodValue"], json!("2024-06"));
        let out = transform(
            Collection::Goals,
            json!({"title": "x", "period": "yearly", "createdAt": {"$date": "2021-03-04T10:00:00.000Z"}}),
        );
        assert_eq!(out["periodValue"], json!("2021"));
    }

    #[test]
    fn test_goal_backfill_never_leaves_period_value_empty() {
        let out = transform(
            Collection::Goals,
            json!({"title": "x", "periodValue": "", "createdAt": "not a date"}),
        );
        let value = out["periodValue"].as_str().unwrap();
        assert_eq!(value.len(), 7, "expected YYYY-MM, got {value}");
    }

    #[test]
    fn test_period_type_short_form_rewritten() {
        let out = transform(
            Collection::OpeningBalances,
            json!({"periodType": "month", "period": "2024-01", "amount": 100.0}),
        );
        assert_eq!(out["periodType"], json!("monthly"));
        let out = transform(
            Collection::OpeningBalances,
            json!({"periodType": "custom", "period": "2024-01", "amount": 100.0}),
        );
        assert_eq!(out["periodType"], json!("custom"));
    }

    #[test]
    fn test_non_object_passes_through() {
        assert_eq!(transform(Collection::Todos, json!("junk")), json!("junk"));
    }

    #[test]
    fn test_bookkeeping_fields_stripped() {
        let out = transform(Collection::Debts, json!({"name": "Car", "amount": 1.0, "userId": "u1", "__v": 3}));
        assert_eq!(out, json!({"name": "Car", "amount": 1.0}));
    }
}
