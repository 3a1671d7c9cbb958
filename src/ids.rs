use serde_json::Value;

/// Hashed ids are folded modulo 2^31 - 1, so they land in `[0, 2^31 - 2]`.
const ID_MODULUS: i64 = 2_147_483_647;

/// Keys that carry a document identity inside a nested reference object,
/// checked in this order.
const IDENTITY_KEYS: &[&str] = &["$oid", "_id", "id"];

/// Map any externally supplied identifier onto a local integer id.
///
/// Checks run in a fixed order: missing, integer, integral float, numeric
/// string, other string, object, anything else. Strings that are not numbers
/// (e.g. hex document ids) go through a 32-bit rolling hash, so the same
/// foreign id always maps to the same local id across runs and processes.
///
/// Distinct foreign ids can collide on the same local id. This is a known
/// limitation of the hash scheme and is not detected here.
pub fn normalize(raw: &Value) -> Option<i64> {
    match raw {
        Value::Null => None,
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15) {
                Some(f as i64)
            } else {
                Some(hash_id(&n.to_string()))
            }
        }
        Value::String(s) => normalize_str(s),
        Value::Object(_) => match identity_string(raw) {
            Some(s) => normalize_str(&s),
            None => Some(hash_id(&raw.to_string())),
        },
        other => Some(hash_id(&other.to_string())),
    }
}

pub fn normalize_str(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<i64>() {
        Ok(n) => Some(n),
        Err(_) => Some(hash_id(trimmed)),
    }
}

/// Extract the identity carried by a reference value as a string.
///
/// Plain strings and numbers are their own identity. Objects are searched for
/// `$oid`, `_id` or `id`, recursing into nested objects (`{"_id": {"$oid": ..}}`).
pub fn identity_string(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => IDENTITY_KEYS
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(identity_string),
        _ => None,
    }
}

fn hash_id(s: &str) -> i64 {
    let mut h: i32 = 0;
    for unit in s.encode_utf16() {
        h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(unit as i32);
    }
    (h as i64).abs() % ID_MODULUS
}
