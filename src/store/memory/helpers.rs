//! Value helpers for in-memory evaluation.
//!
//! - get_field_value: Extract nested field values from JSON
//! - values_equal: Compare two JSON values for equality
//! - compare_values: Total order across JSON values, grouped by type
//! - matches_filter: Evaluate a filter against one document

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use crate::query::{CompareOp, FilterExpr};

/// Extract a nested field value from a JSON document.
///
/// Returns `Value::Null` if any segment of the dot-separated path is
/// missing.
#[inline]
pub fn get_field_value(value: &Value, field_path: &str) -> Value {
    let mut current = value;

    for part in field_path.split('.') {
        match current.get(part) {
            Some(val) => current = val,
            None => return Value::Null,
        }
    }

    current.clone()
}

/// Write `value` at a dot-separated path, creating intermediate objects.
pub fn set_field_value(target: &mut Map<String, Value>, field_path: &str, value: Value) {
    match field_path.split_once('.') {
        None => {
            target.insert(field_path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                set_field_value(map, rest, value);
            }
        }
    }
}

/// Compare two JSON values for equality.
///
/// Numbers are compared by their f64 representation for proper numeric comparison.
#[inline]
/// True when every segment of `path` exists, even if the value is null.
pub fn field_present(row: &Value, path: &str) -> bool {
    let mut current = row;
    for part in path.split('.') {
        match current.get(part) {
            Some(v) => current = v,
            None => return false,
        }
    }
    true
}

pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// Create a serde_json::Number from an f64 value.
#[inline]
pub fn number_from_f64(n: f64) -> Number {
    Number::from_f64(n).unwrap_or_else(|| Number::from(0))
}

/// Type bracket used for ordering: Null < Number < String < Object < Array < Bool
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Compare two JSON values for ordering.
///
/// Values of different types order by their type bracket; values of the
/// same type compare naturally.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let a_f64 = a.as_f64().unwrap_or(0.0);
            let b_f64 = b.as_f64().unwrap_or(0.0);
            a_f64.partial_cmp(&b_f64).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ord = compare_values(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Object(a), Value::Object(b)) => {
            for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                let ord = ka.cmp(kb).then_with(|| compare_values(va, vb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Range predicates only match values in the same type bracket, so
/// `published_year > 2015` never matches a string year.
fn compare_scalar(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    let ordering = || {
        if actual.is_null() || type_rank(actual) != type_rank(expected) {
            None
        } else {
            Some(compare_values(actual, expected))
        }
    };
    match op {
        CompareOp::Eq => values_equal(actual, expected),
        CompareOp::Ne => !values_equal(actual, expected),
        CompareOp::Gt => ordering() == Some(Ordering::Greater),
        CompareOp::Gte => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
        CompareOp::Lt => ordering() == Some(Ordering::Less),
        CompareOp::Lte => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
    }
}

/// Evaluate a single predicate; array fields match when any element does.
pub fn matches_predicate(doc: &Value, field: &str, op: CompareOp, expected: &Value) -> bool {
    let actual = get_field_value(doc, field);
    match (&actual, op) {
        (Value::Array(items), CompareOp::Ne) => {
            !items.iter().any(|item| values_equal(item, expected))
        }
        (Value::Array(items), _) => items.iter().any(|item| compare_scalar(item, op, expected)),
        _ => compare_scalar(&actual, op, expected),
    }
}

pub fn matches_filter(doc: &Value, filter: &FilterExpr) -> bool {
    match filter {
        FilterExpr::All => true,
        FilterExpr::Compare { field, op, value } => matches_predicate(doc, field, *op, value),
        FilterExpr::And(terms) => terms.iter().all(|t| matches_filter(doc, t)),
    }
}

/// Grouping identity: whole doubles and integers fall into the same group.
pub fn group_key(value: &Value) -> String {
    match value {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => format!("n:{}", i),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                format!("n:{}", f as i64)
            }
            _ => format!("n:{}", n),
        },
        other => format!("v:{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_field_value() {
        let doc = json!({"title": "Dune", "publisher": {"city": "Philadelphia"}});
        assert_eq!(get_field_value(&doc, "title"), json!("Dune"));
        assert_eq!(get_field_value(&doc, "publisher.city"), json!("Philadelphia"));
        assert_eq!(get_field_value(&doc, "missing"), Value::Null);
    }

    #[test]
    fn test_set_field_value_nested() {
        let mut map = Map::new();
        set_field_value(&mut map, "a.b", json!(1));
        set_field_value(&mut map, "c", json!(2));
        assert_eq!(Value::Object(map), json!({"a": {"b": 1}, "c": 2}));
    }

    #[test]
    fn test_values_equal() {
        assert!(values_equal(&json!(25), &json!(25.0)));
        assert!(values_equal(&json!("Fiction"), &json!("Fiction")));
        assert!(!values_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn test_compare_values_brackets() {
        assert_eq!(compare_values(&Value::Null, &json!(1)), Ordering::Less);
        assert_eq!(compare_values(&json!(100), &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!(true), &json!("z")), Ordering::Greater);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
    }

    #[test]
    fn test_range_predicates_are_type_bracketed() {
        let doc = json!({"published_year": "2020"});
        assert!(!matches_predicate(&doc, "published_year", CompareOp::Gt, &json!(2015)));

        let doc = json!({"published_year": 2015});
        assert!(!matches_predicate(&doc, "published_year", CompareOp::Gt, &json!(2015)));
        assert!(matches_predicate(&doc, "published_year", CompareOp::Gte, &json!(2015)));

        let missing = json!({});
        assert!(!matches_predicate(&missing, "published_year", CompareOp::Lt, &json!(2015)));
        assert!(matches_predicate(&missing, "published_year", CompareOp::Eq, &Value::Null));
    }

    #[test]
    fn test_array_fields_match_any_element() {
        let doc = json!({"tags": ["classic", "space"]});
        assert!(matches_predicate(&doc, "tags", CompareOp::Eq, &json!("space")));
        assert!(!matches_predicate(&doc, "tags", CompareOp::Ne, &json!("space")));
    }

    #[test]
    fn test_group_key_merges_whole_doubles() {
        assert_eq!(group_key(&json!(2010)), group_key(&json!(2010.0)));
        assert_ne!(group_key(&json!(2010)), group_key(&json!("2010")));
        assert_eq!(group_key(&Value::Null), "v:null");
    }
}
