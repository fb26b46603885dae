//! Normalized comparator: a path-addressed deep diff under field-specific
//! equivalence rules.
//!
//! Rules applied before literal comparison:
//!
//! - `null` and `""` are equivalent anywhere.
//! - Fields named `price` compare as decimals rounded to two places, half-up.
//! - Fields named `status` fold `draft` and `inactive` together.
//! - Containers of different kinds at the same path always differ.
//! - Lists compare positionally; a length mismatch adds a `__len__` entry.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shelfsync_core::value::{is_blank, to_decimal};

/// Field compared as a decimal amount.
pub const PRICE_FIELD: &str = "price";

/// Field whose not-for-sale states are interchangeable.
pub const STATUS_FIELD: &str = "status";

/// Suffix used for list length mismatches.
pub const LEN_SEGMENT: &str = "__len__";

static NULL: Value = Value::Null;

/// One difference between the desired and current documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Difference {
    pub path: String,
    pub desired: Value,
    pub current: Value,
}

/// Diff two shaped documents.
///
/// An empty result means no mutation is needed.
pub fn diff(desired: &Value, current: &Value) -> Vec<Difference> {
    let mut out = Vec::new();
    diff_at("", None, desired, current, &mut out);
    out
}

/// Diff one field; `field` selects the equivalence rule for its scalars.
pub fn diff_field(field: &str, desired: &Value, current: &Value) -> Vec<Difference> {
    let mut out = Vec::new();
    diff_at(field, Some(field), desired, current, &mut out);
    out
}

/// Whether two values are equivalent under the rules for `field`.
pub fn equivalent(field: Option<&str>, desired: &Value, current: &Value) -> bool {
    let mut out = Vec::new();
    diff_at("", field, desired, current, &mut out);
    out.is_empty()
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn diff_at(
    path: &str,
    field: Option<&str>,
    desired: &Value,
    current: &Value,
    out: &mut Vec<Difference>,
) {
    match (desired, current) {
        (Value::Object(want), Value::Object(have)) => {
            let extra = have.keys().filter(|key| !want.contains_key(*key));
            for key in want.keys().chain(extra) {
                diff_at(
                    &child_path(path, key),
                    Some(key),
                    want.get(key).unwrap_or(&NULL),
                    have.get(key).unwrap_or(&NULL),
                    out,
                );
            }
        }
        (Value::Array(want), Value::Array(have)) => {
            for (index, (w, h)) in want.iter().zip(have.iter()).enumerate() {
                diff_at(&format!("{path}[{index}]"), field, w, h, out);
            }
            if want.len() != have.len() {
                out.push(Difference {
                    path: child_path(path, LEN_SEGMENT),
                    desired: Value::from(want.len()),
                    current: Value::from(have.len()),
                });
            }
        }
        (Value::Object(_) | Value::Array(_), _) | (_, Value::Object(_) | Value::Array(_)) => {
            out.push(Difference {
                path: path.to_string(),
                desired: desired.clone(),
                current: current.clone(),
            });
        }
        _ => {
            if !scalars_equivalent(field, desired, current) {
                out.push(Difference {
                    path: path.to_string(),
                    desired: desired.clone(),
                    current: current.clone(),
                });
            }
        }
    }
}

fn scalars_equivalent(field: Option<&str>, desired: &Value, current: &Value) -> bool {
    if is_blank(desired) && is_blank(current) {
        return true;
    }
    match field {
        Some(PRICE_FIELD) => {
            if let (Some(a), Some(b)) = (price(desired), price(current)) {
                return a == b;
            }
        }
        Some(STATUS_FIELD) => {
            if let (Some(a), Some(b)) = (desired.as_str(), current.as_str()) {
                return fold_status(a) == fold_status(b);
            }
        }
        _ => {}
    }
    match (desired, current) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => desired == current,
    }
}

fn price(value: &Value) -> Option<Decimal> {
    to_decimal(value).map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Canonical form of a status value: not-for-sale states collapse into one.
pub fn fold_status(status: &str) -> String {
    let status = status.trim().to_lowercase();
    match status.as_str() {
        "inactive" => "draft".to_string(),
        _ => status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_price_equivalence() {
        assert!(diff(&json!({"price": "10"}), &json!({"price": "10.00"})).is_empty());
        assert!(diff(&json!({"price": "218.0"}), &json!({"price": 218})).is_empty());
        assert!(diff(&json!({"price": "2.675"}), &json!({"price": "2.68"})).is_empty());
        assert_eq!(diff(&json!({"price": "10"}), &json!({"price": "10.01"})).len(), 1);
    }

    #[test]
    fn test_price_rule_applies_by_field_name_only() {
        assert_eq!(diff(&json!({"weight": "10"}), &json!({"weight": "10.00"})).len(), 1);
    }

    #[test]
    fn test_status_folding() {
        assert!(diff(&json!({"status": "draft"}), &json!({"status": "inactive"})).is_empty());
        let differences = diff(&json!({"status": "active"}), &json!({"status": "draft"}));
        assert_eq!(
            differences,
            vec![Difference {
                path: "status".to_string(),
                desired: json!("active"),
                current: json!("draft"),
            }]
        );
    }

    #[test]
    fn test_null_and_empty_string_are_equivalent() {
        assert!(diff(&json!({"body": ""}), &json!({"body": null})).is_empty());
        assert!(diff(&json!({"body": ""}), &json!({})).is_empty());
        assert!(diff(&json!({"body": null}), &json!({"body": ""})).is_empty());
    }

    #[test]
    fn test_one_sided_keys_compare_against_null() {
        let differences = diff(&json!({"a": 1}), &json!({"b": 2}));
        assert_eq!(
            differences,
            vec![
                Difference {
                    path: "a".to_string(),
                    desired: json!(1),
                    current: Value::Null
                },
                Difference {
                    path: "b".to_string(),
                    desired: Value::Null,
                    current: json!(2)
                },
            ]
        );
    }

    #[test]
    fn test_nested_paths_and_length() {
        let desired = json!({"variants": [{"sku": "A", "price": "5"}, {"sku": "B", "price": "6"}]});
        let current = json!({"variants": [{"sku": "A", "price": "4.00"}]});
        let paths: Vec<String> = diff(&desired, &current).into_iter().map(|d| d.path).collect();
        assert_eq!(paths, vec!["variants[0].price", "variants.__len__"]);
    }

    #[test]
    fn test_price_rule_applies_inside_variants() {
        let desired = json!({"variants": [{"price": "5"}]});
        let current = json!({"variants": [{"price": "5.00"}]});
        assert!(diff(&desired, &current).is_empty());
    }

    #[test]
    fn test_container_mismatch_is_a_difference() {
        let differences = diff(&json!({"tags": ["a"]}), &json!({"tags": "a"}));
        assert_eq!(differences.len(), 1);
        assert_eq!(differences[0].current, json!("a"));

        assert_eq!(diff(&json!({"tags": []}), &json!({"tags": {}})).len(), 1);
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert!(diff(&json!({"qty": 3}), &json!({"qty": 3.0})).is_empty());
        assert_eq!(diff(&json!({"qty": 3}), &json!({"qty": "3"})).len(), 1);
    }

    #[test]
    fn test_equivalent_helper() {
        assert!(equivalent(Some("price"), &json!("10"), &json!(10.0)));
        assert!(!equivalent(Some("status"), &json!("active"), &json!("archived")));
        assert!(equivalent(None, &json!(""), &Value::Null));
    }
}
