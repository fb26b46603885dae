//! Per-channel item selection.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shelfsync_core::value::display_text;
use tracing::warn;

use crate::types::SourceRecord;

/// Accepted values for one selection field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Matcher {
    Any(Vec<Value>),
    One(Value),
}

impl Matcher {
    fn values(&self) -> &[Value] {
        match self {
            Self::Any(values) => values,
            Self::One(value) => std::slice::from_ref(value),
        }
    }
}

/// `field -> value | [values]`. A record is selected when any entry matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection {
    entries: BTreeMap<String, Matcher>,
}

impl Selection {
    /// Empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, matcher: Matcher) -> Self {
        self.entries.insert(field.into(), matcher);
        self
    }

    /// Whether the selection has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of the selected records: the union over entries, in record order,
    /// each id once. Entries that match nothing are logged.
    pub fn select(&self, channel: &str, records: &[SourceRecord]) -> Vec<String> {
        let documents: Vec<(&str, Value)> = records
            .iter()
            .filter_map(|record| record.to_document().ok().map(|doc| (record.id.as_str(), doc)))
            .collect();

        let mut matched: HashSet<&str> = HashSet::new();
        for (field, matcher) in &self.entries {
            for wanted in matcher.values() {
                let hits = documents
                    .iter()
                    .filter(|(_, doc)| doc.get(field).is_some_and(|have| same(have, wanted)))
                    .map(|(id, _)| *id)
                    .collect::<Vec<_>>();
                if hits.is_empty() {
                    warn!(channel, field = %field, value = %wanted, "Selection entry matches no source record");
                }
                matched.extend(hits);
            }
        }

        let mut selected = Vec::new();
        let mut seen = HashSet::new();
        for record in records {
            if matched.contains(record.id.as_str()) && seen.insert(record.id.as_str()) {
                selected.push(record.id.clone());
            }
        }
        selected
    }
}

/// Exact equality; scalars also match by their text so that `4815` selects
/// the id `"4815"`.
fn same(have: &Value, wanted: &Value) -> bool {
    if have == wanted {
        return true;
    }
    let scalar = |v: &Value| !matches!(v, Value::Array(_) | Value::Object(_) | Value::Null);
    scalar(have) && scalar(wanted) && display_text(have) == display_text(wanted)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    fn records() -> Vec<SourceRecord> {
        vec![
            SourceRecord::new("4815").with_sku("A"),
            SourceRecord::new("1623").with_sku("B"),
            SourceRecord::new("42").with_sku("C"),
        ]
    }

    #[test]
    fn test_union_in_record_order() {
        let selection: Selection =
            serde_json::from_value(json!({"sku": ["C", "A"], "id": 4815})).unwrap();
        assert_eq!(selection.select("web", &records()), vec!["4815", "42"]);
    }

    #[test]
    fn test_unmatched_entry_selects_nothing() {
        let selection = Selection::new().with("sku", Matcher::One(json!("Z")));
        assert!(selection.select("web", &records()).is_empty());
        assert!(!selection.is_empty());
    }

    #[test]
    fn test_extra_fields_are_selectable() {
        let mut record = SourceRecord::new("7");
        record.extra.insert("brand".to_string(), json!("Acme"));
        let selection = Selection::new().with("brand", Matcher::One(json!("Acme")));
        assert_eq!(selection.select("web", &[record]), vec!["7"]);
    }
}
