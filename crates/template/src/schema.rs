//! Structural schema derived from a template, and the filter that applies it
//! to destination records.

use serde_json::{Map, Value};

use crate::template::TemplateNode;

/// Shape of a template with every leaf erased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schema {
    /// Any scalar.
    Leaf,
    /// Keys the template writes, in template order.
    Object(Vec<(String, Schema)>),
    /// A list whose template begins with an object: every destination element
    /// is filtered against that object.
    Records(Box<Schema>),
    /// Any other list: compared as-is.
    PassThrough,
}

impl Schema {
    /// Derive the schema of a template node.
    pub fn from_template(node: &TemplateNode) -> Self {
        match node {
            TemplateNode::Literal(_) | TemplateNode::Expr(_) => Self::Leaf,
            TemplateNode::Object(entries) => Self::Object(
                entries
                    .iter()
                    .map(|(key, child)| (key.clone(), Self::from_template(child)))
                    .collect(),
            ),
            TemplateNode::List(_) => match node.record_template() {
                Some(first) => Self::Records(Box::new(Self::from_template(first))),
                None => Self::PassThrough,
            },
        }
    }

    /// Keys of an object schema.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::Object(fields) => fields.iter().map(|(key, _)| key.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Reduce `value` to the fields this schema names.
    ///
    /// Object keys absent from the destination are dropped, or set to `null`
    /// when `keep_missing` is on. Values whose kind does not match the schema
    /// are passed through so the comparator reports them.
    pub fn filter(&self, value: &Value, keep_missing: bool) -> Value {
        match (self, value) {
            (Self::Object(fields), Value::Object(map)) => {
                let mut out = Map::with_capacity(fields.len());
                for (key, schema) in fields {
                    match map.get(key) {
                        Some(child) => {
                            out.insert(key.clone(), schema.filter(child, keep_missing));
                        }
                        None if keep_missing => {
                            out.insert(key.clone(), Value::Null);
                        }
                        None => {}
                    }
                }
                Value::Object(out)
            }
            (Self::Records(item), Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .map(|element| item.filter(element, keep_missing))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    /// Render the schema with placeholder leaves, for display.
    pub fn placeholder(&self) -> Value {
        match self {
            Self::Leaf => Value::String("<value>".to_string()),
            Self::PassThrough => Value::String("<list>".to_string()),
            Self::Records(item) => Value::Array(vec![item.placeholder()]),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, schema)| (key.clone(), schema.placeholder()))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::syntax;
    use serde_json::json;

    fn schema(text: &str) -> Schema {
        Schema::from_template(&syntax::parse(text).unwrap())
    }

    #[test]
    fn test_from_template_erases_leaves() {
        let schema = schema("title: 'record.name'\ntags: [\"a\"]\nvariants: [{ sku: 'record.sku' }]");
        assert_eq!(
            schema,
            Schema::Object(vec![
                ("title".to_string(), Schema::Leaf),
                ("tags".to_string(), Schema::PassThrough),
                (
                    "variants".to_string(),
                    Schema::Records(Box::new(Schema::Object(vec![(
                        "sku".to_string(),
                        Schema::Leaf
                    )])))
                ),
            ])
        );
        assert_eq!(schema.keys(), vec!["title", "tags", "variants"]);
    }

    #[test]
    fn test_filter_drops_unknown_keys() {
        let schema = schema("title: 'record.name'\nvendor: 'record.vendor'");
        let current = schema.filter(&json!({"id": 1, "title": "Lamp", "handle": "lamp"}), false);
        assert_eq!(current, json!({"title": "Lamp"}));
    }

    #[test]
    fn test_filter_keep_missing_synthesises_null() {
        let schema = schema("title: 'record.name'\nvendor: 'record.vendor'");
        let current = schema.filter(&json!({"title": "Lamp"}), true);
        assert_eq!(current, json!({"title": "Lamp", "vendor": null}));
    }

    #[test]
    fn test_filter_applies_first_element_to_every_record() {
        let schema = schema("variants: [{ sku: 'record.sku', price: 'record.price' }]");
        let current = schema.filter(
            &json!({"variants": [
                {"id": 1, "sku": "A", "price": "5.00"},
                {"id": 2, "sku": "B", "price": "6.00", "weight": 3}
            ]}),
            false,
        );
        assert_eq!(
            current,
            json!({"variants": [{"sku": "A", "price": "5.00"}, {"sku": "B", "price": "6.00"}]})
        );
    }

    #[test]
    fn test_filter_passes_scalar_lists_and_mismatched_kinds_through() {
        let schema = schema("tags: [\"a\"]\nvariants: [{ sku: 'record.sku' }]\ntitle: 'record.t'");
        let current = schema.filter(
            &json!({"tags": ["x", {"y": 1}], "variants": "none", "title": {"nested": true}}),
            false,
        );
        assert_eq!(
            current,
            json!({"tags": ["x", {"y": 1}], "variants": "none", "title": {"nested": true}})
        );
    }

    #[test]
    fn test_placeholder() {
        let schema = schema("title: 'record.name'\nvariants: [{ sku: 'record.sku' }]");
        assert_eq!(
            schema.placeholder(),
            json!({"title": "<value>", "variants": [{"sku": "<value>"}]})
        );
    }
}
