//! Projector: evaluates a template against a source record.

use serde_json::{Map, Value};

use crate::error::Result;
use crate::expr::Scope;
use crate::template::{TemplateNode, VARIANTS_KEY};

/// Evaluate `root` against `record`, producing the desired document.
///
/// Under the `variants` key a list whose first element is an object is
/// applied once per entry of `record.variants`, with the variant as `record`
/// and the source record as `parent`. A record without variants is treated
/// as its own single variant.
pub fn project(root: &TemplateNode, record: &Value) -> Result<Value> {
    project_node(root, Scope::root(record), true)
}

fn project_node(node: &TemplateNode, scope: Scope<'_>, header: bool) -> Result<Value> {
    match node {
        TemplateNode::Literal(value) => Ok(value.clone()),
        TemplateNode::Expr(expression) => expression.evaluate(scope),
        TemplateNode::List(items) => items
            .iter()
            .map(|item| project_node(item, scope, false))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        TemplateNode::Object(entries) => {
            let mut out = Map::with_capacity(entries.len());
            for (key, child) in entries {
                let value = match child.record_template() {
                    Some(variant_template) if header && key == VARIANTS_KEY => {
                        project_variants(variant_template, scope.record)?
                    }
                    _ => project_node(child, scope, false)?,
                };
                out.insert(key.clone(), value);
            }
            Ok(Value::Object(out))
        }
    }
}

fn project_variants(template: &TemplateNode, record: &Value) -> Result<Value> {
    let variants: Vec<&Value> = match record.get(VARIANTS_KEY) {
        Some(Value::Array(items)) if !items.is_empty() => items.iter().collect(),
        _ => vec![record],
    };

    variants
        .into_iter()
        .map(|variant| project_node(template, Scope::nested(variant, record), false))
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}
