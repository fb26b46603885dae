//! Compiled templates.

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::expr::Expression;
use crate::projector;
use crate::schema::Schema;
use crate::syntax;

/// Key whose list value is applied once per source variant.
pub const VARIANTS_KEY: &str = "variants";

/// One node of a compiled template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    /// A literal leaf, copied into the projection unchanged.
    Literal(Value),
    /// An expression leaf, evaluated against the current scope.
    Expr(Expression),
    /// Object entries in template order.
    Object(Vec<(String, TemplateNode)>),
    List(Vec<TemplateNode>),
}

impl TemplateNode {
    /// Entries of an object node.
    pub fn entries(&self) -> Option<&[(String, TemplateNode)]> {
        match self {
            Self::Object(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a key of an object node.
    pub fn get(&self, key: &str) -> Option<&TemplateNode> {
        self.entries()?
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, node)| node)
    }

    /// Number of expression leaves under this node.
    pub fn expression_count(&self) -> usize {
        match self {
            Self::Literal(_) => 0,
            Self::Expr(_) => 1,
            Self::Object(entries) => entries.iter().map(|(_, n)| n.expression_count()).sum(),
            Self::List(items) => items.iter().map(Self::expression_count).sum(),
        }
    }

    /// The per-variant sub-template: the first element of a list whose first
    /// element is an object.
    pub fn record_template(&self) -> Option<&TemplateNode> {
        match self {
            Self::List(items) => items.first().filter(|first| first.entries().is_some()),
            _ => None,
        }
    }
}

/// A compiled projection template together with its schema.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    root: TemplateNode,
    schema: Schema,
}

impl Template {
    /// Compile template text.
    ///
    /// # Errors
    ///
    /// Returns `Error::TemplateSyntax` when the text is not a valid template.
    /// The error is fatal for this template only.
    pub fn compile(name: impl Into<String>, text: &str) -> Result<Self> {
        let name = name.into();
        let root = syntax::parse(text)?;
        let schema = Schema::from_template(&root);

        debug!(
            template = %name,
            fields = root.entries().map_or(0, <[_]>::len),
            expressions = root.expression_count(),
            "Compiled template"
        );

        Ok(Self { name, root, schema })
    }

    /// Template name, used in logs and reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root node of the projection template.
    pub fn root(&self) -> &TemplateNode {
        &self.root
    }

    /// Structural schema derived from the template.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Project a source record into a desired destination-shaped document.
    ///
    /// # Errors
    ///
    /// Returns `Error::Eval` when an expression cannot coerce its input.
    pub fn project(&self, record: &Value) -> Result<Value> {
        projector::project(&self.root, record)
    }

    /// Reduce a destination record to the fields this template describes.
    pub fn filter(&self, destination: &Value, keep_missing: bool) -> Value {
        self.schema.filter(destination, keep_missing)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    const PRODUCT: &str = r#"
# product header
title:        'record.name'
vendor:       'record.vendor or "Acme"'   # fallback vendor
status:       '"active" if record.status == "active" else "draft"'
product_type: "goods"
variants: [
  { sku: 'record.sku or parent.id', price: 'str(record.price)' }
]
"#;

    #[test]
    fn test_compile_and_project() {
        let template = Template::compile("product", PRODUCT).unwrap();
        assert_eq!(template.name(), "product");
        assert_eq!(template.root().expression_count(), 5);

        let record = json!({"id": "Z1", "name": "Lamp", "status": "active", "sku": "A", "price": "10"});
        let desired = template.project(&record).unwrap();
        assert_eq!(
            desired,
            json!({
                "title": "Lamp",
                "vendor": "Acme",
                "status": "active",
                "product_type": "goods",
                "variants": [{"sku": "A", "price": "10"}]
            })
        );
    }

    #[test]
    fn test_filter_uses_template_shape() {
        let template = Template::compile("product", PRODUCT).unwrap();
        let destination = json!({
            "id": 42,
            "title": "Lamp",
            "status": "draft",
            "handle": "lamp",
            "variants": [{"id": 7, "sku": "A", "price": "10.00", "inventory_item_id": 9}]
        });
        let current = template.filter(&destination, false);
        assert_eq!(
            current,
            json!({
                "title": "Lamp",
                "status": "draft",
                "variants": [{"sku": "A", "price": "10.00"}]
            })
        );
    }

    #[test]
    fn test_record_template_lookup() {
        let template = Template::compile("product", PRODUCT).unwrap();
        let variants = template.root().get(VARIANTS_KEY).unwrap();
        assert!(variants.record_template().is_some());
        assert!(template.root().get("missing").is_none());
    }
}
