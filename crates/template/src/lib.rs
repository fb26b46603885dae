//! Field-mapping templates for shelfsync.
//!
//! A template maps a source record onto the shape of a destination record:
//!
//! ```text
//! title:  'record.name'
//! status: '"active" if record.status == "active" else "draft"'
//! variants: [
//!   { sku: 'record.sku or parent.id', price: 'str(record.price)' }
//! ]
//! ```
//!
//! Compiling a template yields two artefacts:
//!
//! - the **projection template** ([`TemplateNode`]), whose expression leaves
//!   are evaluated by the projector into the *desired* document;
//! - the **schema** ([`Schema`]), which filters a destination record down to
//!   the *current* document comparable with the desired one.
//!
//! Expressions are compiled to a typed AST ([`expr::Expr`]) and evaluated in
//! a sandbox that exposes only `record`, `parent` and a short list of pure
//! functions.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use shelfsync_template::Template;
//!
//! let template = Template::compile("product", "title: 'record.name'").unwrap();
//! let desired = template.project(&json!({"name": "Lamp"})).unwrap();
//! assert_eq!(desired, json!({"title": "Lamp"}));
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod expr;
pub mod projector;
pub mod schema;
pub mod syntax;
pub mod template;

pub use error::{Error, Result};
pub use expr::{Expression, Scope};
pub use schema::Schema;
pub use template::{Template, TemplateNode, VARIANTS_KEY};
