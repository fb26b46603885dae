//! Integration tests for compiling realistic templates.

use serde_json::json;
use shelfsync_template::{Error, Template};

const STOREFRONT: &str = r#"
# Storefront product template
title:        'record.name'
body_html:    'record.description or ""'
vendor:       'record.manufacturer or "Acme Supply"'
product_type: 'record.category_name or "goods"'
status:       '"active" if record.status == "active" else "draft"'
tags:         ["imported"]
variants: [
  {
    sku:                'record.sku or parent.item_id',
    price:              'str(round(record.rate, 2))',
    inventory_quantity: 'int(record.stock_on_hand or 0)',
    taxable:            true,
  }
]
"#;

#[test]
fn test_storefront_template_projects_item_with_variants() -> Result<(), String> {
    // Given: a compiled storefront template
    let template = Template::compile("storefront", STOREFRONT).map_err(|e| e.to_string())?;

    // When: an item with two variants is projected
    let item = json!({
        "item_id": "4815",
        "name": "Desk Lamp",
        "description": "",
        "status": "active",
        "variants": [
            {"sku": "LAMP-W", "rate": 24.5, "stock_on_hand": "7"},
            {"sku": null, "rate": "19.999"}
        ]
    });
    let desired = template.project(&item).map_err(|e| e.to_string())?;

    // Then: every header field and every variant is shaped by the template
    assert_eq!(
        desired,
        json!({
            "title": "Desk Lamp",
            "body_html": "",
            "vendor": "Acme Supply",
            "product_type": "goods",
            "status": "active",
            "tags": ["imported"],
            "variants": [
                {"sku": "LAMP-W", "price": "24.5", "inventory_quantity": 7, "taxable": true},
                {"sku": "4815", "price": "20.0", "inventory_quantity": 0, "taxable": true}
            ]
        })
    );
    Ok(())
}

#[test]
fn test_storefront_schema_filters_destination() -> Result<(), String> {
    // Given: a compiled storefront template and a destination product
    let template = Template::compile("storefront", STOREFRONT).map_err(|e| e.to_string())?;
    let product = json!({
        "id": 42,
        "title": "Desk Lamp",
        "status": "draft",
        "tags": ["imported", "sale"],
        "published_at": null,
        "variants": [
            {"id": 7, "sku": "LAMP-W", "price": "24.50", "inventory_item_id": 99, "inventory_quantity": 7, "taxable": true}
        ]
    });

    // When: the destination is filtered without synthesising missing keys
    let current = template.filter(&product, false);

    // Then: only template keys survive, in template order
    assert_eq!(
        current,
        json!({
            "title": "Desk Lamp",
            "status": "draft",
            "tags": ["imported", "sale"],
            "variants": [
                {"sku": "LAMP-W", "price": "24.50", "inventory_quantity": 7, "taxable": true}
            ]
        })
    );
    Ok(())
}

#[test]
fn test_syntax_errors_carry_position() {
    let cases = [
        ("title 'record.name'", 1, 7),
        ("title: 'record.name'\nvendor: 'vendor.name'", 2, 10),
        ("title: 'eval(record.name)'", 1, 9),
        ("title: 'record.name'\nvariants: [\n  { sku: 'record.sku' \n", 4, 1),
    ];

    for (text, line, column) in cases {
        match Template::compile("broken", text) {
            Err(Error::TemplateSyntax {
                line: got_line,
                column: got_column,
                ..
            }) => {
                assert_eq!((got_line, got_column), (line, column), "for {text:?}");
            }
            other => panic!("expected a syntax error for {text:?}, got {other:?}"),
        }
    }
}

#[test]
fn test_one_broken_template_does_not_affect_another() {
    let broken = Template::compile("broken", "title: 'record.name");
    let good = Template::compile("good", "title: 'record.name'");
    assert!(broken.is_err());
    assert!(good.is_ok());
}
