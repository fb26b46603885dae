//! Data model: source and destination records, link entries, locations.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Lifecycle status of an active source record.
pub const ACTIVE: &str = "active";

/// Lifecycle status of an archived destination record.
pub const ARCHIVED: &str = "archived";

/// Identifiers arrive as strings or as numbers depending on the vendor.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Int(i64),
    UInt(u64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Int(n) => n.to_string(),
            RawId::UInt(n) => n.to_string(),
        }
    }
}

fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

fn optional_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawId>::deserialize(deserializer)
        .map(|raw| raw.map(String::from).filter(|id| !id.is_empty()))
}

fn default_status() -> String {
    ACTIVE.to_string()
}

/// One catalog entry from the source system. Read-only to the engine.
///
/// Projection sees the canonical field names below; vendor aliases
/// (`item_id`, `rate`, `stock_on_hand`, ...) are accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(alias = "item_id", deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, alias = "item_name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "manufacturer", skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, alias = "category_name", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, alias = "rate", skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default, alias = "stock_on_hand", skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<SourceVariant>,
    /// Every other vendor field, addressable from templates.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SourceRecord {
    /// Minimal active record.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sku: None,
            name: None,
            description: None,
            vendor: None,
            category: None,
            price: None,
            status: default_status(),
            quantity: None,
            variants: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Set the SKU.
    #[must_use]
    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the unit price.
    #[must_use]
    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    /// Set the lifecycle status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Set the stock quantity.
    #[must_use]
    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Add a variant.
    #[must_use]
    pub fn with_variant(mut self, variant: SourceVariant) -> Self {
        self.variants.push(variant);
        self
    }

    /// Whether the record is active in the source system.
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case(ACTIVE)
    }

    /// The record as a document for projection.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` if the record cannot be serialized.
    pub fn to_document(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::invalid_record(e.to_string()))
    }

    /// Stock-keeping units of the record: its variants, or the record itself
    /// when it has none.
    pub fn stock_units(&self) -> Vec<StockUnit> {
        if self.variants.is_empty() {
            return vec![StockUnit {
                sku: self.sku.clone(),
                quantity: self.quantity,
            }];
        }
        self.variants
            .iter()
            .map(|variant| StockUnit {
                sku: variant.sku.clone(),
                quantity: variant.quantity,
            })
            .collect()
    }
}

/// A variant of a source record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceVariant {
    #[serde(default, deserialize_with = "optional_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, alias = "rate", skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, alias = "stock_on_hand", skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SourceVariant {
    /// Variant with a SKU.
    pub fn new(sku: impl Into<String>) -> Self {
        Self {
            sku: Some(sku.into()),
            ..Self::default()
        }
    }

    /// Set the price.
    #[must_use]
    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    /// Set the stock quantity.
    #[must_use]
    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = Some(quantity);
        self
    }
}

/// SKU and quantity of one stock-keeping unit of a source record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockUnit {
    pub sku: Option<String>,
    pub quantity: Option<i64>,
}

/// One storefront product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationRecord {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub variants: Vec<DestinationVariant>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DestinationRecord {
    /// Product with an id and status.
    pub fn new(id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            variants: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Add a variant.
    #[must_use]
    pub fn with_variant(mut self, variant: DestinationVariant) -> Self {
        self.variants.push(variant);
        self
    }

    /// Set an extra field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Whether the product has been archived. Archived is terminal.
    pub fn is_archived(&self) -> bool {
        self.status.eq_ignore_ascii_case(ARCHIVED)
    }

    /// The record as a document for schema filtering.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` if the record cannot be serialized.
    pub fn to_document(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::invalid_record(e.to_string()))
    }

    /// Index of the variant carrying `sku`.
    pub fn variant_index_by_sku(&self, sku: &str) -> Option<usize> {
        self.variants
            .iter()
            .position(|variant| variant.sku.as_deref() == Some(sku))
    }
}

/// A variant of a destination product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DestinationVariant {
    #[serde(default, deserialize_with = "optional_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "optional_id", skip_serializing_if = "Option::is_none")]
    pub inventory_item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_quantity: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DestinationVariant {
    /// Variant with an id and SKU.
    pub fn new(id: impl Into<String>, sku: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            sku: Some(sku.into()),
            ..Self::default()
        }
    }

    /// Set the price.
    #[must_use]
    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    /// Set the inventory item id.
    #[must_use]
    pub fn with_inventory_item(mut self, inventory_item_id: impl Into<String>) -> Self {
        self.inventory_item_id = Some(inventory_item_id.into());
        self
    }
}

/// Association between a source id and a destination id for one channel.
///
/// No destination id means "not yet created"; no source id means the
/// destination is orphaned and eligible for archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    #[serde(default, deserialize_with = "optional_id", skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, deserialize_with = "optional_id", skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<String>,
}

impl LinkEntry {
    /// Entry linking both sides.
    pub fn linked(source_id: impl Into<String>, destination_id: impl Into<String>) -> Self {
        Self {
            source_id: Some(source_id.into()),
            destination_id: Some(destination_id.into()),
        }
    }

    /// Entry for a source that has no destination yet.
    pub fn unlinked(source_id: impl Into<String>) -> Self {
        Self {
            source_id: Some(source_id.into()),
            destination_id: None,
        }
    }

    /// Entry for a destination without a source.
    pub fn orphaned(destination_id: impl Into<String>) -> Self {
        Self {
            source_id: None,
            destination_id: Some(destination_id.into()),
        }
    }

    /// Both ids, when the entry links a pair.
    pub fn pair(&self) -> Option<(&str, &str)> {
        self.source_id
            .as_deref()
            .zip(self.destination_id.as_deref())
            .filter(|(source, destination)| !source.is_empty() && !destination.is_empty())
    }

    /// Source id of an entry that does not link a destination yet.
    pub fn pending_source(&self) -> Option<&str> {
        match (self.source_id.as_deref(), self.destination_id.as_deref()) {
            (Some(source), None | Some("")) if !source.is_empty() => Some(source),
            _ => None,
        }
    }

    /// Destination id of an entry that has no source.
    pub fn orphan_destination(&self) -> Option<&str> {
        match (self.source_id.as_deref(), self.destination_id.as_deref()) {
            (None | Some(""), Some(destination)) if !destination.is_empty() => Some(destination),
            _ => None,
        }
    }
}

/// A destination inventory location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Location {
    /// Active location.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            active: true,
        }
    }

    /// Mark the location inactive.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// One on-hand level to write at a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityLevel {
    pub inventory_item_id: String,
    pub quantity: i64,
}
