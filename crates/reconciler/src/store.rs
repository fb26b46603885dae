//! External interfaces consumed by the engine, and in-memory implementations
//! used by tests and fixture mode.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use itertools::Itertools;
use serde_json::{Map, Value};
use shelfsync_template::VARIANTS_KEY;
use tokio::sync::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::patch::ID_KEY;
use crate::types::{DestinationRecord, LinkEntry, Location, QuantityLevel, SourceRecord};

/// Reader for the authoritative catalog.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Full source record set.
    async fn list(&self) -> Result<Vec<SourceRecord>>;
}

/// Reader/writer for one destination channel.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Full destination record set.
    async fn list(&self) -> Result<Vec<DestinationRecord>>;

    /// Create a product from a projected document; returns its new id.
    async fn create(&self, document: &Value) -> Result<String>;

    /// Apply a patch to a product.
    async fn update(&self, destination_id: &str, patch: &Value) -> Result<()>;

    /// Archive a product with the given payload.
    async fn archive(&self, destination_id: &str, payload: &Value) -> Result<()>;

    /// Inventory locations of the channel.
    async fn locations(&self) -> Result<Vec<Location>>;

    /// Bulk-write on-hand levels at a location.
    async fn set_quantities(&self, location_id: &str, levels: &[QuantityLevel]) -> Result<()>;

    /// Read on-hand levels back. Items not stocked at the location are absent.
    async fn get_quantities(
        &self,
        location_id: &str,
        inventory_item_ids: &[String],
    ) -> Result<HashMap<String, i64>>;
}

/// Persisted source/destination associations.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Link entries of a channel.
    async fn get(&self, channel: &str) -> Result<Vec<LinkEntry>>;

    /// Record the destination id created for a source id.
    ///
    /// Atomic per source id. Refuses to replace a different destination id
    /// already linked to the source.
    async fn set_destination_id(
        &self,
        channel: &str,
        source_id: &str,
        destination_id: &str,
    ) -> Result<()>;
}

/// Last known on-hand levels, refreshed outside the engine.
#[async_trait]
pub trait QuantitySnapshot: Send + Sync {
    /// Cached levels at a location for the given inventory items.
    async fn get(
        &self,
        location_id: &str,
        inventory_item_ids: &[String],
    ) -> Result<HashMap<String, i64>>;
}

/// In-memory source catalog.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    records: RwLock<Vec<SourceRecord>>,
}

impl InMemoryCatalog {
    /// Catalog holding `records`.
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Replace the catalog contents.
    pub async fn replace(&self, records: Vec<SourceRecord>) {
        *self.records.write().await = records;
    }
}

#[async_trait]
impl SourceCatalog for InMemoryCatalog {
    async fn list(&self) -> Result<Vec<SourceRecord>> {
        Ok(self.records.read().await.clone())
    }
}

/// A mutating call received by [`InMemoryDestination`].
#[derive(Debug, Clone, PartialEq)]
pub enum DestinationCall {
    Create {
        destination_id: String,
        document: Value,
    },
    Update {
        destination_id: String,
        patch: Value,
    },
    Archive {
        destination_id: String,
        payload: Value,
    },
    SetQuantities {
        location_id: String,
        levels: Vec<QuantityLevel>,
    },
}

type LevelKey = (String, String);

/// In-memory destination store.
///
/// With a read lag of `n`, a written level stays invisible to the next `n`
/// reads of that item, imitating asynchronous inventory propagation.
#[derive(Debug)]
pub struct InMemoryDestination {
    products: RwLock<BTreeMap<String, DestinationRecord>>,
    locations: Vec<Location>,
    levels: RwLock<HashMap<LevelKey, i64>>,
    staged: Mutex<HashMap<LevelKey, (i64, u32)>>,
    read_lag: u32,
    rejected_items: HashSet<String>,
    calls: Mutex<Vec<DestinationCall>>,
    next_id: AtomicU64,
}

impl Default for InMemoryDestination {
    fn default() -> Self {
        Self {
            products: RwLock::new(BTreeMap::new()),
            locations: Vec::new(),
            levels: RwLock::new(HashMap::new()),
            staged: Mutex::new(HashMap::new()),
            read_lag: 0,
            rejected_items: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1000),
        }
    }
}

impl InMemoryDestination {
    /// Empty destination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product.
    #[must_use]
    pub fn with_product(mut self, record: DestinationRecord) -> Self {
        self.products.get_mut().insert(record.id.clone(), record);
        self
    }

    /// Add a location.
    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    /// Set a visible on-hand level.
    #[must_use]
    pub fn with_level(mut self, location_id: &str, inventory_item_id: &str, quantity: i64) -> Self {
        self.levels.get_mut().insert(
            (location_id.to_string(), inventory_item_id.to_string()),
            quantity,
        );
        self
    }

    /// Hide each written level from the next `reads` reads.
    #[must_use]
    pub fn with_read_lag(mut self, reads: u32) -> Self {
        self.read_lag = reads;
        self
    }

    /// Fail every quantity write that includes this item.
    #[must_use]
    pub fn with_rejected_item(mut self, inventory_item_id: impl Into<String>) -> Self {
        self.rejected_items.insert(inventory_item_id.into());
        self
    }

    /// Current products.
    pub async fn products(&self) -> Vec<DestinationRecord> {
        self.products.read().await.values().cloned().collect_vec()
    }

    /// One product by id.
    pub async fn product(&self, destination_id: &str) -> Option<DestinationRecord> {
        self.products.read().await.get(destination_id).cloned()
    }

    /// Every mutating call received so far.
    pub async fn calls(&self) -> Vec<DestinationCall> {
        self.calls.lock().await.clone()
    }

    /// Level visible at a location, ignoring staged writes.
    pub async fn level(&self, location_id: &str, inventory_item_id: &str) -> Option<i64> {
        self.levels
            .read()
            .await
            .get(&(location_id.to_string(), inventory_item_id.to_string()))
            .copied()
    }

    /// Every visible level as `(location, inventory item, quantity)`, sorted.
    pub async fn levels(&self) -> Vec<(String, String, i64)> {
        self.levels
            .read()
            .await
            .iter()
            .map(|((location, item), quantity)| (location.clone(), item.clone(), *quantity))
            .sorted()
            .collect_vec()
    }

    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    async fn record(&self, call: DestinationCall) {
        self.calls.lock().await.push(call);
    }

    async fn modify(
        &self,
        operation: &str,
        destination_id: &str,
        change: impl FnOnce(&mut Map<String, Value>),
    ) -> Result<()> {
        let mut products = self.products.write().await;
        let record = products.get_mut(destination_id).ok_or_else(|| {
            Error::transport(operation, format!("product '{destination_id}' not found"))
        })?;
        let mut document = match record.to_document()? {
            Value::Object(map) => map,
            _ => return Err(Error::invalid_record("product is not an object")),
        };
        change(&mut document);
        *record = serde_json::from_value(Value::Object(document))
            .map_err(|e| Error::invalid_record(e.to_string()))?;
        Ok(())
    }
}

/// Copy every key of `source` except `id` and `variants` into `target`.
fn merge_fields(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        if key != ID_KEY && key != VARIANTS_KEY {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn apply_patch(document: &mut Map<String, Value>, patch: &Map<String, Value>) {
    merge_fields(document, patch);
    let Some(variant_patches) = patch.get(VARIANTS_KEY).and_then(Value::as_array) else {
        return;
    };
    let Some(Value::Array(variants)) = document.get_mut(VARIANTS_KEY) else {
        return;
    };
    for variant_patch in variant_patches.iter().filter_map(Value::as_object) {
        let target = variants
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .find(|variant| variant.get(ID_KEY) == variant_patch.get(ID_KEY));
        if let Some(variant) = target {
            merge_fields(variant, variant_patch);
        }
    }
}

#[async_trait]
impl DestinationStore for InMemoryDestination {
    async fn list(&self) -> Result<Vec<DestinationRecord>> {
        Ok(self.products().await)
    }

    async fn create(&self, document: &Value) -> Result<String> {
        let Value::Object(fields) = document else {
            return Err(Error::invalid_record("created document is not an object"));
        };
        let destination_id = self.next_id();
        let mut fields = fields.clone();
        fields.insert(ID_KEY.to_string(), Value::String(destination_id.clone()));

        let mut record: DestinationRecord = serde_json::from_value(Value::Object(fields))
            .map_err(|e| Error::invalid_record(e.to_string()))?;
        for variant in &mut record.variants {
            if variant.id.is_none() {
                variant.id = Some(self.next_id());
            }
            if variant.inventory_item_id.is_none() {
                variant.inventory_item_id = Some(self.next_id());
            }
        }

        self.products
            .write()
            .await
            .insert(destination_id.clone(), record);
        self.record(DestinationCall::Create {
            destination_id: destination_id.clone(),
            document: document.clone(),
        })
        .await;
        Ok(destination_id)
    }

    async fn update(&self, destination_id: &str, patch: &Value) -> Result<()> {
        let Value::Object(fields) = patch else {
            return Err(Error::invalid_record("patch is not an object"));
        };
        self.modify("update", destination_id, |document| {
            apply_patch(document, fields);
        })
        .await?;
        self.record(DestinationCall::Update {
            destination_id: destination_id.to_string(),
            patch: patch.clone(),
        })
        .await;
        Ok(())
    }

    async fn archive(&self, destination_id: &str, payload: &Value) -> Result<()> {
        let Value::Object(fields) = payload else {
            return Err(Error::invalid_record("archive payload is not an object"));
        };
        self.modify("archive", destination_id, |document| {
            merge_fields(document, fields);
        })
        .await?;
        self.record(DestinationCall::Archive {
            destination_id: destination_id.to_string(),
            payload: payload.clone(),
        })
        .await;
        Ok(())
    }

    async fn locations(&self) -> Result<Vec<Location>> {
        Ok(self.locations.clone())
    }

    async fn set_quantities(&self, location_id: &str, levels: &[QuantityLevel]) -> Result<()> {
        if let Some(rejected) = levels
            .iter()
            .find(|level| self.rejected_items.contains(&level.inventory_item_id))
        {
            return Err(Error::transport(
                "set_quantities",
                format!("inventory item '{}' rejected", rejected.inventory_item_id),
            ));
        }

        if self.read_lag == 0 {
            let mut visible = self.levels.write().await;
            for level in levels {
                visible.insert(
                    (location_id.to_string(), level.inventory_item_id.clone()),
                    level.quantity,
                );
            }
        } else {
            let mut staged = self.staged.lock().await;
            for level in levels {
                staged.insert(
                    (location_id.to_string(), level.inventory_item_id.clone()),
                    (level.quantity, self.read_lag),
                );
            }
        }

        self.record(DestinationCall::SetQuantities {
            location_id: location_id.to_string(),
            levels: levels.to_vec(),
        })
        .await;
        Ok(())
    }

    async fn get_quantities(
        &self,
        location_id: &str,
        inventory_item_ids: &[String],
    ) -> Result<HashMap<String, i64>> {
        let mut staged = self.staged.lock().await;
        let mut visible = self.levels.write().await;
        let mut found = HashMap::new();

        for item in inventory_item_ids {
            let key = (location_id.to_string(), item.clone());
            if let Some((quantity, remaining)) = staged.get_mut(&key) {
                if *remaining == 0 {
                    visible.insert(key.clone(), *quantity);
                    staged.remove(&key);
                } else {
                    *remaining -= 1;
                }
            }
            if let Some(quantity) = visible.get(&key) {
                found.insert(item.clone(), *quantity);
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl QuantitySnapshot for InMemoryDestination {
    async fn get(
        &self,
        location_id: &str,
        inventory_item_ids: &[String],
    ) -> Result<HashMap<String, i64>> {
        let visible = self.levels.read().await;
        Ok(inventory_item_ids
            .iter()
            .filter_map(|item| {
                visible
                    .get(&(location_id.to_string(), item.clone()))
                    .map(|quantity| (item.clone(), *quantity))
            })
            .collect())
    }
}

/// In-memory link mapping, keyed by channel.
#[derive(Debug, Default)]
pub struct InMemoryLinkStore {
    entries: RwLock<HashMap<String, Vec<LinkEntry>>>,
}

impl InMemoryLinkStore {
    /// Empty link store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a channel's entries.
    #[must_use]
    pub fn with_entries(mut self, channel: impl Into<String>, entries: Vec<LinkEntry>) -> Self {
        self.entries.get_mut().insert(channel.into(), entries);
        self
    }

    /// Every channel's entries.
    pub async fn snapshot(&self) -> HashMap<String, Vec<LinkEntry>> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl LinkStore for InMemoryLinkStore {
    async fn get(&self, channel: &str) -> Result<Vec<LinkEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .get(channel)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_destination_id(
        &self,
        channel: &str,
        source_id: &str,
        destination_id: &str,
    ) -> Result<()> {
        let mut entries = self.entries.write().await;
        let channel_entries = entries.entry(channel.to_string()).or_default();

        if let Some((other, _)) = channel_entries
            .iter()
            .filter_map(LinkEntry::pair)
            .find(|(other, linked)| *linked == destination_id && *other != source_id)
        {
            return Err(Error::link_conflict(
                source_id,
                format!("destination '{destination_id}' is already linked to '{other}'"),
            ));
        }

        match channel_entries
            .iter_mut()
            .find(|entry| entry.source_id.as_deref() == Some(source_id))
        {
            Some(entry) => match entry.destination_id.as_deref() {
                Some(existing) if !existing.is_empty() && existing != destination_id => Err(Error::link_conflict(
                    source_id,
                    format!("already linked to destination '{existing}'"),
                )),
                _ => {
                    entry.destination_id = Some(destination_id.to_string());
                    Ok(())
                }
            },
            None => {
                channel_entries.push(LinkEntry::linked(source_id, destination_id));
                Ok(())
            }
        }
    }
}

/// In-memory quantity snapshot, keyed by location.
#[derive(Debug, Default)]
pub struct InMemorySnapshot {
    levels: RwLock<HashMap<String, HashMap<String, i64>>>,
}

impl InMemorySnapshot {
    /// Empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one cached level.
    #[must_use]
    pub fn with_level(mut self, location_id: &str, inventory_item_id: &str, quantity: i64) -> Self {
        self.levels
            .get_mut()
            .entry(location_id.to_string())
            .or_default()
            .insert(inventory_item_id.to_string(), quantity);
        self
    }

    /// Refresh one cached level.
    pub async fn set(&self, location_id: &str, inventory_item_id: &str, quantity: i64) {
        self.levels
            .write()
            .await
            .entry(location_id.to_string())
            .or_default()
            .insert(inventory_item_id.to_string(), quantity);
    }
}

#[async_trait]
impl QuantitySnapshot for InMemorySnapshot {
    async fn get(
        &self,
        location_id: &str,
        inventory_item_ids: &[String],
    ) -> Result<HashMap<String, i64>> {
        let levels = self.levels.read().await;
        let Some(location) = levels.get(location_id) else {
            return Ok(HashMap::new());
        };
        Ok(inventory_item_ids
            .iter()
            .filter_map(|item| location.get(item).map(|quantity| (item.clone(), *quantity)))
            .collect())
    }
}
