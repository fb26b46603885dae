//! Fixture snapshots: JSON files that stand in for the external systems.
//!
//! A fixture holds the source catalog plus, per channel, the storefront
//! products, locations, on-hand levels and link mapping. Running against a
//! fixture builds the in-memory stores from it; `--save` writes the stores'
//! final state back.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shelfsync_core::{Error, Result};
use shelfsync_reconciler::{
    DestinationRecord, InMemoryCatalog, InMemoryDestination, InMemoryLinkStore, LinkEntry,
    Location, SourceRecord,
};

/// One stored on-hand level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelFixture {
    pub location_id: String,
    pub inventory_item_id: String,
    pub quantity: i64,
}

/// State of one destination channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelFixture {
    #[serde(default)]
    pub products: Vec<DestinationRecord>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub levels: Vec<LevelFixture>,
    #[serde(default)]
    pub links: Vec<LinkEntry>,
    /// Reads before a written level becomes visible.
    #[serde(default)]
    pub read_lag: u32,
}

/// The stores built from a fixture for one channel.
pub struct FixtureStores {
    pub catalog: Arc<InMemoryCatalog>,
    pub destination: Arc<InMemoryDestination>,
    pub links: Arc<InMemoryLinkStore>,
}

/// Source catalog plus per-channel destination state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub sources: Vec<SourceRecord>,
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelFixture>,
}

impl Fixture {
    /// Load a fixture from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| Error::json_parse_failed(path, e.to_string()))
    }

    /// Write the fixture as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the fixture cannot be serialized or written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| Error::invalid_record(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| Error::file_write_failed(path, e.to_string()))
    }

    /// Build the stores for a channel. A channel missing from the fixture
    /// starts empty.
    pub fn stores(&self, channel: &str) -> FixtureStores {
        let state = self.channels.get(channel).cloned().unwrap_or_default();

        let destination = state
            .products
            .into_iter()
            .fold(InMemoryDestination::new(), InMemoryDestination::with_product);
        let destination = state
            .locations
            .into_iter()
            .fold(destination, InMemoryDestination::with_location);
        let destination = state
            .levels
            .iter()
            .fold(destination, |store, level| {
                store.with_level(&level.location_id, &level.inventory_item_id, level.quantity)
            })
            .with_read_lag(state.read_lag);

        FixtureStores {
            catalog: Arc::new(InMemoryCatalog::new(self.sources.clone())),
            destination: Arc::new(destination),
            links: Arc::new(InMemoryLinkStore::new().with_entries(channel, state.links)),
        }
    }

    /// Copy a channel's final store state back into the fixture.
    pub async fn capture(&mut self, channel: &str, stores: &FixtureStores) {
        let products = stores.destination.products().await;
        let levels = stores
            .destination
            .levels()
            .await
            .into_iter()
            .map(|(location_id, inventory_item_id, quantity)| LevelFixture {
                location_id,
                inventory_item_id,
                quantity,
            })
            .collect();
        let links = stores
            .links
            .snapshot()
            .await
            .remove(channel)
            .unwrap_or_default();

        let state = self.channels.entry(channel.to_string()).or_default();
        state.products = products;
        state.levels = levels;
        state.links = links;
    }
}
