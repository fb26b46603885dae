//! Catalog and inventory reconciliation engine.
//!
//! A pass over one destination channel:
//!
//! 1. Loads the source catalog, the destination records and the channel's
//!    link mapping
//! 2. Classifies every item as create, update, archive or no-op by
//!    projecting the source record through a template and diffing it with
//!    the schema-filtered destination record
//! 3. Applies the decisions, sending minimal patches only
//! 4. Aligns on-hand quantities at the channel's location, verifying each
//!    batch by reading it back
//!
//! Running a pass twice with no source change produces no updates the
//! second time.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use shelfsync_reconciler::{
//!     Channel, InMemoryCatalog, InMemoryDestination, InMemoryLinkStore, ReconcilerBuilder,
//! };
//! use shelfsync_template::Template;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let destination = Arc::new(InMemoryDestination::new());
//! let reconciler = ReconcilerBuilder::new()
//!     .with_sources(Arc::new(InMemoryCatalog::default()))
//!     .with_destination(destination.clone())
//!     .with_links(Arc::new(InMemoryLinkStore::new()))
//!     .with_snapshot(destination)
//!     .build()?;
//!
//! let template = Template::compile("product", "title: 'record.name'")?;
//! let report = reconciler
//!     .run(&Channel::new("web").with_location("main"), &template, CancellationToken::new())
//!     .await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod call;
pub mod classify;
pub mod compare;
pub mod config;
pub mod error;
pub mod patch;
pub mod quantity;
pub mod reconciler;
pub mod report;
pub mod selection;
pub mod store;
pub mod types;

pub use call::CallGuard;
pub use classify::{ArchiveReason, Classifier, Decision, NoOpReason};
pub use compare::{diff, Difference};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use patch::synthesize;
pub use quantity::{plan_jobs, QuantityAction, QuantityJob, QuantityReconciler};
pub use reconciler::{Channel, Reconciler, ReconcilerBuilder};
pub use report::{ItemAction, ItemOutcome, QuantityMismatch, QuantityReport, RunReport, SkippedItem};
pub use selection::{Matcher, Selection};
pub use store::{
    DestinationCall, DestinationStore, InMemoryCatalog, InMemoryDestination, InMemoryLinkStore,
    InMemorySnapshot, LinkStore, QuantitySnapshot, SourceCatalog,
};
pub use types::{
    DestinationRecord, DestinationVariant, LinkEntry, Location, QuantityLevel, SourceRecord,
    SourceVariant, StockUnit,
};
