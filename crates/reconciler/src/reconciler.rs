//! Pass engine: loads a channel, classifies it, applies the decisions and
//! runs the quantity pass.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shelfsync_template::Template;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::call::CallGuard;
use crate::classify::{ArchiveReason, Classifier, Decision, NoOpReason};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::quantity::{plan_jobs, QuantityReconciler};
use crate::report::{ItemAction, ItemOutcome, QuantityReport, RunReport};
use crate::selection::Selection;
use crate::store::{DestinationStore, LinkStore, QuantitySnapshot, SourceCatalog};
use crate::types::{DestinationRecord, LinkEntry, Location, SourceRecord, ARCHIVED};

/// One destination channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    /// Inventory location; resolved from the destination when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    /// Source records the channel carries beyond its link entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Selection>,
}

impl Channel {
    /// Channel with no location and no selection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location_id: None,
            select: None,
        }
    }

    /// Pin the inventory location.
    #[must_use]
    pub fn with_location(mut self, location_id: impl Into<String>) -> Self {
        self.location_id = Some(location_id.into());
        self
    }

    /// Set the item selection.
    #[must_use]
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.select = Some(selection);
        self
    }
}

/// Everything a pass reads before deciding.
struct ChannelState {
    links: Vec<LinkEntry>,
    sources: HashMap<String, SourceRecord>,
    destinations: HashMap<String, DestinationRecord>,
}

/// Result of applying one decision.
struct Attempt {
    source_id: Option<String>,
    destination_id: Option<String>,
    result: Result<ItemOutcome>,
}

/// Reconciles destination channels against the source catalog.
pub struct Reconciler {
    sources: Arc<dyn SourceCatalog>,
    destination: Arc<dyn DestinationStore>,
    links: Arc<dyn LinkStore>,
    snapshot: Arc<dyn QuantitySnapshot>,
    config: EngineConfig,
}

impl Reconciler {
    /// Create a reconciler.
    pub fn new(
        sources: Arc<dyn SourceCatalog>,
        destination: Arc<dyn DestinationStore>,
        links: Arc<dyn LinkStore>,
        snapshot: Arc<dyn QuantitySnapshot>,
        config: EngineConfig,
    ) -> Self {
        Self {
            sources,
            destination,
            links,
            snapshot,
            config,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one pass over a channel.
    ///
    /// Per-item problems are skipped and recorded in the report. A cancelled
    /// pass returns the report of what was done with `cancelled` set. Once
    /// items have been applied, a later failure is recorded in `pass_error`
    /// and the report is still returned.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for configuration problems, and the
    /// error of any load that fails before a decision is taken.
    pub async fn run(
        &self,
        channel: &Channel,
        template: &Template,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        self.config.validate()?;
        let guard = CallGuard::new(&self.config, cancel);
        let mut report = RunReport::new(&channel.name, template.name(), self.config.dry_run);

        info!(
            channel = %channel.name,
            template = %template.name(),
            dry_run = self.config.dry_run,
            "Starting reconciliation"
        );

        match self.pass(channel, template, &guard, &mut report).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                warn!(channel = %channel.name, error = %e, "Reconciliation cancelled");
                report.cancelled = true;
            }
            Err(e) => {
                error!(channel = %channel.name, error = %e, "Reconciliation aborted");
                return Err(e);
            }
        }
        report.finish();

        if report.converged() {
            info!(channel = %channel.name, "Channel converged");
        } else {
            info!(
                channel = %channel.name,
                created = report.created,
                updated = report.updated,
                archived = report.archived,
                unchanged = report.unchanged,
                skipped = report.skipped.len(),
                "Reconciliation complete"
            );
        }
        Ok(report)
    }

    async fn pass(
        &self,
        channel: &Channel,
        template: &Template,
        guard: &CallGuard,
        report: &mut RunReport,
    ) -> Result<()> {
        let mut state = self.load(channel, guard).await?;
        let location_id = self.resolve_location(channel, guard).await?;

        let decisions = Classifier::new(template, self.config.keep_missing).classify(
            &state.links,
            &state.sources,
            &state.destinations,
        );
        debug!(channel = %channel.name, decisions = decisions.len(), "Classified channel");

        let created = self.apply(channel, decisions, guard, report).await?;

        let finished = self
            .finish_pass(channel, created, &location_id, &mut state, guard, report)
            .await;
        match finished {
            Err(e) if !e.is_cancelled() => {
                error!(channel = %channel.name, error = %e, "Pass stopped after applying items");
                report.pass_error = Some(e.to_string());
                Ok(())
            }
            other => other,
        }
    }

    /// Everything after the item mutations: reload what creates changed,
    /// then reconcile quantities.
    async fn finish_pass(
        &self,
        channel: &Channel,
        created: usize,
        location_id: &str,
        state: &mut ChannelState,
        guard: &CallGuard,
        report: &mut RunReport,
    ) -> Result<()> {
        if created > 0 && !self.config.dry_run {
            state.links = guard.call("links", self.links.get(&channel.name)).await?;
            state.destinations = index_destinations(
                guard
                    .destination("list_destinations", self.destination.list())
                    .await?,
            );
        }

        let jobs = plan_jobs(&state.links, &state.sources, &state.destinations, location_id);
        let mut quantities = QuantityReport::new(location_id);
        let result = QuantityReconciler::new(self.destination.as_ref(), guard, &self.config)
            .run(location_id, jobs, self.snapshot.as_ref(), &mut quantities)
            .await;
        report.quantities = Some(quantities);
        result
    }

    async fn load(&self, channel: &Channel, guard: &CallGuard) -> Result<ChannelState> {
        let records = guard.call("list_sources", self.sources.list()).await?;
        let mut links = guard.call("links", self.links.get(&channel.name)).await?;
        let destinations = guard
            .destination("list_destinations", self.destination.list())
            .await?;

        if let Some(selection) = &channel.select {
            let linked: HashSet<String> = links
                .iter()
                .filter_map(|link| link.source_id.clone())
                .collect();
            let added = selection
                .select(&channel.name, &records)
                .into_iter()
                .filter(|id| !linked.contains(id))
                .map(LinkEntry::unlinked)
                .collect::<Vec<_>>();
            debug!(channel = %channel.name, added = added.len(), "Selected unlinked sources");
            links.extend(added);
        }

        info!(
            channel = %channel.name,
            sources = records.len(),
            destinations = destinations.len(),
            links = links.len(),
            "Loaded channel"
        );

        Ok(ChannelState {
            links,
            sources: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
            destinations: index_destinations(destinations),
        })
    }

    /// The channel's location, or the one the destination offers: a single
    /// location as-is, else the first active, else the first.
    async fn resolve_location(&self, channel: &Channel, guard: &CallGuard) -> Result<String> {
        if let Some(location_id) = &channel.location_id {
            return Ok(location_id.clone());
        }
        let locations = guard
            .destination("locations", self.destination.locations())
            .await?;
        let chosen = match locations.as_slice() {
            [only] => Some(only),
            all => all.iter().find(|l| l.active).or_else(|| all.first()),
        };
        let location = chosen.map(|l: &Location| l.id.clone()).ok_or_else(|| {
            Error::invalid_config(format!("channel '{}' has no inventory location", channel.name))
        })?;
        debug!(channel = %channel.name, location_id = %location, "Resolved location");
        Ok(location)
    }

    /// Apply decisions in order; returns the number of creates.
    async fn apply(
        &self,
        channel: &Channel,
        decisions: Vec<Decision>,
        guard: &CallGuard,
        report: &mut RunReport,
    ) -> Result<usize> {
        let attempts: Vec<Attempt> = stream::iter(decisions)
            .map(|decision| self.execute(channel, guard, decision))
            .buffered(self.config.concurrency)
            .collect()
            .await;

        let mut created = 0;
        let mut cancelled = None;
        for attempt in attempts {
            match attempt.result {
                Ok(outcome) => {
                    if outcome.action == ItemAction::Create {
                        created += 1;
                    }
                    report.record(outcome);
                }
                Err(e) if e.is_cancelled() => {
                    cancelled.get_or_insert(e);
                }
                Err(e) => {
                    warn!(
                        channel = %channel.name,
                        source_id = ?attempt.source_id,
                        destination_id = ?attempt.destination_id,
                        error = %e,
                        "Item skipped"
                    );
                    report.skip(
                        attempt.source_id.as_deref(),
                        attempt.destination_id.as_deref(),
                        &e,
                    );
                }
            }
        }

        match cancelled {
            Some(e) => Err(e),
            None => Ok(created),
        }
    }

    async fn execute(&self, channel: &Channel, guard: &CallGuard, decision: Decision) -> Attempt {
        let source_id = decision.source_id().map(str::to_string);
        let destination_id = decision.destination_id().map(str::to_string);
        debug!(
            channel = %channel.name,
            source_id = ?source_id,
            destination_id = ?destination_id,
            decision = decision.kind(),
            "Applying decision"
        );

        let result = match decision {
            Decision::Create {
                source_id,
                document,
            } => return self.create(channel, guard, source_id, document).await,
            Decision::Update {
                source_id,
                destination_id,
                patch,
                differences,
            } => {
                let detail = differences
                    .iter()
                    .map(|difference| difference.path.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                self.send(
                    guard,
                    "update",
                    self.destination.update(&destination_id, &patch),
                )
                .await
                .map(|()| ItemOutcome {
                    source_id: Some(source_id),
                    destination_id: Some(destination_id),
                    action: ItemAction::Update,
                    detail,
                    payload: Some(patch),
                })
            }
            Decision::Archive {
                source_id,
                destination_id,
                reason,
            } => {
                let payload = archive_payload(&destination_id);
                self.send(
                    guard,
                    "archive",
                    self.destination.archive(&destination_id, &payload),
                )
                .await
                .map(|()| ItemOutcome {
                    source_id,
                    destination_id: Some(destination_id),
                    action: ItemAction::Archive,
                    detail: archive_detail(reason).to_string(),
                    payload: Some(payload),
                })
            }
            Decision::NoOp {
                source_id,
                destination_id,
                reason,
            } => Ok(ItemOutcome {
                source_id,
                destination_id,
                action: ItemAction::NoOp,
                detail: no_op_detail(reason).to_string(),
                payload: None,
            }),
            Decision::Skip { error, .. } => Err(error),
        };

        Attempt {
            source_id,
            destination_id,
            result,
        }
    }

    /// Create a destination and link it. A link failure keeps the new
    /// destination id on the attempt so the skip names it.
    async fn create(
        &self,
        channel: &Channel,
        guard: &CallGuard,
        source_id: String,
        document: Value,
    ) -> Attempt {
        if self.config.dry_run {
            return Attempt {
                source_id: Some(source_id.clone()),
                destination_id: None,
                result: Ok(ItemOutcome {
                    source_id: Some(source_id),
                    destination_id: None,
                    action: ItemAction::Create,
                    detail: "planned".to_string(),
                    payload: Some(document),
                }),
            };
        }

        let destination_id = match guard
            .destination("create", self.destination.create(&document))
            .await
        {
            Ok(destination_id) => destination_id,
            Err(e) => {
                return Attempt {
                    source_id: Some(source_id),
                    destination_id: None,
                    result: Err(e),
                };
            }
        };
        info!(channel = %channel.name, source_id = %source_id, destination_id = %destination_id, "Created destination");

        let linked = guard
            .settle(
                "link",
                self.links
                    .set_destination_id(&channel.name, &source_id, &destination_id),
            )
            .await;
        let result = match linked {
            Ok(()) => Ok(ItemOutcome {
                source_id: Some(source_id.clone()),
                destination_id: Some(destination_id.clone()),
                action: ItemAction::Create,
                detail: "created".to_string(),
                payload: Some(document),
            }),
            Err(e) => {
                warn!(
                    channel = %channel.name,
                    source_id = %source_id,
                    destination_id = %destination_id,
                    error = %e,
                    "Created destination is not linked"
                );
                Err(e)
            }
        };
        Attempt {
            source_id: Some(source_id),
            destination_id: Some(destination_id),
            result,
        }
    }

    /// Send a mutation through the guard unless in dry-run mode.
    async fn send<F>(&self, guard: &CallGuard, operation: &str, call: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        if self.config.dry_run {
            return Ok(());
        }
        guard.destination(operation, call).await
    }
}

fn index_destinations(records: Vec<DestinationRecord>) -> HashMap<String, DestinationRecord> {
    records.into_iter().map(|r| (r.id.clone(), r)).collect()
}

fn archive_payload(destination_id: &str) -> Value {
    json!({
        "id": destination_id,
        "status": ARCHIVED,
        "published_at": null,
    })
}

fn archive_detail(reason: ArchiveReason) -> &'static str {
    match reason {
        ArchiveReason::SourceInactive => "source inactive or gone",
        ArchiveReason::Unlinked => "link has no source",
        ArchiveReason::NotListed => "not listed",
    }
}

fn no_op_detail(reason: NoOpReason) -> &'static str {
    match reason {
        NoOpReason::InSync => "in sync",
        NoOpReason::NothingToPatch => "only blank source fields differ",
        NoOpReason::AlreadyArchived => "already archived",
        NoOpReason::InactiveSource => "source inactive",
        NoOpReason::DestinationMissing => "destination gone",
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    sources: Option<Arc<dyn SourceCatalog>>,
    destination: Option<Arc<dyn DestinationStore>>,
    links: Option<Arc<dyn LinkStore>>,
    snapshot: Option<Arc<dyn QuantitySnapshot>>,
    config: EngineConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            sources: None,
            destination: None,
            links: None,
            snapshot: None,
            config: EngineConfig::default(),
        }
    }

    /// Set the source catalog.
    #[must_use]
    pub fn with_sources(mut self, sources: Arc<dyn SourceCatalog>) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Set the destination store.
    #[must_use]
    pub fn with_destination(mut self, destination: Arc<dyn DestinationStore>) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Set the link store.
    #[must_use]
    pub fn with_links(mut self, links: Arc<dyn LinkStore>) -> Self {
        self.links = Some(links);
        self
    }

    /// Set the quantity snapshot.
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: Arc<dyn QuantitySnapshot>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable/disable dry-run mode.
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.config.dry_run = enabled;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` when a store is missing or the
    /// configuration does not validate.
    pub fn build(self) -> Result<Reconciler> {
        let sources = self
            .sources
            .ok_or_else(|| Error::invalid_config("Source catalog is required"))?;
        let destination = self
            .destination
            .ok_or_else(|| Error::invalid_config("Destination store is required"))?;
        let links = self
            .links
            .ok_or_else(|| Error::invalid_config("Link store is required"))?;
        let snapshot = self
            .snapshot
            .ok_or_else(|| Error::invalid_config("Quantity snapshot is required"))?;
        self.config.validate()?;

        Ok(Reconciler::new(
            sources,
            destination,
            links,
            snapshot,
            self.config,
        ))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
