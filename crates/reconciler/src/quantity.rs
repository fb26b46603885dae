//! Quantity reconciler: aligns on-hand levels at one location.
//!
//! Sending a level is intent; reading it back is confirmation. The
//! destination propagates inventory asynchronously, so each batch is read
//! back with bounded, linearly backed-off retries and only the items still
//! disagreeing are reported.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::call::CallGuard;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::report::{QuantityMismatch, QuantityReport};
use crate::store::{DestinationStore, QuantitySnapshot};
use crate::types::{DestinationRecord, LinkEntry, QuantityLevel, SourceRecord};

/// One desired on-hand level. Built per pass, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityJob {
    pub inventory_item_id: String,
    pub location_id: String,
    pub desired: i64,
    pub source_id: String,
    pub destination_id: String,
    pub sku: Option<String>,
}

impl QuantityJob {
    fn level(&self) -> QuantityLevel {
        QuantityLevel {
            inventory_item_id: self.inventory_item_id.clone(),
            quantity: self.desired,
        }
    }

    fn mismatch(&self, reported: Option<i64>) -> QuantityMismatch {
        QuantityMismatch {
            inventory_item_id: self.inventory_item_id.clone(),
            source_id: self.source_id.clone(),
            destination_id: self.destination_id.clone(),
            desired: self.desired,
            reported,
        }
    }
}

/// What a job needs, judged against the cached level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityAction {
    /// Not yet stocked at the location.
    Create,
    /// Stocked at a different level.
    Update { current: i64 },
    NoOp,
}

impl QuantityAction {
    /// Classify a desired level against the cached one.
    pub fn classify(desired: i64, current: Option<i64>) -> Self {
        match current {
            None => Self::Create,
            Some(current) if current != desired => Self::Update { current },
            Some(_) => Self::NoOp,
        }
    }
}

/// Build the jobs of every linked pair at `location_id`.
///
/// Source stock units are matched to destination variants by SKU, falling
/// back to position. Units without a quantity or without a destination
/// inventory item are left out. Each inventory item appears once.
pub fn plan_jobs(
    links: &[LinkEntry],
    sources: &HashMap<String, SourceRecord>,
    destinations: &HashMap<String, DestinationRecord>,
    location_id: &str,
) -> Vec<QuantityJob> {
    let mut jobs = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (source_id, destination_id) in links.iter().filter_map(LinkEntry::pair) {
        let Some(source) = sources.get(source_id).filter(|s| s.is_active()) else {
            continue;
        };
        let Some(destination) = destinations.get(destination_id).filter(|d| !d.is_archived())
        else {
            continue;
        };

        for (index, unit) in source.stock_units().into_iter().enumerate() {
            let Some(desired) = unit.quantity else {
                continue;
            };
            let variant = unit
                .sku
                .as_deref()
                .and_then(|sku| destination.variant_index_by_sku(sku))
                .or_else(|| (index < destination.variants.len()).then_some(index))
                .and_then(|i| destination.variants.get(i));
            let Some(inventory_item_id) = variant.and_then(|v| v.inventory_item_id.clone()) else {
                debug!(source_id, destination_id, sku = ?unit.sku, "No inventory item for stock unit");
                continue;
            };
            if !seen.insert(inventory_item_id.clone()) {
                continue;
            }
            jobs.push(QuantityJob {
                inventory_item_id,
                location_id: location_id.to_string(),
                desired,
                source_id: source_id.to_string(),
                destination_id: destination_id.to_string(),
                sku: unit.sku,
            });
        }
    }
    jobs
}

/// Runs the batch/verify cycle for one location.
pub struct QuantityReconciler<'a> {
    destination: &'a dyn DestinationStore,
    guard: &'a CallGuard,
    config: &'a EngineConfig,
}

impl<'a> QuantityReconciler<'a> {
    /// Create a quantity reconciler.
    pub fn new(
        destination: &'a dyn DestinationStore,
        guard: &'a CallGuard,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            destination,
            guard,
            config,
        }
    }

    /// Classify `jobs` against the snapshot, then send and verify the
    /// changes batch by batch. In dry-run mode nothing is sent.
    ///
    /// A failed batch never blocks the next one.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` when the pass is cancelled, or the
    /// snapshot's error when the cache cannot be read.
    pub async fn run(
        &self,
        location_id: &str,
        jobs: Vec<QuantityJob>,
        snapshot: &dyn QuantitySnapshot,
        report: &mut QuantityReport,
    ) -> Result<()> {
        report.jobs = jobs.len();
        if jobs.is_empty() {
            return Ok(());
        }

        let ids = jobs.iter().map(|job| job.inventory_item_id.clone()).collect_vec();
        let cached = self
            .guard
            .call("snapshot", snapshot.get(location_id, &ids))
            .await?;

        let mut writes = Vec::new();
        for job in jobs {
            let action = QuantityAction::classify(job.desired, cached.get(&job.inventory_item_id).copied());
            debug!(
                inventory_item_id = %job.inventory_item_id,
                source_id = %job.source_id,
                desired = job.desired,
                ?action,
                "Quantity job"
            );
            match action {
                QuantityAction::Create => report.created += 1,
                QuantityAction::Update { .. } => report.updated += 1,
                QuantityAction::NoOp => {
                    report.unchanged += 1;
                    continue;
                }
            }
            writes.push(job);
        }

        if self.config.dry_run || writes.is_empty() {
            return Ok(());
        }

        for (batch, chunk) in writes.chunks(self.config.batch_size).enumerate() {
            self.sync_batch(location_id, batch, chunk, report).await?;
        }

        info!(
            location_id,
            batches = report.batches_sent,
            verified = report.verified_ok,
            failed = report.verify_failed + report.send_failed,
            "Quantity pass finished"
        );
        Ok(())
    }

    async fn sync_batch(
        &self,
        location_id: &str,
        batch: usize,
        jobs: &[QuantityJob],
        report: &mut QuantityReport,
    ) -> Result<()> {
        let levels = jobs.iter().map(QuantityJob::level).collect_vec();
        match self
            .guard
            .destination(
                "set_quantities",
                self.destination.set_quantities(location_id, &levels),
            )
            .await
        {
            Ok(()) => report.batches_sent += 1,
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => {
                warn!(location_id, batch, error = %error, "Quantity batch failed");
                report.send_failed += 1;
                report
                    .mismatches
                    .extend(jobs.iter().map(|job| job.mismatch(None)));
                return Ok(());
            }
        }

        let pending = self.verify(location_id, batch, jobs).await?;
        if pending.is_empty() {
            report.verified_ok += 1;
            return Ok(());
        }

        report.verify_failed += 1;
        for (job, reported) in pending {
            let mismatch =
                Error::verification_mismatch(&job.inventory_item_id, location_id, job.desired, reported);
            warn!(
                location_id,
                batch,
                source_id = %job.source_id,
                destination_id = %job.destination_id,
                error = %mismatch,
                "Quantity did not converge"
            );
            report.mismatches.push(job.mismatch(reported));
        }
        Ok(())
    }

    /// Read the batch back until every item matches or the retry budget is
    /// spent. Returns the jobs still disagreeing with their last reported
    /// level.
    async fn verify<'j>(
        &self,
        location_id: &str,
        batch: usize,
        jobs: &'j [QuantityJob],
    ) -> Result<Vec<(&'j QuantityJob, Option<i64>)>> {
        let mut pending: Vec<(&QuantityJob, Option<i64>)> =
            jobs.iter().map(|job| (job, None)).collect();

        for attempt in 0..=self.config.verify_attempts {
            if attempt > 0 {
                self.guard
                    .sleep("verify", self.config.verify_backoff(attempt))
                    .await?;
            }

            let ids = pending
                .iter()
                .map(|(job, _)| job.inventory_item_id.clone())
                .collect_vec();
            match self
                .guard
                .destination(
                    "get_quantities",
                    self.destination.get_quantities(location_id, &ids),
                )
                .await
            {
                Ok(reported) => {
                    pending = pending
                        .into_iter()
                        .map(|(job, _)| (job, reported.get(&job.inventory_item_id).copied()))
                        .filter(|(job, level)| *level != Some(job.desired))
                        .collect();
                }
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => warn!(location_id, batch, attempt, error = %error, "Quantity read-back failed"),
            }

            if pending.is_empty() {
                break;
            }
            debug!(location_id, batch, attempt, pending = pending.len(), "Quantities not yet visible");
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::store::InMemoryDestination;
    use crate::types::{DestinationVariant, SourceVariant};
    use tokio_util::sync::CancellationToken;

    fn config() -> EngineConfig {
        EngineConfig {
            requests_per_second: 0,
            ..EngineConfig::default()
        }
    }

    fn job(item: &str, desired: i64) -> QuantityJob {
        QuantityJob {
            inventory_item_id: item.to_string(),
            location_id: "loc".to_string(),
            desired,
            source_id: format!("S{item}"),
            destination_id: format!("D{item}"),
            sku: None,
        }
    }

    #[test]
    fn test_quantity_classification() {
        assert_eq!(QuantityAction::classify(10, None), QuantityAction::Create);
        assert_eq!(
            QuantityAction::classify(10, Some(7)),
            QuantityAction::Update { current: 7 }
        );
        assert_eq!(QuantityAction::classify(10, Some(10)), QuantityAction::NoOp);
    }

    #[test]
    fn test_plan_matches_units_to_inventory_items() {
        let sources: HashMap<String, SourceRecord> = [
            SourceRecord::new("Z1")
                .with_variant(SourceVariant::new("B").with_quantity(2))
                .with_variant(SourceVariant::new("A").with_quantity(1)),
            SourceRecord::new("Z2").with_sku("C").with_quantity(5),
            SourceRecord::new("Z3").with_sku("D").with_quantity(9).with_status("inactive"),
        ]
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect();
        let destinations: HashMap<String, DestinationRecord> = [
            DestinationRecord::new("42", "active")
                .with_variant(DestinationVariant::new("1", "A").with_inventory_item("901"))
                .with_variant(DestinationVariant::new("2", "B").with_inventory_item("902")),
            DestinationRecord::new("43", "active")
                .with_variant(DestinationVariant::new("3", "X").with_inventory_item("903")),
            DestinationRecord::new("44", "active")
                .with_variant(DestinationVariant::new("4", "D").with_inventory_item("904")),
        ]
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect();
        let links = [
            LinkEntry::linked("Z1", "42"),
            LinkEntry::linked("Z2", "43"),
            LinkEntry::linked("Z3", "44"),
            LinkEntry::unlinked("Z4"),
        ];

        let jobs = plan_jobs(&links, &sources, &destinations, "loc");
        let summary = jobs
            .iter()
            .map(|j| (j.inventory_item_id.as_str(), j.desired, j.source_id.as_str()))
            .collect_vec();
        assert_eq!(
            summary,
            vec![("902", 2, "Z1"), ("901", 1, "Z1"), ("903", 5, "Z2")]
        );
    }

    #[tokio::test]
    async fn test_run_sends_only_changes() {
        let destination = InMemoryDestination::new()
            .with_level("loc", "1", 10)
            .with_level("loc", "2", 7);
        let config = config();
        let guard = CallGuard::new(&config, CancellationToken::new());
        let reconciler = QuantityReconciler::new(&destination, &guard, &config);
        let mut report = QuantityReport::new("loc");

        reconciler
            .run("loc", vec![job("1", 10), job("2", 8), job("3", 4)], &destination, &mut report)
            .await
            .unwrap();

        assert_eq!((report.created, report.updated, report.unchanged), (1, 1, 1));
        assert_eq!(report.batches_sent, 1);
        assert_eq!(report.verified_ok, 1);
        assert_eq!(destination.level("loc", "2").await, Some(8));
        assert_eq!(destination.level("loc", "3").await, Some(4));
    }

    #[tokio::test]
    async fn test_dry_run_sends_nothing() {
        let destination = InMemoryDestination::new();
        let config = config().with_dry_run(true);
        let guard = CallGuard::new(&config, CancellationToken::new());
        let reconciler = QuantityReconciler::new(&destination, &guard, &config);
        let mut report = QuantityReport::new("loc");

        reconciler
            .run("loc", vec![job("1", 3)], &destination, &mut report)
            .await
            .unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.batches_sent, 0);
        assert!(destination.calls().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagging_reads_converge_within_budget() {
        let destination = InMemoryDestination::new().with_read_lag(2);
        let config = config();
        let guard = CallGuard::new(&config, CancellationToken::new());
        let reconciler = QuantityReconciler::new(&destination, &guard, &config);
        let mut report = QuantityReport::new("loc");

        reconciler
            .run("loc", vec![job("1", 3)], &destination, &mut report)
            .await
            .unwrap();

        assert_eq!(report.verified_ok, 1);
        assert_eq!(report.verify_failed, 0);
        assert!(report.mismatches.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_propagation_is_reported_not_raised() {
        let destination = InMemoryDestination::new().with_read_lag(10);
        let config = config();
        let guard = CallGuard::new(&config, CancellationToken::new());
        let reconciler = QuantityReconciler::new(&destination, &guard, &config);
        let mut report = QuantityReport::new("loc");

        reconciler
            .run("loc", vec![job("1", 3)], &destination, &mut report)
            .await
            .unwrap();

        assert_eq!(report.verify_failed, 1);
        assert_eq!(report.mismatches, vec![job("1", 3).mismatch(None)]);
    }
}
