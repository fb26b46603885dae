//! Run report: what a pass attempted and what converged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

use crate::error::Error;

/// Action taken (or planned, in dry-run mode) for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemAction {
    Create,
    Update,
    Archive,
    NoOp,
}

/// Outcome for one item of a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<String>,
    pub action: ItemAction,
    pub detail: String,
    /// Document, patch or archive payload sent (or that would be sent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// An item skipped because of a per-item error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<String>,
    pub error: String,
}

/// A quantity whose read-back never matched the intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityMismatch {
    pub inventory_item_id: String,
    pub source_id: String,
    pub destination_id: String,
    pub desired: i64,
    /// `None` when the item was still not stocked at the location.
    pub reported: Option<i64>,
}

/// Counters of the quantity pass at one location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityReport {
    pub location_id: String,
    pub jobs: usize,
    pub batches_sent: usize,
    /// Batches whose bulk write failed; their items are listed as mismatches.
    pub send_failed: usize,
    pub verified_ok: usize,
    pub verify_failed: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<QuantityMismatch>,
}

impl QuantityReport {
    /// Empty report for a location.
    pub fn new(location_id: impl Into<String>) -> Self {
        Self {
            location_id: location_id.into(),
            ..Self::default()
        }
    }

    /// Nothing needed writing and nothing failed.
    pub fn converged(&self) -> bool {
        self.created == 0
            && self.updated == 0
            && self.send_failed == 0
            && self.verify_failed == 0
            && self.mismatches.is_empty()
    }
}

/// Structured report of one reconciliation pass over one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Ulid,
    pub channel: String,
    pub template: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub created: usize,
    pub updated: usize,
    pub archived: usize,
    pub unchanged: usize,
    pub items: Vec<ItemOutcome>,
    pub skipped: Vec<SkippedItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantities: Option<QuantityReport>,
    /// Failure after items were applied; the counts above still stand.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_error: Option<String>,
    pub cancelled: bool,
}

impl RunReport {
    /// Start a report for a pass.
    pub fn new(channel: impl Into<String>, template: impl Into<String>, dry_run: bool) -> Self {
        Self {
            run_id: Ulid::new(),
            channel: channel.into(),
            template: template.into(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            created: 0,
            updated: 0,
            archived: 0,
            unchanged: 0,
            items: Vec::new(),
            skipped: Vec::new(),
            quantities: None,
            pass_error: None,
            cancelled: false,
        }
    }

    /// Record an item outcome and bump its counter.
    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome.action {
            ItemAction::Create => self.created += 1,
            ItemAction::Update => self.updated += 1,
            ItemAction::Archive => self.archived += 1,
            ItemAction::NoOp => self.unchanged += 1,
        }
        self.items.push(outcome);
    }

    /// Record a skipped item.
    pub fn skip(&mut self, source_id: Option<&str>, destination_id: Option<&str>, error: &Error) {
        self.skipped.push(SkippedItem {
            source_id: source_id.map(str::to_string),
            destination_id: destination_id.map(str::to_string),
            error: error.to_string(),
        });
    }

    /// Stamp the finish time.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// True when the pass changed nothing, skipped nothing and every
    /// quantity batch verified.
    pub fn converged(&self) -> bool {
        !self.cancelled
            && self.pass_error.is_none()
            && self.created == 0
            && self.updated == 0
            && self.archived == 0
            && self.skipped.is_empty()
            && self.quantities.as_ref().is_none_or(QuantityReport::converged)
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{}: {} created, {} updated, {} archived, {} unchanged, {} skipped",
            self.channel,
            self.created,
            self.updated,
            self.archived,
            self.unchanged,
            self.skipped.len()
        );
        if let Some(quantities) = &self.quantities {
            line.push_str(&format!(
                "; quantities at {}: {} batches, {} verified, {} failed",
                quantities.location_id,
                quantities.batches_sent,
                quantities.verified_ok,
                quantities.verify_failed + quantities.send_failed
            ));
        }
        if self.dry_run {
            line.push_str(" (dry run)");
        }
        if let Some(error) = &self.pass_error {
            line.push_str(&format!(" (incomplete: {error})"));
        }
        if self.cancelled {
            line.push_str(" (cancelled)");
        }
        line
    }
}
