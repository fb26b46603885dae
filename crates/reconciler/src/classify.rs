//! Link classifier: partitions a channel's items into create, update,
//! archive and no-op decisions.
//!
//! Per item the lifecycle is `unlinked -> created -> linked -> (no-op |
//! updated)* -> archived`. Archived is terminal: a destination that is
//! already archived is never revived or re-archived, and archiving never
//! touches the link mapping.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shelfsync_template::Template;
use tracing::debug;

use crate::compare::{diff, Difference};
use crate::error::{Error, Result};
use crate::patch::synthesize;
use crate::types::{DestinationRecord, LinkEntry, SourceRecord};

/// Why a destination is archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveReason {
    /// The linked source item is gone or inactive.
    SourceInactive,
    /// The link entry has a destination id but no source id.
    Unlinked,
    /// The destination is not in the link mapping at all.
    NotListed,
}

/// Why nothing needs to happen for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoOpReason {
    /// The diff is empty.
    InSync,
    /// The diff is not empty but only blank desired values differ.
    NothingToPatch,
    /// The destination is archived; archived is terminal.
    AlreadyArchived,
    /// The source item is inactive and was never created.
    InactiveSource,
    /// An orphaned link points at a destination that no longer exists.
    DestinationMissing,
}

/// The classifier's verdict for one item.
#[derive(Debug, Clone)]
pub enum Decision {
    Create {
        source_id: String,
        document: Value,
    },
    Update {
        source_id: String,
        destination_id: String,
        patch: Value,
        differences: Vec<Difference>,
    },
    Archive {
        source_id: Option<String>,
        destination_id: String,
        reason: ArchiveReason,
    },
    NoOp {
        source_id: Option<String>,
        destination_id: Option<String>,
        reason: NoOpReason,
    },
    /// A per-item error: logged, reported and skipped.
    Skip {
        source_id: Option<String>,
        destination_id: Option<String>,
        error: Error,
    },
}

impl Decision {
    /// Source id of the item, if any.
    pub fn source_id(&self) -> Option<&str> {
        match self {
            Self::Create { source_id, .. } | Self::Update { source_id, .. } => Some(source_id),
            Self::Archive { source_id, .. }
            | Self::NoOp { source_id, .. }
            | Self::Skip { source_id, .. } => source_id.as_deref(),
        }
    }

    /// Destination id of the item, if any.
    pub fn destination_id(&self) -> Option<&str> {
        match self {
            Self::Create { .. } => None,
            Self::Update { destination_id, .. } | Self::Archive { destination_id, .. } => {
                Some(destination_id)
            }
            Self::NoOp { destination_id, .. } | Self::Skip { destination_id, .. } => {
                destination_id.as_deref()
            }
        }
    }

    /// Short name of the decision.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Archive { .. } => "archive",
            Self::NoOp { .. } => "no-op",
            Self::Skip { .. } => "skip",
        }
    }

    fn skip(source_id: Option<&str>, destination_id: Option<&str>, error: Error) -> Self {
        Self::Skip {
            source_id: source_id.map(str::to_string),
            destination_id: destination_id.map(str::to_string),
            error,
        }
    }

    fn no_op(source_id: Option<&str>, destination_id: Option<&str>, reason: NoOpReason) -> Self {
        Self::NoOp {
            source_id: source_id.map(str::to_string),
            destination_id: destination_id.map(str::to_string),
            reason,
        }
    }
}

/// Classifies one channel's items against a compiled template.
pub struct Classifier<'a> {
    template: &'a Template,
    keep_missing: bool,
}

impl<'a> Classifier<'a> {
    /// Create a classifier.
    pub fn new(template: &'a Template, keep_missing: bool) -> Self {
        Self {
            template,
            keep_missing,
        }
    }

    /// Classify every item of a channel.
    ///
    /// Every source id and destination id named by `links` or present in
    /// `destinations` receives exactly one decision. Entries are processed
    /// linked pairs first, then sources awaiting creation, then orphaned
    /// destinations, then unlisted destinations in id order; an item already
    /// decided is not decided again.
    pub fn classify(
        &self,
        links: &[LinkEntry],
        sources: &HashMap<String, SourceRecord>,
        destinations: &HashMap<String, DestinationRecord>,
    ) -> Vec<Decision> {
        let mut decisions = Vec::new();
        let mut seen_sources: HashSet<&str> = HashSet::new();
        let mut seen_destinations: HashSet<&str> = HashSet::new();

        let mut seen_pairs: HashSet<(&str, &str)> = HashSet::new();
        for (source_id, destination_id) in links.iter().filter_map(LinkEntry::pair) {
            if !seen_pairs.insert((source_id, destination_id)) {
                continue;
            }
            if seen_destinations.contains(destination_id) {
                seen_sources.insert(source_id);
                decisions.push(Decision::skip(
                    Some(source_id),
                    Some(destination_id),
                    Error::link_conflict(
                        source_id,
                        format!("destination '{destination_id}' is linked to another source"),
                    ),
                ));
                continue;
            }
            if seen_sources.contains(source_id) {
                seen_destinations.insert(destination_id);
                decisions.push(Decision::skip(
                    Some(source_id),
                    Some(destination_id),
                    Error::link_conflict(
                        source_id,
                        format!("source is already linked, '{destination_id}' left untouched"),
                    ),
                ));
                continue;
            }
            seen_sources.insert(source_id);
            seen_destinations.insert(destination_id);
            decisions.push(self.classify_linked(
                source_id,
                sources.get(source_id),
                destination_id,
                destinations.get(destination_id),
            ));
        }

        for source_id in links.iter().filter_map(LinkEntry::pending_source) {
            if seen_sources.insert(source_id) {
                decisions.push(self.classify_unlinked(source_id, sources.get(source_id)));
            }
        }

        for destination_id in links.iter().filter_map(LinkEntry::orphan_destination) {
            if seen_destinations.insert(destination_id) {
                decisions.push(orphan_decision(
                    destination_id,
                    destinations.get(destination_id),
                    ArchiveReason::Unlinked,
                ));
            }
        }

        let unlisted: BTreeSet<&str> = destinations
            .keys()
            .map(String::as_str)
            .filter(|id| !seen_destinations.contains(id))
            .collect();
        for destination_id in unlisted {
            decisions.push(orphan_decision(
                destination_id,
                destinations.get(destination_id),
                ArchiveReason::NotListed,
            ));
        }

        decisions
    }

    fn classify_linked(
        &self,
        source_id: &str,
        source: Option<&SourceRecord>,
        destination_id: &str,
        destination: Option<&DestinationRecord>,
    ) -> Decision {
        let Some(destination) = destination else {
            return Decision::skip(
                Some(source_id),
                Some(destination_id),
                Error::missing_link("destination", source_id, destination_id),
            );
        };
        if destination.is_archived() {
            return Decision::no_op(
                Some(source_id),
                Some(destination_id),
                NoOpReason::AlreadyArchived,
            );
        }
        let Some(source) = source.filter(|source| source.is_active()) else {
            return Decision::Archive {
                source_id: Some(source_id.to_string()),
                destination_id: destination_id.to_string(),
                reason: ArchiveReason::SourceInactive,
            };
        };

        match self.compare(source, destination) {
            Ok((differences, _)) if differences.is_empty() => {
                Decision::no_op(Some(source_id), Some(destination_id), NoOpReason::InSync)
            }
            Ok((_, None)) => Decision::no_op(
                Some(source_id),
                Some(destination_id),
                NoOpReason::NothingToPatch,
            ),
            Ok((differences, Some(patch))) => Decision::Update {
                source_id: source_id.to_string(),
                destination_id: destination_id.to_string(),
                patch,
                differences,
            },
            Err(error) => Decision::skip(Some(source_id), Some(destination_id), error),
        }
    }

    fn classify_unlinked(&self, source_id: &str, source: Option<&SourceRecord>) -> Decision {
        let Some(source) = source else {
            return Decision::skip(
                Some(source_id),
                None,
                Error::missing_link("source", source_id, ""),
            );
        };
        if !source.is_active() {
            return Decision::no_op(Some(source_id), None, NoOpReason::InactiveSource);
        }
        match source
            .to_document()
            .and_then(|record| Ok(self.template.project(&record)?))
        {
            Ok(document) => Decision::Create {
                source_id: source_id.to_string(),
                document,
            },
            Err(error) => Decision::skip(Some(source_id), None, error),
        }
    }

    /// Project, filter, diff and synthesise one linked pair.
    fn compare(
        &self,
        source: &SourceRecord,
        destination: &DestinationRecord,
    ) -> Result<(Vec<Difference>, Option<Value>)> {
        let desired = self.template.project(&source.to_document()?)?;
        let current = self
            .template
            .filter(&destination.to_document()?, self.keep_missing);
        let differences = diff(&desired, &current);
        if differences.is_empty() {
            return Ok((differences, None));
        }
        debug!(
            source_id = %source.id,
            destination_id = %destination.id,
            differences = differences.len(),
            "Linked pair differs"
        );
        let patch = synthesize(&desired, &current, destination)?;
        Ok((differences, patch))
    }
}

fn orphan_decision(
    destination_id: &str,
    destination: Option<&DestinationRecord>,
    reason: ArchiveReason,
) -> Decision {
    match destination {
        None => Decision::no_op(None, Some(destination_id), NoOpReason::DestinationMissing),
        Some(record) if record.is_archived() => {
            Decision::no_op(None, Some(destination_id), NoOpReason::AlreadyArchived)
        }
        Some(_) => Decision::Archive {
            source_id: None,
            destination_id: destination_id.to_string(),
            reason,
        },
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::types::{DestinationVariant, SourceVariant};
    use rust_decimal::Decimal;
    use serde_json::json;

    const TEMPLATE: &str = r#"
status: '"active" if record.status == "active" else "draft"'
variants: [{ sku: 'record.sku', price: 'str(record.price)' }]
"#;

    fn template() -> Template {
        Template::compile("test", TEMPLATE).unwrap()
    }

    fn index_sources(records: Vec<SourceRecord>) -> HashMap<String, SourceRecord> {
        records.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    fn index_destinations(records: Vec<DestinationRecord>) -> HashMap<String, DestinationRecord> {
        records.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    fn z1() -> SourceRecord {
        SourceRecord::new("Z1").with_sku("A").with_price(Decimal::from(10))
    }

    #[test]
    fn test_scenario_create_then_update() {
        let template = template();
        let classifier = Classifier::new(&template, false);
        let sources = index_sources(vec![z1()]);

        // Unlinked: create with the projected document.
        let decisions = classifier.classify(&[LinkEntry::unlinked("Z1")], &sources, &HashMap::new());
        assert_eq!(decisions.len(), 1);
        match &decisions[0] {
            Decision::Create { source_id, document } => {
                assert_eq!(source_id, "Z1");
                assert_eq!(
                    document,
                    &json!({"status": "active", "variants": [{"sku": "A", "price": "10"}]})
                );
            }
            other => panic!("expected create, got {other:?}"),
        }

        // Linked to a draft destination: one difference at status.
        let destinations = index_destinations(vec![DestinationRecord::new("42", "draft")
            .with_variant(DestinationVariant {
                sku: Some("A".to_string()),
                price: Some(Decimal::from(10)),
                ..DestinationVariant::default()
            })]);
        let decisions =
            classifier.classify(&[LinkEntry::linked("Z1", "42")], &sources, &destinations);
        assert_eq!(decisions.len(), 1);
        match &decisions[0] {
            Decision::Update {
                patch, differences, ..
            } => {
                assert_eq!(differences.len(), 1);
                assert_eq!(differences[0].path, "status");
                assert_eq!(differences[0].desired, json!("active"));
                assert_eq!(differences[0].current, json!("draft"));
                assert_eq!(patch, &json!({"id": "42", "status": "active"}));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_in_sync_is_no_op() {
        let template = template();
        let classifier = Classifier::new(&template, false);
        let sources = index_sources(vec![z1()]);
        let destinations = index_destinations(vec![DestinationRecord::new("42", "active")
            .with_variant(DestinationVariant::new("1", "A").with_price(Decimal::new(1000, 2)))]);

        let decisions =
            classifier.classify(&[LinkEntry::linked("Z1", "42")], &sources, &destinations);
        assert!(matches!(
            decisions[0],
            Decision::NoOp {
                reason: NoOpReason::InSync,
                ..
            }
        ));
    }

    #[test]
    fn test_inactive_or_missing_source_archives() {
        let template = template();
        let classifier = Classifier::new(&template, false);
        let sources = index_sources(vec![z1().with_status("inactive")]);
        let destinations = index_destinations(vec![
            DestinationRecord::new("42", "active"),
            DestinationRecord::new("43", "active"),
        ]);
        let links = [LinkEntry::linked("Z1", "42"), LinkEntry::linked("GONE", "43")];

        let decisions = classifier.classify(&links, &sources, &destinations);
        assert_eq!(decisions.len(), 2);
        assert!(decisions.iter().all(|d| matches!(
            d,
            Decision::Archive {
                reason: ArchiveReason::SourceInactive,
                ..
            }
        )));
    }

    #[test]
    fn test_archived_is_terminal() {
        let template = template();
        let classifier = Classifier::new(&template, false);
        let sources = index_sources(vec![z1()]);
        let destinations = index_destinations(vec![
            DestinationRecord::new("42", "archived"),
            DestinationRecord::new("77", "archived"),
        ]);

        let decisions =
            classifier.classify(&[LinkEntry::linked("Z1", "42")], &sources, &destinations);
        assert_eq!(decisions.len(), 2);
        assert!(decisions.iter().all(|d| matches!(
            d,
            Decision::NoOp {
                reason: NoOpReason::AlreadyArchived,
                ..
            }
        )));
    }

    #[test]
    fn test_orphans_and_unlisted_share_one_rule() {
        let template = template();
        let classifier = Classifier::new(&template, false);
        let destinations = index_destinations(vec![
            DestinationRecord::new("50", "active"),
            DestinationRecord::new("51", "draft"),
        ]);

        let decisions = classifier.classify(
            &[LinkEntry::orphaned("50"), LinkEntry::orphaned("99")],
            &HashMap::new(),
            &destinations,
        );
        let summary: Vec<(&str, Option<&str>)> =
            decisions.iter().map(|d| (d.kind(), d.destination_id())).collect();
        assert_eq!(
            summary,
            vec![("archive", Some("50")), ("no-op", Some("99")), ("archive", Some("51"))]
        );
        assert!(matches!(
            decisions[2],
            Decision::Archive {
                reason: ArchiveReason::NotListed,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_destination_record_is_skipped() {
        let template = template();
        let classifier = Classifier::new(&template, false);
        let sources = index_sources(vec![z1()]);

        let decisions =
            classifier.classify(&[LinkEntry::linked("Z1", "42")], &sources, &HashMap::new());
        assert!(matches!(
            &decisions[0],
            Decision::Skip {
                error: Error::MissingLink { side: "destination", .. },
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_destination_claim_is_skipped() {
        let template = template();
        let classifier = Classifier::new(&template, false);
        let sources = index_sources(vec![z1(), SourceRecord::new("Z2").with_sku("B")]);
        let destinations = index_destinations(vec![DestinationRecord::new("42", "active")]);
        let links = [LinkEntry::linked("Z1", "42"), LinkEntry::linked("Z2", "42")];

        let decisions = classifier.classify(&links, &sources, &destinations);
        assert_eq!(decisions.len(), 2);
        assert!(matches!(
            &decisions[1],
            Decision::Skip {
                error: Error::LinkConflict { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_second_destination_for_one_source_is_skipped_not_archived() {
        let template = template();
        let classifier = Classifier::new(&template, false);
        let sources = index_sources(vec![z1()]);
        let destinations = index_destinations(vec![
            DestinationRecord::new("42", "active"),
            DestinationRecord::new("43", "active"),
        ]);
        let links = [LinkEntry::linked("Z1", "42"), LinkEntry::linked("Z1", "43")];

        let decisions = classifier.classify(&links, &sources, &destinations);
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[1].destination_id(), Some("43"));
        assert!(matches!(
            &decisions[1],
            Decision::Skip {
                error: Error::LinkConflict { .. },
                ..
            }
        ));
        assert!(!decisions.iter().any(|d| matches!(d, Decision::Archive { .. })));
    }

    #[test]
    fn test_blank_source_id_is_treated_as_orphan() {
        let template = template();
        let classifier = Classifier::new(&template, false);
        let sources = index_sources(vec![z1()]);
        let destinations = index_destinations(vec![DestinationRecord::new("42", "active")]);

        let decisions = classifier.classify(&[LinkEntry::linked("", "42")], &sources, &destinations);
        assert_eq!(decisions.len(), 1);
        assert!(matches!(
            &decisions[0],
            Decision::Archive {
                reason: ArchiveReason::Unlinked,
                ..
            }
        ));
        assert_eq!(decisions[0].source_id(), None);
    }

    #[test]
    fn test_repeated_link_entry_is_decided_once() {
        let template = template();
        let classifier = Classifier::new(&template, false);
        let sources = index_sources(vec![z1()]);
        let destinations = index_destinations(vec![DestinationRecord::new("42", "archived")]);
        let links = [LinkEntry::linked("Z1", "42"), LinkEntry::linked("Z1", "42")];

        let decisions = classifier.classify(&links, &sources, &destinations);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].kind(), "no-op");
    }

    #[test]
    fn test_linked_source_is_not_created_again() {
        let template = template();
        let classifier = Classifier::new(&template, false);
        let sources = index_sources(vec![z1()]);
        let destinations = index_destinations(vec![DestinationRecord::new("42", "archived")]);
        let links = [LinkEntry::linked("Z1", "42"), LinkEntry::unlinked("Z1")];

        let decisions = classifier.classify(&links, &sources, &destinations);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].kind(), "no-op");
    }

    #[test]
    fn test_inactive_unlinked_source_is_not_created() {
        let template = template();
        let classifier = Classifier::new(&template, false);
        let sources = index_sources(vec![z1().with_status("inactive")]);

        let decisions = classifier.classify(&[LinkEntry::unlinked("Z1")], &sources, &HashMap::new());
        assert!(matches!(
            decisions[0],
            Decision::NoOp {
                reason: NoOpReason::InactiveSource,
                ..
            }
        ));
    }

    #[test]
    fn test_variant_match_failure_is_skipped() {
        let template = template();
        let classifier = Classifier::new(&template, false);
        let sources = index_sources(vec![z1()
            .with_variant(SourceVariant::new("A").with_price(Decimal::from(5)))
            .with_variant(SourceVariant::new("B").with_price(Decimal::from(6)))]);
        let destinations = index_destinations(vec![DestinationRecord::new("42", "active")
            .with_variant(DestinationVariant::new("1", "A").with_price(Decimal::from(5)))]);

        let decisions =
            classifier.classify(&[LinkEntry::linked("Z1", "42")], &sources, &destinations);
        assert!(matches!(
            &decisions[0],
            Decision::Skip {
                error: Error::VariantMatch { .. },
                ..
            }
        ));
    }
}
