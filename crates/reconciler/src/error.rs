//! Error types for the reconciler crate.

use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
///
/// Only configuration problems are fatal to a pass (see [`Error::is_fatal`]);
/// everything else is caught per item, logged, recorded in the run report
/// and skipped.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Template compilation or projection failed.
    #[error(transparent)]
    Template(#[from] shelfsync_template::Error),

    /// A mapped id has no record on one side.
    #[error("missing {side} record (source '{source_id}', destination '{destination_id}')")]
    MissingLink {
        side: &'static str,
        source_id: String,
        destination_id: String,
    },

    /// A desired variant has no locatable destination counterpart.
    #[error("cannot match variant for destination '{destination_id}': {reason}")]
    VariantMatch {
        destination_id: String,
        reason: String,
    },

    /// Two links claim the same destination, or a link would be overwritten.
    #[error("link conflict for source '{source_id}': {reason}")]
    LinkConflict { source_id: String, reason: String },

    /// An external call failed or timed out.
    #[error("{operation} failed: {reason}")]
    Transport { operation: String, reason: String },

    /// Read-back disagrees with the intended quantity after all retries.
    #[error(
        "inventory item '{inventory_item_id}' reports {reported:?} at location '{location_id}', expected {desired}"
    )]
    VerificationMismatch {
        inventory_item_id: String,
        location_id: String,
        desired: i64,
        reported: Option<i64>,
    },

    /// The pass was cancelled while waiting on an external call.
    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    /// A record could not be read into the engine's data model.
    #[error("invalid record: {reason}")]
    InvalidRecord { reason: String },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a missing link error.
    pub fn missing_link(
        side: &'static str,
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
    ) -> Self {
        Self::MissingLink {
            side,
            source_id: source_id.into(),
            destination_id: destination_id.into(),
        }
    }

    /// Create a variant match error.
    pub fn variant_match(destination_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::VariantMatch {
            destination_id: destination_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a link conflict error.
    pub fn link_conflict(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LinkConflict {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a verification mismatch.
    pub fn verification_mismatch(
        inventory_item_id: impl Into<String>,
        location_id: impl Into<String>,
        desired: i64,
        reported: Option<i64>,
    ) -> Self {
        Self::VerificationMismatch {
            inventory_item_id: inventory_item_id.into(),
            location_id: location_id.into(),
            desired,
            reported,
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an invalid record error.
    pub fn invalid_record(reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether the error aborts the whole pass rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::Template(shelfsync_template::Error::TemplateSyntax { .. })
        )
    }

    /// Whether the caller may retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Whether the error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
