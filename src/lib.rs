#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # shelfsync
//!
//! Catalog and inventory reconciliation between a source catalog and
//! destination storefronts.
//!
//! This library backs the `shelfsync` binary and re-exports the workspace
//! crates for convenience.

pub use shelfsync_core;
pub use shelfsync_reconciler;
pub use shelfsync_template;

pub mod cli;
pub mod commands;
pub mod fixture;
pub mod settings;
