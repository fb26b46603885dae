//! Core types shared by the shelfsync crates.
//!
//! - [`error`]: configuration-level errors (settings, fixtures). These are
//!   fatal to a run, unlike the per-item errors of the reconciler.
//! - [`value`]: rules over the shared document type that the template and
//!   reconciler crates must agree on.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod value;

pub use error::{Error, Result};
