//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// shelfsync - catalog and inventory reconciliation
#[derive(Parser, Debug)]
#[command(name = "shelfsync")]
#[command(version)]
#[command(about = "Reconcile storefront catalogs and stock levels with the source catalog")]
#[command(
    long_about = "shelfsync projects source catalog items through a field-mapping template, diffs them with the storefront, and sends only the minimal creates, patches, archives and stock updates needed to converge."
)]
pub struct Cli {
    /// Settings file
    #[arg(short, long, default_value = "config/shelfsync.yml")]
    pub settings: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a template and list the fields it maps
    Check {
        /// Template file (defaults to the one in the settings)
        #[arg(short, long)]
        template: Option<PathBuf>,
    },

    /// Show what a sync would do without writing anything
    Plan {
        /// Channel name (defaults to every channel)
        #[arg(short, long)]
        channel: Option<String>,
    },

    /// Reconcile channels
    Sync {
        /// Channel name (defaults to every channel)
        #[arg(short, long)]
        channel: Option<String>,

        /// Write the final store state back to the fixture
        #[arg(long, default_value_t = false)]
        save: bool,
    },
}
