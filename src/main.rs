//! # shelfsync
//!
//! Reconciles destination storefront channels with the source catalog.
//!
//! ## Commands
//!
//! - `check` compiles a template and lists the fields it maps
//! - `plan` runs a dry pass and prints the run reports
//! - `sync` runs a pass and prints the run reports; `--save` writes the
//!   resulting store state back to the fixture
//!
//! Ctrl+C cancels a running pass; the report of what was already done is
//! still printed.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use shelfsync::cli::{Cli, Commands};
use shelfsync::commands;
use shelfsync::settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { template } => {
            let path = match template {
                Some(path) => path,
                None => load_settings(&cli.settings)?.template,
            };
            let summary = commands::check(&path)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Plan { channel } => {
            let settings = load_settings(&cli.settings)?;
            let reports =
                commands::reconcile(&settings, channel.as_deref(), true, false, shutdown_token())
                    .await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Commands::Sync { channel, save } => {
            let settings = load_settings(&cli.settings)?;
            let reports =
                commands::reconcile(&settings, channel.as_deref(), false, save, shutdown_token())
                    .await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
    }
    Ok(())
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_settings(path: &std::path::Path) -> Result<Settings> {
    Settings::load(path).with_context(|| format!("Failed to load settings {}", path.display()))
}

/// Token cancelled on Ctrl+C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, cancelling pass");
                cancel.cancel();
            }
            Err(err) => error!("Failed to listen for shutdown signal: {}", err),
        }
    });
    token
}
