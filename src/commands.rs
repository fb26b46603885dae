//! Command implementations.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use shelfsync_reconciler::{Channel, ReconcilerBuilder, RunReport};
use shelfsync_template::Template;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::fixture::Fixture;
use crate::settings::Settings;

/// Summary of a compiled template.
#[derive(Debug, Serialize)]
pub struct TemplateSummary {
    pub name: String,
    pub expressions: usize,
    pub fields: Vec<String>,
}

/// Compile a template file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not compile.
pub fn compile_template(path: &Path) -> Result<Template> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template {}", path.display()))?;
    let name = path
        .file_stem()
        .map_or_else(|| "template".to_string(), |stem| stem.to_string_lossy().to_string());
    Template::compile(&name, &text)
        .with_context(|| format!("Template {} does not compile", path.display()))
}

/// `check`: compile a template and describe it.
///
/// # Errors
///
/// Returns an error if the template does not compile.
pub fn check(path: &Path) -> Result<TemplateSummary> {
    let template = compile_template(path)?;
    let summary = TemplateSummary {
        name: template.name().to_string(),
        expressions: template.root().expression_count(),
        fields: template
            .schema()
            .keys()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };
    info!(template = %summary.name, expressions = summary.expressions, "Template compiled");
    Ok(summary)
}

/// `plan` and `sync`: reconcile the selected channels against the fixture.
///
/// With `dry_run` nothing is written. With `save` the fixture is rewritten
/// with the stores' final state.
///
/// # Errors
///
/// Returns an error for configuration problems. Per-item problems are in
/// the reports.
pub async fn reconcile(
    settings: &Settings,
    channel: Option<&str>,
    dry_run: bool,
    save: bool,
    cancel: CancellationToken,
) -> Result<Vec<RunReport>> {
    let template = compile_template(&settings.template)?;
    let mut fixture = Fixture::load(&settings.fixture).context("Failed to load fixture")?;
    let channels: Vec<Channel> = settings
        .channels(channel)
        .context("Failed to select channels")?
        .into_iter()
        .cloned()
        .collect();

    let mut reports = Vec::new();
    for channel in &channels {
        let stores = fixture.stores(&channel.name);
        let reconciler = ReconcilerBuilder::new()
            .with_sources(stores.catalog.clone())
            .with_destination(stores.destination.clone())
            .with_links(stores.links.clone())
            .with_snapshot(stores.destination.clone())
            .with_config(settings.engine.clone())
            .dry_run(dry_run || settings.engine.dry_run)
            .build()
            .context("Invalid engine configuration")?;

        let report = reconciler
            .run(channel, &template, cancel.clone())
            .await
            .with_context(|| format!("Reconciliation of channel '{}' failed", channel.name))?;
        info!("{}", report.summary());

        if save && !report.dry_run {
            fixture.capture(&channel.name, &stores).await;
        }
        let cancelled = report.cancelled;
        reports.push(report);
        if cancelled {
            warn!(channel = %channel.name, "Stopping after cancellation");
            break;
        }
    }

    if save {
        fixture
            .save(&settings.fixture)
            .context("Failed to write fixture")?;
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_check_describes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("product.tmpl");
        std::fs::write(
            &path,
            "title: 'record.name'  # header\nvariants: [{ sku: 'record.sku', taxable: true }]\n",
        )
        .unwrap();

        let summary = check(&path).unwrap();
        assert_eq!(summary.name, "product");
        assert_eq!(summary.expressions, 2);
        assert_eq!(summary.fields, vec!["title", "variants"]);
    }

    #[test]
    fn test_check_reports_syntax_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.tmpl");
        std::fs::write(&path, "title: 'record.'\n").unwrap();

        let err = check(&path).unwrap_err();
        assert!(format!("{err:#}").contains("does not compile"));
    }
}
