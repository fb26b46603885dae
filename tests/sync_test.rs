//! End-to-end sync against the sample fixture.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::Path;

use shelfsync::commands;
use shelfsync::fixture::Fixture;
use shelfsync::settings::Settings;
use shelfsync_reconciler::{ItemAction, LinkEntry};
use tokio_util::sync::CancellationToken;

const SETTINGS: &str = r#"
template: product.tmpl
fixture: fixture.json
engine:
  requests_per_second: 0
  verify_backoff_ms: 1
channels:
  - name: web
    location_id: "main"
  - name: wholesale
    select:
      category: ["Lighting"]
"#;

fn workspace(dir: &Path) -> Result<Settings, String> {
    std::fs::write(dir.join("shelfsync.yml"), SETTINGS).map_err(|e| e.to_string())?;
    std::fs::write(dir.join("product.tmpl"), include_str!("../config/product.tmpl"))
        .map_err(|e| e.to_string())?;
    std::fs::write(dir.join("fixture.json"), include_str!("../config/fixture.json"))
        .map_err(|e| e.to_string())?;
    Settings::load(&dir.join("shelfsync.yml")).map_err(|e| e.to_string())
}

#[tokio::test]
async fn test_sample_fixture_converges_after_one_sync() -> Result<(), String> {
    // Given: the sample settings, template and fixture
    let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
    let settings = workspace(dir.path())?;

    // When: every channel is synced and saved
    let first = commands::reconcile(&settings, None, false, true, CancellationToken::new())
        .await
        .map_err(|e| format!("{e:#}"))?;

    // Then: the web channel creates the shade, patches the lamp and archives
    // the inactive and unlisted products
    let web = first.first().ok_or("no web report")?;
    assert_eq!(web.channel, "web");
    assert_eq!((web.created, web.updated, web.archived), (1, 1, 2), "{}", web.summary());
    assert!(web.skipped.is_empty());
    let lamp = web
        .items
        .iter()
        .find(|item| item.action == ItemAction::Update)
        .ok_or("no update")?;
    assert_eq!(lamp.destination_id.as_deref(), Some("42"));
    let patch = lamp.payload.clone().ok_or("no patch")?;
    assert_eq!(patch["status"], "active");
    assert_eq!(patch["variants"][0]["id"], "2");

    let quantities = web.quantities.clone().ok_or("no quantity report")?;
    assert_eq!((quantities.created, quantities.updated, quantities.unchanged), (1, 1, 1));
    assert_eq!(quantities.verified_ok, 1);

    // And: the wholesale channel resolves its location and creates the lamp
    let wholesale = first.get(1).ok_or("no wholesale report")?;
    assert_eq!(wholesale.created, 1);
    assert_eq!(
        wholesale.quantities.as_ref().map(|q| q.location_id.as_str()),
        Some("dock")
    );

    // And: the saved fixture links the new products
    let saved = Fixture::load(&settings.fixture).map_err(|e| e.to_string())?;
    let web_links = &saved.channels.get("web").ok_or("web missing")?.links;
    assert!(web_links
        .iter()
        .any(|link| link.source_id.as_deref() == Some("1623") && link.destination_id.is_some()));
    assert!(web_links.contains(&LinkEntry::linked("4208", "43")));

    // When: the channels are synced again
    let second = commands::reconcile(&settings, None, false, false, CancellationToken::new())
        .await
        .map_err(|e| format!("{e:#}"))?;

    // Then: nothing changes
    for report in &second {
        assert!(report.converged(), "{}", report.summary());
    }
    Ok(())
}

#[tokio::test]
async fn test_plan_leaves_the_fixture_untouched() -> Result<(), String> {
    // Given: the sample workspace
    let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
    let settings = workspace(dir.path())?;
    let before = std::fs::read_to_string(&settings.fixture).map_err(|e| e.to_string())?;

    // When: the web channel is planned
    let reports = commands::reconcile(&settings, Some("web"), true, true, CancellationToken::new())
        .await
        .map_err(|e| format!("{e:#}"))?;

    // Then: the plan is reported but nothing is captured
    assert_eq!(reports.len(), 1);
    assert!(reports[0].dry_run);
    assert_eq!(reports[0].created, 1);
    let saved = Fixture::load(&settings.fixture).map_err(|e| e.to_string())?;
    let original: Fixture = serde_json::from_str(&before).map_err(|e| e.to_string())?;
    assert_eq!(
        saved.channels.get("web").map(|c| c.links.clone()),
        original.channels.get("web").map(|c| c.links.clone())
    );
    Ok(())
}

#[tokio::test]
async fn test_unknown_channel_is_a_configuration_error() -> Result<(), String> {
    let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
    let settings = workspace(dir.path())?;

    let result =
        commands::reconcile(&settings, Some("pos"), false, false, CancellationToken::new()).await;

    assert!(result.is_err());
    Ok(())
}
