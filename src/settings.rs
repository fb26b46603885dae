//! Settings file for the shelfsync binary.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shelfsync_core::{Error, Result};
use shelfsync_reconciler::{Channel, EngineConfig};

/// Settings for a shelfsync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Product template path.
    #[serde(default = "default_template")]
    pub template: PathBuf,

    /// Fixture snapshot backing the stores.
    #[serde(default = "default_fixture")]
    pub fixture: PathBuf,

    /// Destination channels.
    #[serde(default)]
    pub channels: Vec<Channel>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            template: default_template(),
            fixture: default_fixture(),
            channels: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file. Relative paths inside the file are
    /// resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// settings do not validate.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        let mut settings: Self = serde_yaml::from_str(&text)
            .map_err(|e| Error::yaml_parse_failed(path, e.to_string()))?;

        if let Some(base) = path.parent() {
            settings.template = base.join(&settings.template);
            settings.fixture = base.join(&settings.fixture);
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.engine
            .validate()
            .map_err(|e| Error::invalid_config(e.to_string()))?;

        if self.channels.is_empty() {
            return Err(Error::invalid_config("at least one channel is required"));
        }

        let mut names = HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() {
                return Err(Error::invalid_config("channel name cannot be empty"));
            }
            if !names.insert(channel.name.as_str()) {
                return Err(Error::invalid_config(format!(
                    "duplicate channel '{}'",
                    channel.name
                )));
            }
        }

        Ok(())
    }

    /// Channels to run: the named one, or all of them.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the named channel is not configured.
    pub fn channels(&self, name: Option<&str>) -> Result<Vec<&Channel>> {
        match name {
            None => Ok(self.channels.iter().collect()),
            Some(name) => self
                .channels
                .iter()
                .find(|channel| channel.name == name)
                .map(|channel| vec![channel])
                .ok_or_else(|| Error::invalid_config(format!("unknown channel '{name}'"))),
        }
    }
}

fn default_template() -> PathBuf {
    PathBuf::from("product.tmpl")
}

fn default_fixture() -> PathBuf {
    PathBuf::from("fixture.json")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::io::Write;

    const SETTINGS: &str = r#"
engine:
  batch_size: 20
  dry_run: true
channels:
  - name: web
    location_id: "655441491"
  - name: wholesale
    select:
      category: ["Lighting", "Shades"]
"#;

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelfsync.yml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(SETTINGS.as_bytes())
            .unwrap();

        let settings = Settings::load(&path).unwrap();

        assert_eq!(settings.engine.batch_size, 20);
        assert_eq!(settings.engine.verify_attempts, 3);
        assert!(settings.engine.dry_run);
        assert_eq!(settings.template, dir.path().join("product.tmpl"));
        assert_eq!(settings.fixture, dir.path().join("fixture.json"));
        assert_eq!(settings.channels[0].location_id.as_deref(), Some("655441491"));
        assert!(settings.channels[1].select.is_some());
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let err = Settings::load(Path::new("/nonexistent/shelfsync.yml")).unwrap_err();
        assert!(matches!(err, Error::FileReadFailed { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_channels() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_err());

        settings.channels = vec![Channel::new("web"), Channel::new("web")];
        assert!(settings.validate().is_err());

        settings.channels = vec![Channel::new("web")];
        settings.engine.batch_size = 0;
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_channel_lookup() {
        let settings = Settings {
            channels: vec![Channel::new("web"), Channel::new("wholesale")],
            ..Settings::default()
        };
        assert_eq!(settings.channels(None).unwrap().len(), 2);
        assert_eq!(settings.channels(Some("web")).unwrap()[0].name, "web");
        assert!(settings.channels(Some("pos")).is_err());
    }
}
