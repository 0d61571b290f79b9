//! Runtime configuration.
//!
//! Everything the core consumes (unit table, backoff schedule, subject
//! prefixes) is read once into a [`Config`] and handed to each component at
//! construction. Nothing is looked up from global state afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::DelayUnitTable;
use crate::guard::BlockSchedule;
use crate::subject::SubjectNormalizer;
use crate::{Error, Result};

/// Directory name used below the platform config directory.
const CONFIG_DIR_NAME: &str = "maildelay";

/// File name of the JSON configuration.
const CONFIG_FILE_NAME: &str = "config.json";

/// Configuration for the delay codec, the abuse guard and the notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Public URL of the site, used in notification subjects and bodies.
    pub site_url: String,
    /// Sender address of transactional notifications.
    pub sender: String,
    /// Unit letter to day multiplier.
    pub delay_units: BTreeMap<char, u32>,
    /// Backoff per attempt number, in seconds.
    pub block_delays: BTreeMap<u32, u64>,
    /// Patterns stripped from subjects, combined case-insensitively.
    pub subject_strip_prefixes: Vec<String>,
    /// Upper bound for a single transport call, in seconds.
    pub transport_timeout_secs: u64,
    /// `SQLite` database holding the address log and identities.
    pub database_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_url: "https://maildelay.example".to_string(),
            sender: "noreply@maildelay.example".to_string(),
            delay_units: DelayUnitTable::default().into_map(),
            block_delays: BTreeMap::new(),
            subject_strip_prefixes: SubjectNormalizer::DEFAULT_PREFIXES
                .iter()
                .map(ToString::to_string)
                .collect(),
            transport_timeout_secs: 30,
            database_path: "maildelay.db".to_string(),
        }
    }
}

impl Config {
    /// Parse a configuration from JSON and validate it.
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a section is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading configuration");
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load `path` if given, else the default location if it exists, else
    /// the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file exists but cannot be loaded.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Default configuration file location (`<config dir>/maildelay/config.json`).
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Check that every section can be turned into its component.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid section.
    pub fn validate(&self) -> Result<()> {
        self.unit_table()?;
        self.subject_normalizer()?;
        if self.transport_timeout_secs == 0 {
            return Err(Error::Config(
                "transport_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Site host without the URL scheme.
    #[must_use]
    pub fn host(&self) -> &str {
        self.site_url
            .strip_prefix("https://")
            .or_else(|| self.site_url.strip_prefix("http://"))
            .unwrap_or(&self.site_url)
    }

    /// Build the delay unit table.
    ///
    /// # Errors
    ///
    /// Returns an error if a unit code or multiplier is invalid.
    pub fn unit_table(&self) -> Result<DelayUnitTable> {
        DelayUnitTable::new(self.delay_units.clone())
    }

    /// Build the backoff schedule.
    #[must_use]
    pub fn block_schedule(&self) -> BlockSchedule {
        BlockSchedule::from_seconds(&self.block_delays)
    }

    /// Build the subject normalizer.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern does not compile or matches nothing.
    pub fn subject_normalizer(&self) -> Result<SubjectNormalizer> {
        SubjectNormalizer::new(&self.subject_strip_prefixes)
    }

    /// Upper bound for a single transport call.
    #[must_use]
    pub const fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.transport_timeout_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json(
            r#"{
                "site_url": "http://rmd.io",
                "delay_units": {"d": 1, "w": 7, "m": 30, "y": 365},
                "block_delays": {"1": 3600, "2": 86400}
            }"#,
        )
        .unwrap();

        assert_eq!(config.host(), "rmd.io");
        assert_eq!(config.delay_units.get(&'y'), Some(&365));
        assert_eq!(config.transport_timeout_secs, 30);
        assert_eq!(
            config.block_schedule().delay_for(2),
            chrono::Duration::days(1)
        );
        assert_eq!(
            config.block_schedule().delay_for(3),
            chrono::Duration::days(7)
        );
    }

    #[test]
    fn test_invalid_unit_rejected() {
        let err = Config::from_json(r#"{"delay_units": {"D": 1}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_empty_matching_prefix_rejected() {
        let err = Config::from_json(r#"{"subject_strip_prefixes": ["(re:)?"]}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = Config::from_json(r#"{"transport_timeout_secs": 0}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_host_without_scheme() {
        let config = Config {
            site_url: "https://example.org".into(),
            ..Config::default()
        };
        assert_eq!(config.host(), "example.org");

        let config = Config {
            site_url: "example.org".into(),
            ..Config::default()
        };
        assert_eq!(config.host(), "example.org");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "maildelay-config-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{"sender": "robot@rmd.io"}"#).unwrap();

        let config = Config::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.sender, "robot@rmd.io");
    }
}
