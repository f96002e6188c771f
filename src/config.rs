//! Configuration types for thumbwatch.
//!
//! Every section carries `#[serde(default)]`, so a partial TOML file only
//! needs the keys it changes.

use crate::decorator::DecoratorConfig;
use crate::error::{MonitorError, Result};
use crate::paths;
use crate::policy::{IntervalPolicy, MAX_CONFIGURED_DAYS};
use crate::registration::DEFAULT_INITIAL_DELAY_DAYS;
use crate::scheduler::runner::DEFAULT_TICK_SECS;
use crate::source::SourceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thumbwatch_fetch::FetchConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Backoff interval policy.
    pub policy: IntervalPolicy,
    /// Overlay rendering.
    pub decorator: DecoratorConfig,
    /// Outbound HTTP.
    pub fetch: FetchConfig,
    /// Page and thumbnail URL bases.
    pub source: SourceConfig,
    /// Entity and artifact storage.
    pub storage: StorageConfig,
    /// Task scheduler.
    pub scheduler: SchedulerConfig,
}

/// Where entities and artifacts live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding all monitored entities.
    pub entity_file: PathBuf,
    /// Directory decorated thumbnails are written to.
    pub object_dir: PathBuf,
    /// Base URL the object directory is served under.
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            entity_file: paths::entity_file(),
            object_dir: paths::objects_dir(),
            public_base_url: "http://localhost:8080/thumbnails".to_owned(),
        }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// JSON file holding pending tasks.
    pub state_file: PathBuf,
    /// Seconds between scheduler ticks.
    pub tick_secs: u64,
    /// Days between registration and the first cycle.
    pub initial_delay_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            state_file: paths::scheduler_file(),
            tick_secs: DEFAULT_TICK_SECS,
            initial_delay_days: DEFAULT_INITIAL_DELAY_DAYS,
        }
    }
}

impl MonitorConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.policy.ceiling_days == 0 || self.policy.ceiling_days > MAX_CONFIGURED_DAYS {
            return Err(MonitorError::Config(format!(
                "policy.ceiling_days must be between 1 and {MAX_CONFIGURED_DAYS}"
            )));
        }
        if self.scheduler.initial_delay_days > MAX_CONFIGURED_DAYS {
            return Err(MonitorError::Config(format!(
                "scheduler.initial_delay_days must be at most {MAX_CONFIGURED_DAYS}"
            )));
        }
        self.decorator.validate()?;
        self.fetch
            .validate()
            .map_err(|e| MonitorError::Config(e.to_string()))?;
        self.source.validate()?;
        if self.scheduler.tick_secs == 0 {
            return Err(MonitorError::Config(
                "scheduler.tick_secs must be greater than 0".to_owned(),
            ));
        }
        url::Url::parse(&self.storage.public_base_url).map_err(|e| {
            MonitorError::Config(format!(
                "storage.public_base_url is not a URL ({}): {e}",
                self.storage.public_base_url
            ))
        })?;
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| MonitorError::Config(e.to_string()))
    }

    /// Load `path` if it exists, otherwise the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MonitorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        paths::config_file()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MonitorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.policy.ceiling_days, 16);
        assert!((config.decorator.size_fraction - 0.30).abs() < f64::EPSILON);
        assert_eq!(config.decorator.jpeg_quality, 90);
        assert_eq!(config.scheduler.initial_delay_days, 1);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: MonitorConfig = toml::from_str(
            r#"
            [policy]
            ceiling_days = 32

            [storage]
            public_base_url = "https://thumbs.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.policy.ceiling_days, 32);
        assert_eq!(config.storage.public_base_url, "https://thumbs.example.com");
        assert_eq!(config.decorator, DecoratorConfig::default());
        assert_eq!(config.fetch, FetchConfig::default());
    }

    #[test]
    fn rejects_zero_ceiling() {
        let mut config = MonitorConfig::default();
        config.policy.ceiling_days = 0;
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));
    }

    #[test]
    fn rejects_unbounded_day_counts() {
        let mut config = MonitorConfig::default();
        config.policy.ceiling_days = 200_000_000;
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));

        let mut config = MonitorConfig::default();
        config.scheduler.initial_delay_days = u32::MAX;
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));

        let mut config = MonitorConfig::default();
        config.policy.ceiling_days = MAX_CONFIGURED_DAYS;
        config.scheduler.initial_delay_days = MAX_CONFIGURED_DAYS;
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_overlay_fraction() {
        let mut config = MonitorConfig::default();
        config.decorator.size_fraction = 1.5;
        assert!(config.validate().is_err());
        config.decorator.size_fraction = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_tick() {
        let mut config = MonitorConfig::default();
        config.scheduler.tick_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_fetch_timeout() {
        let mut config = MonitorConfig::default();
        config.fetch.timeout_seconds = 0;
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));
    }

    #[test]
    fn save_and_load_preserves_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");

        let mut config = MonitorConfig::default();
        config.policy.ceiling_days = 8;
        config.decorator.jpeg_quality = 75;
        config.scheduler.tick_secs = 5;
        config.save_to_file(&path).unwrap();

        let loaded = MonitorConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = MonitorConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, MonitorConfig::default());
    }

    #[test]
    fn unknown_syntax_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "policy = [[[").unwrap();
        assert!(matches!(
            MonitorConfig::from_file(&path),
            Err(MonitorError::Config(_))
        ));
    }
}
