//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | Linux | macOS |
//! |---------|-------|-------|
//! | Data | `~/.local/share/thumbwatch/` | `~/Library/Application Support/thumbwatch/` |
//! | Config | `~/.config/thumbwatch/` | `~/Library/Application Support/thumbwatch/` |
//!
//! # Environment Overrides
//!
//! - `THUMBWATCH_DATA_DIR` overrides [`data_dir`]
//! - `THUMBWATCH_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root: entity store, scheduler state, artifacts.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("THUMBWATCH_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("thumbwatch"))
        .unwrap_or_else(|| PathBuf::from("/tmp/thumbwatch-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("THUMBWATCH_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("thumbwatch"))
        .unwrap_or_else(|| PathBuf::from("/tmp/thumbwatch-config"))
}

/// `config_dir()/config.toml`.
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// `data_dir()/entities.json`.
#[must_use]
pub fn entity_file() -> PathBuf {
    data_dir().join("entities.json")
}

/// `data_dir()/scheduler.json`.
#[must_use]
pub fn scheduler_file() -> PathBuf {
    data_dir().join("scheduler.json")
}

/// `data_dir()/thumbnails/`.
#[must_use]
pub fn objects_dir() -> PathBuf {
    data_dir().join("thumbnails")
}
