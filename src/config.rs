//! Bridge configuration persistence.
//!
//! A small JSON file under the user config directory holds the settings
//! that survive restarts, currently just the adb binary path. Missing or
//! unreadable files fall back to defaults so a fresh install works with
//! no setup.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

pub const DEFAULT_ADB_PATH: &str = "/usr/bin/adb";

const CONFIG_DIR_NAME: &str = "gpx-sim";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    pub adb_path: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            adb_path: DEFAULT_ADB_PATH.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load from the default config path. Any failure (missing file,
    /// unreadable, malformed JSON) yields the defaults.
    pub fn load() -> Self {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => BridgeConfig::default(),
        }
    }

    /// Load from an explicit path, defaulting on any failure.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring malformed config {}: {}", path.display(), e);
                    BridgeConfig::default()
                }
            },
            Err(_) => BridgeConfig::default(),
        }
    }

    /// Persist to the default config path, creating the directory chain
    /// as needed.
    pub fn save(&self) -> Result<()> {
        let path = config_path().ok_or_else(|| SimError::Config {
            message: "Could not determine config directory".to_string(),
        })?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SimError::Config {
                message: format!("Failed to create {}: {}", parent.display(), e),
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| SimError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;
        fs::write(path, json).map_err(|e| SimError::Config {
            message: format!("Failed to write {}: {}", path.display(), e),
        })
    }
}

/// `$XDG_CONFIG_HOME/gpx-sim/config.json`, falling back to
/// `~/.config/gpx-sim/config.json`.
fn config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_adb_path() {
        let config = BridgeConfig::default();
        assert_eq!(config.adb_path, "/usr/bin/adb");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = BridgeConfig {
            adb_path: "/opt/android/adb".to_string(),
        };
        config.save_to(&path).unwrap();

        let loaded = BridgeConfig::load_from(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = BridgeConfig::load_from(&dir.path().join("absent.json"));
        assert_eq!(loaded, BridgeConfig::default());
    }

    #[test]
    fn test_load_malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let loaded = BridgeConfig::load_from(&path);
        assert_eq!(loaded, BridgeConfig::default());
    }
}
