//! Configuration management

use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::layout::{clamp_scale, DEFAULT_PIXELS_PER_MINUTE};

/// Where the client looks for converter output when nothing else is configured
pub const DEFAULT_DATA_SOURCE: &str = "public/data";

const APP_DIR: &str = "tvguide";

/// `<config_dir>/tvguide`, created on demand
pub fn app_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    fs::create_dir_all(&path).ok();
    path
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL or directory holding channels.json
    #[serde(default = "default_data_source")]
    pub data_source: String,
    #[serde(default = "default_pixels_per_minute")]
    pub pixels_per_minute: u32,
    #[serde(default = "default_true")]
    pub dark_mode: bool,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    /// Scroll the timeline to "now" once the first programmes arrive
    #[serde(default = "default_true")]
    pub scroll_to_now_on_load: bool,
}

fn default_data_source() -> String { DEFAULT_DATA_SOURCE.to_string() }
fn default_pixels_per_minute() -> u32 { DEFAULT_PIXELS_PER_MINUTE }
fn default_font_size() -> u32 { 13 }
fn default_true() -> bool { true }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_source: default_data_source(),
            pixels_per_minute: DEFAULT_PIXELS_PER_MINUTE,
            dark_mode: true,
            font_size: 13,
            scroll_to_now_on_load: true,
        }
    }
}

impl AppConfig {
    fn config_path() -> PathBuf {
        app_dir().join("config.json")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Missing file gives defaults; a corrupt one is reported and replaced by defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<AppConfig>(&content).map_err(|e| e.to_string())
            });

        match parsed {
            Ok(mut config) => {
                config.pixels_per_minute = clamp_scale(config.pixels_per_minute);
                config
            }
            Err(e) => {
                warn!("Ignoring unreadable config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self) {
        self.save_to(&Self::config_path());
    }

    pub fn save_to(&self, path: &Path) {
        match serde_json::to_string_pretty(self) {
            Ok(content) => {
                if let Err(e) = fs::write(path, content) {
                    warn!("Failed to save config to {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("Failed to serialize config: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("config.json"));
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.pixels_per_minute, 2);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = AppConfig {
            data_source: "https://tv.example.org/data".to_string(),
            pixels_per_minute: 5,
            dark_mode: false,
            ..Default::default()
        };
        config.save_to(&path);
        assert_eq!(AppConfig::load_from(&path), config);
    }

    #[test]
    fn test_partial_file_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"pixels_per_minute": 40}"#).unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.pixels_per_minute, 10);
        assert_eq!(config.data_source, DEFAULT_DATA_SOURCE);
        assert!(config.dark_mode);
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
    }
}
