//! Persisted channel selection
//!
//! Stored as `{ "values": ["tf1.fr", "m6.fr"] }` next to the client config.

use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::app_dir;
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionFile {
    #[serde(default)]
    pub values: Vec<String>,
}

/// Reads and writes the selection file at a fixed path
#[derive(Debug, Clone)]
pub struct SelectionStore {
    path: PathBuf,
}

impl SelectionStore {
    /// `<config_dir>/tvguide/selection.json`
    pub fn new() -> Self {
        Self::at(app_dir().join("selection.json"))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Selected ids in saved order. Missing, unreadable or malformed files
    /// give an empty selection.
    pub fn load(&self) -> Vec<String> {
        if !self.path.exists() {
            return Vec::new();
        }
        match self.read() {
            Ok(file) => dedup(file.values),
            Err(e) => {
                warn!("Ignoring selection file {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    fn read(&self) -> Result<SelectionFile> {
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Overwrite the file with the given ids
    pub fn save(&self, ids: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = SelectionFile {
            values: ids.to_vec(),
        };
        fs::write(&self.path, serde_json::to_string(&file)?)?;
        Ok(())
    }
}

impl Default for SelectionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SelectionStore::at(dir.path().join("selection.json"));
        assert!(store.load().is_empty());

        let ids = vec!["tf1.fr".to_string(), "arte.fr".to_string()];
        store.save(&ids).unwrap();
        assert_eq!(store.load(), ids);

        let raw = fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, r#"{"values":["tf1.fr","arte.fr"]}"#);
    }

    #[test]
    fn test_malformed_file_is_empty_selection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selection.json");
        fs::write(&path, r#"["not","an","object"]"#).unwrap();
        assert!(SelectionStore::at(&path).load().is_empty());

        fs::write(&path, "garbage").unwrap();
        assert!(SelectionStore::at(&path).load().is_empty());
    }

    #[test]
    fn test_duplicates_and_blanks_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selection.json");
        fs::write(&path, r#"{"values":["a","","b","a"]}"#).unwrap();
        assert_eq!(SelectionStore::at(&path).load(), vec!["a", "b"]);
    }
}
