//! Category classification and per-channel category summaries
//!
//! Feeds carry free-form category strings ("Football", "Série policière",
//! ...). The converter folds them onto a small meta vocabulary read from a
//! TOML file:
//!
//! ```toml
//! [categories]
//! Sports = ["Football", "Tennis"]
//! News = ["Journal", "Magazine d'actualité"]
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;

use crate::error::{GuideError, Result};
use crate::models::Programme;

/// Label used for raw categories missing from the mapping
pub const FALLBACK_CATEGORY: &str = "Other";

/// Number of categories kept in a channel summary
pub const SUMMARY_LIMIT: usize = 3;

#[derive(Debug, Default, Deserialize)]
struct CategoryFile {
    #[serde(default)]
    categories: toml::Table,
}

/// Raw category -> meta-category lookup
#[derive(Debug, Default)]
pub struct CategoryMap {
    lookup: HashMap<String, String>,
    /// Unmapped raw values in the order they were first seen
    unmapped: Vec<String>,
    unmapped_seen: HashSet<String>,
}

impl CategoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from (meta, raw values) pairs. Later pairs win when a raw value
    /// appears under more than one meta-category.
    pub fn from_groups<I, M, R, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = (M, R)>,
        M: Into<String>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = Self::new();
        for (meta, raws) in groups {
            let meta = meta.into();
            for raw in raws {
                let key = raw.as_ref().trim();
                if !key.is_empty() {
                    map.lookup.insert(key.to_string(), meta.clone());
                }
            }
        }
        map
    }

    /// Parse the `[categories]` table of a TOML document. Entries that are
    /// not arrays are skipped, as are non-string array items.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CategoryFile = toml::from_str(content)?;
        let groups = file.categories.into_iter().filter_map(|(meta, value)| {
            let list = value.as_array()?;
            let raws: Vec<String> = list
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            Some((meta, raws))
        });
        Ok(Self::from_groups(groups))
    }

    /// Load the mapping file. A missing or broken file is not fatal: every
    /// category then classifies as "Other".
    pub fn load_or_empty(path: &Path) -> Self {
        let loaded = fs::read_to_string(path)
            .map_err(GuideError::from)
            .and_then(|content| Self::from_toml_str(&content));
        match loaded {
            Ok(map) => {
                info!("Loaded {} category mappings from {}", map.len(), path.display());
                map
            }
            Err(e) => {
                warn!("Could not load {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// Meta-category for a single raw value, without bookkeeping
    pub fn lookup(&self, raw: &str) -> Option<&str> {
        self.lookup.get(raw.trim()).map(String::as_str)
    }

    /// Map raw categories to meta-categories, dedupe keeping first-seen order.
    /// Unmapped values become "Other" and are logged once per run.
    pub fn classify<S: AsRef<str>>(&mut self, raw: &[S]) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(raw.len());
        for value in raw {
            let key = value.as_ref().trim();
            if key.is_empty() {
                continue;
            }
            let meta = match self.lookup(key).map(str::to_string) {
                Some(meta) => meta,
                None => {
                    if self.unmapped_seen.insert(key.to_string()) {
                        info!("Unmapped category: {}", key);
                        self.unmapped.push(key.to_string());
                    }
                    FALLBACK_CATEGORY.to_string()
                }
            };
            if !out.contains(&meta) {
                out.push(meta);
            }
        }
        out
    }

    /// Raw values that had no mapping so far
    pub fn unmapped(&self) -> &[String] {
        &self.unmapped
    }
}

/// Top categories across a channel's programmes: by count descending, ties
/// broken by first occurrence, at most `SUMMARY_LIMIT`.
pub fn summarize(programmes: &[Programme]) -> Vec<String> {
    summarize_top(programmes, SUMMARY_LIMIT)
}

pub fn summarize_top(programmes: &[Programme], limit: usize) -> Vec<String> {
    // (category, count, first index)
    let mut counts: Vec<(&str, usize, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for prog in programmes {
        for cat in &prog.categories {
            if cat.is_empty() {
                continue;
            }
            match index.get(cat.as_str()) {
                Some(&slot) => counts[slot].1 += 1,
                None => {
                    let first = counts.len();
                    index.insert(cat.as_str(), first);
                    counts.push((cat.as_str(), 1, first));
                }
            }
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    counts
        .into_iter()
        .take(limit)
        .map(|(cat, _, _)| cat.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prog(categories: &[&str]) -> Programme {
        Programme {
            categories: categories.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_maps_and_dedupes() {
        let mut map = CategoryMap::from_groups([("Sports", ["Football", "Tennis"])]);
        let out = map.classify(&["Football", "Tennis", "UnknownSport"]);
        assert_eq!(out, vec!["Sports", "Other"]);
        assert_eq!(map.unmapped(), &["UnknownSport".to_string()]);
    }

    #[test]
    fn test_unmapped_recorded_once() {
        let mut map = CategoryMap::new();
        map.classify(&["Opera", "Ballet"]);
        map.classify(&["Opera"]);
        assert_eq!(map.unmapped(), &["Opera".to_string(), "Ballet".to_string()]);
    }

    #[test]
    fn test_classify_skips_blank_and_trims() {
        let mut map = CategoryMap::from_groups([("News", ["Journal"])]);
        assert_eq!(map.classify(&["  Journal ", "", "   "]), vec!["News"]);
        assert!(map.unmapped().is_empty());
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
[categories]
Sports = ["Football", " Tennis ", ""]
Movies = ["Film", "Téléfilm"]
Broken = "not a list"
"#;
        let map = CategoryMap::from_toml_str(toml).unwrap();
        assert_eq!(map.len(), 4);
        assert_eq!(map.lookup("Tennis"), Some("Sports"));
        assert_eq!(map.lookup("Téléfilm"), Some("Movies"));
        assert_eq!(map.lookup("not a list"), None);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let map = CategoryMap::load_or_empty(Path::new("/nonexistent/categories.toml"));
        assert!(map.is_empty());
    }

    #[test]
    fn test_summarize_by_count_then_first_seen() {
        let programmes = vec![
            prog(&["News"]),
            prog(&["Movies", "Sports"]),
            prog(&["Sports"]),
            prog(&["Kids"]),
            prog(&["Movies"]),
            prog(&["Documentary"]),
        ];
        assert_eq!(summarize(&programmes), vec!["Movies", "Sports", "News"]);
    }

    #[test]
    fn test_summarize_is_deterministic() {
        let programmes = vec![prog(&["B", "A"]), prog(&["C"]), prog(&["A", "B", "C"])];
        let first = summarize(&programmes);
        let second = summarize(&programmes);
        assert_eq!(first, second);
        assert_eq!(first, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_summarize_empty() {
        assert!(summarize(&[]).is_empty());
        assert!(summarize(&[prog(&[]), prog(&[""])]).is_empty());
    }
}
