//! Data models for the TV guide
//!
//! `ChannelIndexEntry` and `ChannelFile` are the JSON files the converter
//! writes and the client reads. `Channel` and `Schedule` are the client-side
//! view of that data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::time::parse_timestamp;

/// A single programme as stored in a channel file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Programme {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, alias = "subtitle", deserialize_with = "null_as_empty")]
    pub sub_title: String,
    #[serde(default, alias = "description", deserialize_with = "null_as_empty")]
    pub desc: String,
    /// Raw start timestamp, usually `YYYYMMDDhhmmss +hhmm`
    #[serde(default, alias = "begin", alias = "tstart", deserialize_with = "null_as_empty")]
    pub start: String,
    /// Raw stop timestamp
    #[serde(default, alias = "end", alias = "finish", deserialize_with = "null_as_empty")]
    pub stop: String,
    /// Meta-categories, deduplicated in first-seen order
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub icon: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub episode_num: String,
}

impl Programme {
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.start)
    }

    pub fn stop_time(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.stop)
    }

    pub fn subtitle(&self) -> Option<&str> {
        non_empty(&self.sub_title)
    }

    pub fn description(&self) -> Option<&str> {
        non_empty(&self.desc)
    }

    pub fn episode(&self) -> Option<&str> {
        non_empty(&self.episode_num)
    }

    pub fn icon_url(&self) -> Option<&str> {
        non_empty(&self.icon)
    }
}

/// One entry of `channels.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelIndexEntry {
    #[serde(default, alias = "channel", deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(default, alias = "name", alias = "display_name", deserialize_with = "null_as_empty")]
    pub display_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub icon: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Contents of `channels/channel-<id>.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelFile {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(default, alias = "name", alias = "display_name", deserialize_with = "null_as_empty")]
    pub display_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub icon: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, alias = "programs")]
    pub programmes: Vec<Programme>,
}

/// Client-side channel. `programmes` stays empty until fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub categories: Vec<String>,
    pub programmes: Vec<Programme>,
}

impl Channel {
    /// Name to show and sort by: display name, falling back to the id
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

impl From<ChannelIndexEntry> for Channel {
    fn from(entry: ChannelIndexEntry) -> Self {
        let name = if entry.display_name.is_empty() {
            entry.id.clone()
        } else {
            entry.display_name
        };
        Self {
            id: entry.id,
            name,
            icon: (!entry.icon.is_empty()).then_some(entry.icon),
            categories: entry.categories,
            programmes: Vec::new(),
        }
    }
}

/// All known channels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    pub channels: Vec<Channel>,
}

impl Schedule {
    pub fn from_index(entries: Vec<ChannelIndexEntry>) -> Self {
        Self {
            channels: entries.into_iter().map(Channel::from).collect(),
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_programme_json_shape() {
        let prog = Programme {
            title: "News".to_string(),
            start: "20250101090000 +0000".to_string(),
            stop: "20250101100000 +0000".to_string(),
            categories: vec!["News".to_string()],
            episode_num: "0.4.".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&prog).unwrap();
        assert_eq!(value["subTitle"], "");
        assert_eq!(value["episodeNum"], "0.4.");
        assert_eq!(value["stop"], "20250101100000 +0000");
    }

    #[test]
    fn test_programme_accepts_alias_keys_and_nulls() {
        let json = r#"{"title":"Film","end":"20250101100000","begin":"20250101080000","description":"Plot","icon":null}"#;
        let prog: Programme = serde_json::from_str(json).unwrap();
        assert_eq!(prog.start, "20250101080000");
        assert_eq!(prog.stop, "20250101100000");
        assert_eq!(prog.description(), Some("Plot"));
        assert_eq!(prog.icon_url(), None);
    }

    #[test]
    fn test_channel_from_index_entry_falls_back_to_id() {
        let entry = ChannelIndexEntry {
            id: "tf1.fr".to_string(),
            ..Default::default()
        };
        let channel = Channel::from(entry);
        assert_eq!(channel.name, "tf1.fr");
        assert_eq!(channel.icon, None);
        assert!(channel.programmes.is_empty());
    }

    #[test]
    fn test_channel_file_accepts_programs_key() {
        let json = r#"{"id":"a","name":"A","programs":[{"title":"x"}]}"#;
        let file: ChannelFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.display_name, "A");
        assert_eq!(file.programmes.len(), 1);
    }
}
