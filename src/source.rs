//! Where the client reads converter output from
//!
//! The converter writes `channels.json` and `channels/channel-<id>.json`
//! under one directory. The client reads the same relative paths, either
//! from a web server or straight from disk.

use std::io::Read;
use std::path::PathBuf;

use serde::de::DeserializeOwned;

use crate::epg::create_agent;
use crate::error::{GuideError, Result};

pub const CHANNEL_INDEX_PATH: &str = "channels.json";

/// Lower-case, anything outside `[a-z0-9._-]` becomes `_`
pub fn safe_filename(id: &str) -> String {
    id.to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect()
}

/// Relative path of a channel's programme file
pub fn channel_file_path(id: &str) -> String {
    let safe = if id.is_empty() {
        "unknown".to_string()
    } else {
        safe_filename(id)
    };
    format!("channels/channel-{}.json", safe)
}

/// Read-only access to converter output by relative path
pub trait DataSource: Send + Sync {
    fn fetch(&self, path: &str) -> Result<Vec<u8>>;

    /// Human-readable location for logs and the UI
    fn describe(&self) -> String;
}

/// Load and deserialize a JSON file from any source
pub fn fetch_json<T: DeserializeOwned>(source: &dyn DataSource, path: &str) -> Result<T> {
    let bytes = source.fetch(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Static files served over HTTP(S)
pub struct HttpSource {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: create_agent(15, 60),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches("./").trim_start_matches('/'))
    }
}

impl DataSource for HttpSource {
    fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.url(path);
        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| GuideError::Http(format!("Failed to load {}: {}", url, e)))?;

        if response.status() != 200 {
            return Err(GuideError::Http(format!(
                "Failed to load {} ({})",
                url,
                response.status()
            )));
        }

        let mut bytes = Vec::new();
        response.into_body().into_reader().read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

/// Converter output directory on the local disk
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DataSource for DirSource {
    fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.root.join(path.trim_start_matches("./"));
        std::fs::read(&full).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GuideError::NotFound(full.display().to_string()),
            _ => GuideError::Io(e),
        })
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Pick a source from user input: http(s) URLs go over the network,
/// anything else is a directory
pub fn open_source(location: &str) -> Box<dyn DataSource> {
    let location = location.trim();
    if location.starts_with("http://") || location.starts_with("https://") {
        Box::new(HttpSource::new(location))
    } else {
        Box::new(DirSource::new(location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChannelIndexEntry;

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename("TF1.fr"), "tf1.fr");
        assert_eq!(safe_filename("France 2 (HD)"), "france_2__hd_");
        assert_eq!(safe_filename("a/b\\c"), "a_b_c");
        assert_eq!(safe_filename("Arte-DE_1"), "arte-de_1");
        assert_eq!(safe_filename("Télé"), "t_l_");
    }

    #[test]
    fn test_channel_file_path() {
        assert_eq!(channel_file_path("M6.fr"), "channels/channel-m6.fr.json");
        assert_eq!(channel_file_path(""), "channels/channel-unknown.json");
    }

    #[test]
    fn test_http_url_join() {
        let source = HttpSource::new("https://example.com/data/");
        assert_eq!(source.url("./channels.json"), "https://example.com/data/channels.json");
        assert_eq!(source.url("/channels/a.json"), "https://example.com/data/channels/a.json");
    }

    #[test]
    fn test_dir_source_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CHANNEL_INDEX_PATH),
            r#"[{"id":"a","displayName":"A","icon":"","categories":[]}]"#,
        )
        .unwrap();

        let source = DirSource::new(dir.path());
        let entries: Vec<ChannelIndexEntry> = fetch_json(&source, CHANNEL_INDEX_PATH).unwrap();
        assert_eq!(entries[0].display_name, "A");

        let missing = source.fetch("channels/channel-x.json");
        assert!(matches!(missing, Err(GuideError::NotFound(_))));
    }

    #[test]
    fn test_open_source_picks_by_scheme() {
        assert_eq!(open_source("https://x.org/data").describe(), "https://x.org/data");
        assert_eq!(open_source("public/data").describe(), "public/data");
    }
}
