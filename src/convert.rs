//! XMLTV feed to JSON conversion
//!
//! Produces the files the client reads:
//! - `channels.json`: every channel of the feed with its top categories
//! - `channels/channel-<id>.json`: one file per channel with its programmes

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;

use crate::categories::{summarize, CategoryMap};
use crate::epg::{
    logging_progress, unpack_feed, DownloadConfig, FeedDownloader, XmltvChannel, XmltvData,
    XmltvParser, XmltvProgramme,
};
use crate::error::{GuideError, Result};
use crate::models::{ChannelFile, ChannelIndexEntry, Programme};
use crate::source::{channel_file_path, CHANNEL_INDEX_PATH};

pub const DEFAULT_FEED_URL: &str = "https://xmltvfr.fr/xmltv/xmltv.zip";
pub const DEFAULT_OUT_DIR: &str = "public/data";
pub const DEFAULT_CATEGORIES_PATH: &str = "categories.toml";

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Feed to download when no local input is given
    pub url: String,
    /// Local feed (zip, gzip or plain XML); skips the download
    pub input: Option<PathBuf>,
    pub out_dir: PathBuf,
    /// TOML category mapping
    pub categories_path: PathBuf,
    /// Leave the downloaded archive and extracted XML in `out_dir`
    pub keep_feed: bool,
    pub download: DownloadConfig,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            input: None,
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            categories_path: PathBuf::from(DEFAULT_CATEGORIES_PATH),
            keep_feed: false,
            download: DownloadConfig::default(),
        }
    }
}

/// Converted feed, not yet written
#[derive(Debug, Clone, Default)]
pub struct Guide {
    pub index: Vec<ChannelIndexEntry>,
    pub files: Vec<ChannelFile>,
    /// Distinct channel ids referenced by programmes
    pub schedules: usize,
    pub programmes: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvertReport {
    pub channels_written: usize,
    pub schedules: usize,
    pub programmes: usize,
    pub unmapped: Vec<String>,
}

/// Download (or read), parse, classify and write the whole guide
pub fn run(options: &ConvertOptions) -> Result<ConvertReport> {
    fs::create_dir_all(options.out_dir.join("channels"))?;

    let (feed_path, downloaded) = match &options.input {
        Some(input) => {
            info!("Reading feed from {}", input.display());
            (input.clone(), false)
        }
        None => {
            let target = options.out_dir.join(feed_file_name(&options.url));
            info!("Downloading {}", options.url);
            FeedDownloader::download_to_file(
                &options.url,
                &target,
                &options.download,
                Some(logging_progress()),
            )?;
            (target, true)
        }
    };

    let xml_path = unpack_feed(&feed_path, &options.out_dir)?;
    info!("Parsing {}", xml_path.display());
    let data = XmltvParser::parse_file(&xml_path)?;
    if data.parse_error_count > 0 {
        // Nothing is written from a feed that did not parse cleanly
        for err in &data.parse_errors {
            debug!("{}", err);
        }
        return Err(GuideError::Xml(format!(
            "{} has {} parse errors, first: {}",
            xml_path.display(),
            data.parse_error_count,
            data.parse_errors.first().map(String::as_str).unwrap_or("unknown")
        )));
    }

    let mut categories = CategoryMap::load_or_empty(&options.categories_path);
    let guide = convert_data(data, &mut categories);
    let channels_written = write_guide(&options.out_dir, &guide)?;

    if !options.keep_feed {
        if xml_path != feed_path {
            remove_quietly(&xml_path);
        }
        if downloaded {
            remove_quietly(&feed_path);
        }
    }

    let report = ConvertReport {
        channels_written,
        schedules: guide.schedules,
        programmes: guide.programmes,
        unmapped: categories.unmapped().to_vec(),
    };
    info!(
        "Done: wrote {} channels, generated {} channel schedules ({} programmes), {} unmapped categories",
        report.channels_written,
        report.schedules,
        report.programmes,
        report.unmapped.len()
    );
    Ok(report)
}

/// Classify categories, bucket programmes per channel and summarize
/// channel categories. Channel and programme order follow the feed; a
/// channel id listed twice is written once.
pub fn convert_data(data: XmltvData, categories: &mut CategoryMap) -> Guide {
    let programme_total = data.programmes.len();
    let mut by_channel: HashMap<String, Vec<Programme>> = HashMap::new();
    for prog in data.programmes {
        let channel = prog.channel.clone();
        let converted = convert_programme(prog, categories);
        by_channel.entry(channel).or_default().push(converted);
    }
    let schedules = by_channel.len();

    let channels = merge_duplicate_channels(data.channels);
    let mut index = Vec::with_capacity(channels.len());
    let mut files = Vec::with_capacity(channels.len());
    for channel in channels {
        let programmes = by_channel.remove(&channel.id).unwrap_or_default();
        let summary = summarize(&programmes);
        let icon = channel.icon.unwrap_or_default();

        index.push(ChannelIndexEntry {
            id: channel.id.clone(),
            display_name: channel.display_name.clone(),
            icon: icon.clone(),
            categories: summary.clone(),
        });
        files.push(ChannelFile {
            id: channel.id,
            display_name: channel.display_name,
            icon,
            categories: summary,
            programmes,
        });
    }

    if !by_channel.is_empty() {
        debug!(
            "{} channel ids have programmes but no <channel> entry",
            by_channel.len()
        );
    }

    Guide {
        index,
        files,
        schedules,
        programmes: programme_total,
    }
}

/// Keep the first entry per id, filling a missing name or icon from later ones
fn merge_duplicate_channels(channels: Vec<XmltvChannel>) -> Vec<XmltvChannel> {
    let mut merged: Vec<XmltvChannel> = Vec::with_capacity(channels.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for channel in channels {
        match positions.get(&channel.id) {
            Some(&i) => {
                let first = &mut merged[i];
                debug!("Channel {} listed more than once", channel.id);
                if first.display_name.is_empty() {
                    first.display_name = channel.display_name;
                }
                if first.icon.is_none() {
                    first.icon = channel.icon;
                }
            }
            None => {
                positions.insert(channel.id.clone(), merged.len());
                merged.push(channel);
            }
        }
    }
    merged
}

fn convert_programme(prog: XmltvProgramme, categories: &mut CategoryMap) -> Programme {
    Programme {
        categories: categories.classify(&prog.categories),
        title: prog.title,
        sub_title: prog.sub_title,
        desc: prog.desc,
        start: prog.start,
        stop: prog.stop,
        icon: prog.icon.unwrap_or_default(),
        episode_num: prog.episode_num,
    }
}

/// Write the index and every channel file. Returns the number of channel
/// files written.
pub fn write_guide(out_dir: &Path, guide: &Guide) -> Result<usize> {
    fs::create_dir_all(out_dir.join("channels"))?;

    let index_path = out_dir.join(CHANNEL_INDEX_PATH);
    write_json(&index_path, &guide.index)?;
    info!("Wrote {}", index_path.display());

    for file in &guide.files {
        let path = out_dir.join(channel_file_path(&file.id));
        write_json(&path, file)?;
        debug!("Wrote {}", path.display());
    }
    Ok(guide.files.len())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)?;
    Ok(())
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) => debug!("Could not remove {}: {}", path.display(), e),
    }
}

/// Last path segment of the feed URL, or `xmltv.zip`
fn feed_file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let name = path.rsplit('/').next().unwrap_or_default();
    if name.is_empty() || !name.contains('.') {
        "xmltv.zip".to_string()
    } else {
        name.to_string()
    }
}
