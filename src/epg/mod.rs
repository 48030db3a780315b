//! XMLTV (Electronic Program Guide) module
//!
//! Contains the streaming XMLTV parser and the feed downloader.

mod download;
mod parser;

// Re-export public types
pub use download::{
    create_agent, detect_format, logging_progress, unpack_feed, DownloadConfig, FeedDownloader,
    FeedFormat, ProgressCallback,
};
pub use parser::{format_episode, XmltvChannel, XmltvData, XmltvParser, XmltvProgramme};
