//! XMLTV Parser
//! Streaming parser for XMLTV feeds - handles 100MB+ files efficiently
//! Supports both plain XML and gzip-compressed (.xml.gz) files

use flate2::read::GzDecoder;
use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::io::{BufRead, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::Result;

/// Separator used when an element repeats (several titles, several episode-num systems)
const JOIN_SEPARATOR: &str = " / ";

/// Maximum number of parse error messages kept for reporting
const MAX_STORED_ERRORS: usize = 50;

/// A `<channel>` element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmltvChannel {
    pub id: String,
    /// First display-name
    pub display_name: String,
    pub icon: Option<String>,
}

/// A `<programme>` element, kept as raw text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmltvProgramme {
    /// Channel ID this programme belongs to
    pub channel: String,
    /// Raw start attribute, e.g. "20240115120000 +0000"
    pub start: String,
    /// Raw stop attribute
    pub stop: String,
    pub title: String,
    pub sub_title: String,
    pub desc: String,
    /// Raw category strings in document order
    pub categories: Vec<String>,
    /// Raw episode-num text, e.g. "0.4."
    pub episode_num: String,
    pub icon: Option<String>,
}

/// Parsed feed, in document order
#[derive(Debug, Clone, Default)]
pub struct XmltvData {
    pub channels: Vec<XmltvChannel>,
    pub programmes: Vec<XmltvProgramme>,
    /// Parse errors encountered (up to 50)
    pub parse_errors: Vec<String>,
    /// Total count of parse errors
    pub parse_error_count: usize,
}

impl XmltvData {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq)]
enum ParserState {
    Root,
    Channel,
    Programme,
    Title,
    SubTitle,
    Desc,
    Category,
    DisplayName,
    EpisodeNum,
}

impl ParserState {
    fn is_text(self) -> bool {
        matches!(
            self,
            ParserState::Title
                | ParserState::SubTitle
                | ParserState::Desc
                | ParserState::Category
                | ParserState::DisplayName
                | ParserState::EpisodeNum
        )
    }
}

/// Parser for XMLTV format - streaming, memory efficient
pub struct XmltvParser;

impl XmltvParser {
    /// Parse XMLTV from a string (for smaller documents)
    pub fn parse(xml: &str) -> Result<XmltvData> {
        Self::parse_reader(xml.as_bytes())
    }

    /// Parse XMLTV from a reader - streaming, handles large files.
    /// Malformed regions, including a document that ends with elements
    /// still open, are counted in `parse_errors` and skipped; whatever
    /// parsed cleanly is returned.
    pub fn parse_reader<R: BufRead>(reader: R) -> Result<XmltvData> {
        // Text is trimmed per element on close; trimming each text event would
        // eat the spaces around entity references
        let mut xml_reader = Reader::from_reader(reader);

        let mut data = XmltvData::new();
        let mut buf = Vec::with_capacity(8192);

        let mut state = ParserState::Root;
        let mut current_channel: Option<XmltvChannel> = None;
        let mut current_programme: Option<XmltvProgramme> = None;
        let mut text_buf = String::new();
        let mut error_count = 0;
        let mut errors: Vec<String> = Vec::new();
        // Open elements, to catch a truncated document at EOF
        let mut depth: usize = 0;

        loop {
            let position = xml_reader.buffer_position();
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    depth += 1;
                    match e.name().as_ref() {
                        b"channel" => {
                            state = ParserState::Channel;
                            current_channel = Some(start_channel(e));
                        }
                        b"programme" => {
                            state = ParserState::Programme;
                            current_programme = Some(start_programme(e));
                        }
                        b"title" if state == ParserState::Programme => {
                            state = ParserState::Title;
                            text_buf.clear();
                        }
                        b"sub-title" if state == ParserState::Programme => {
                            state = ParserState::SubTitle;
                            text_buf.clear();
                        }
                        b"desc" if state == ParserState::Programme => {
                            state = ParserState::Desc;
                            text_buf.clear();
                        }
                        b"category" if state == ParserState::Programme => {
                            state = ParserState::Category;
                            text_buf.clear();
                        }
                        b"episode-num" if state == ParserState::Programme => {
                            state = ParserState::EpisodeNum;
                            text_buf.clear();
                        }
                        b"display-name" if state == ParserState::Channel => {
                            state = ParserState::DisplayName;
                            text_buf.clear();
                        }
                        b"icon" => {
                            set_icon(e, state, &mut current_channel, &mut current_programme);
                        }
                        _ => {}
                    }
                }
                Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                    b"icon" => set_icon(e, state, &mut current_channel, &mut current_programme),
                    b"channel" => {
                        let channel = start_channel(e);
                        if !channel.id.is_empty() {
                            data.channels.push(channel);
                        }
                    }
                    _ => {}
                },
                Ok(Event::Text(e)) => {
                    if state.is_text() {
                        let raw = String::from_utf8_lossy(e.as_ref());
                        text_buf.push_str(&decode_xml_entities(&raw));
                    }
                }
                Ok(Event::CData(e)) => {
                    if state.is_text() {
                        text_buf.push_str(&String::from_utf8_lossy(e.as_ref()));
                    }
                }
                Ok(Event::GeneralRef(e)) => {
                    if state.is_text() {
                        let name = String::from_utf8_lossy(e.as_ref());
                        text_buf.push_str(&decode_xml_entities(&format!("&{};", name)));
                    }
                }
                Ok(Event::End(ref e)) => {
                    depth = depth.saturating_sub(1);
                    match e.name().as_ref() {
                        b"channel" => {
                            if let Some(channel) = current_channel.take() {
                                if !channel.id.is_empty() {
                                    data.channels.push(channel);
                                }
                            }
                            state = ParserState::Root;
                        }
                        b"programme" => {
                            if let Some(programme) = current_programme.take() {
                                if !programme.channel.is_empty() {
                                    data.programmes.push(programme);
                                }
                            }
                            state = ParserState::Root;
                        }
                        b"title" | b"sub-title" | b"desc" | b"category" | b"episode-num"
                            if state.is_text() && state != ParserState::DisplayName =>
                        {
                            if let Some(ref mut prog) = current_programme {
                                let text = text_buf.trim();
                                match state {
                                    ParserState::Title => append_joined(&mut prog.title, text),
                                    ParserState::SubTitle => append_joined(&mut prog.sub_title, text),
                                    ParserState::Desc => append_joined(&mut prog.desc, text),
                                    ParserState::EpisodeNum => {
                                        append_joined(&mut prog.episode_num, text)
                                    }
                                    ParserState::Category if !text.is_empty() => {
                                        prog.categories.push(text.to_string())
                                    }
                                    _ => {}
                                }
                            }
                            text_buf.clear();
                            state = ParserState::Programme;
                        }
                        b"display-name" if state == ParserState::DisplayName => {
                            if let Some(ref mut chan) = current_channel {
                                if chan.display_name.is_empty() {
                                    chan.display_name = text_buf.trim().to_string();
                                }
                            }
                            text_buf.clear();
                            state = ParserState::Channel;
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => {
                    if depth > 0 {
                        error_count += 1;
                        let error_msg = format!(
                            "XML error at byte {}: document ends with {} element(s) still open",
                            position, depth
                        );
                        debug!("{}", error_msg);
                        if errors.len() < MAX_STORED_ERRORS {
                            errors.push(error_msg);
                        }
                    }
                    break;
                }
                Err(e) => {
                    error_count += 1;
                    let error_msg = format!("XML error at byte {}: {}", position, e);
                    debug!("{}", error_msg);
                    if errors.len() < MAX_STORED_ERRORS {
                        errors.push(error_msg);
                    }

                    // Drop the element being built and resync at the next top-level tag
                    current_programme = None;
                    current_channel = None;
                    state = ParserState::Root;
                    text_buf.clear();
                }
                _ => {}
            }
            buf.clear();
        }

        if error_count > 0 {
            warn!("XMLTV feed had {} parse errors", error_count);
        }
        data.parse_errors = errors;
        data.parse_error_count = error_count;

        Ok(data)
    }

    /// Parse XMLTV from file - auto-detects gzip compression
    pub fn parse_file(path: &Path) -> Result<XmltvData> {
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::with_capacity(64 * 1024, file);

        // Read first 2 bytes to check for gzip magic number (1f 8b)
        let mut magic = [0u8; 2];
        let n = reader.read(&mut magic)?;
        reader.seek(SeekFrom::Start(0))?;

        if n == 2 && magic == [0x1f, 0x8b] {
            let decoder = GzDecoder::new(reader);
            let buf_reader = std::io::BufReader::with_capacity(64 * 1024, decoder);
            Self::parse_reader(SanitizingBufReader::new(buf_reader))
        } else {
            Self::parse_reader(SanitizingBufReader::new(reader))
        }
    }
}

fn start_channel(e: &BytesStart) -> XmltvChannel {
    XmltvChannel {
        id: get_attribute(e, b"id").unwrap_or_default(),
        display_name: String::new(),
        icon: None,
    }
}

fn start_programme(e: &BytesStart) -> XmltvProgramme {
    XmltvProgramme {
        channel: get_attribute(e, b"channel").unwrap_or_default(),
        start: get_attribute(e, b"start").unwrap_or_default(),
        stop: get_attribute(e, b"stop").unwrap_or_default(),
        ..Default::default()
    }
}

/// First `<icon src>` wins, so rating or credit icons nested further down
/// do not replace the programme's own icon.
fn set_icon(
    e: &BytesStart,
    state: ParserState,
    channel: &mut Option<XmltvChannel>,
    programme: &mut Option<XmltvProgramme>,
) {
    let Some(src) = get_attribute(e, b"src").filter(|s| !s.trim().is_empty()) else {
        return;
    };
    match state {
        ParserState::Channel => {
            if let Some(chan) = channel {
                chan.icon.get_or_insert(src);
            }
        }
        ParserState::Programme => {
            if let Some(prog) = programme {
                prog.icon.get_or_insert(src);
            }
        }
        _ => {}
    }
}

fn append_joined(target: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push_str(JOIN_SEPARATOR);
    }
    target.push_str(text);
}

/// BufReader wrapper that filters out illegal XML 1.0 characters on read
/// Legal XML 1.0: #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
/// Also escapes bare ampersands that would otherwise abort the element
struct SanitizingBufReader<R> {
    inner: R,
    buffer: Vec<u8>,
    out_buffer: Vec<u8>,
    pos: usize,
    filled: usize,
}

impl<R: Read> SanitizingBufReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: vec![0u8; 64 * 1024],
            out_buffer: Vec::with_capacity(96 * 1024), // Slightly larger for escapes
            pos: 0,
            filled: 0,
        }
    }

    fn sanitize_byte(b: u8) -> u8 {
        match b {
            0x09 | 0x0A | 0x0D => b,
            0x00..=0x1F => 0x20,
            0x7F => 0x20,
            _ => b,
        }
    }

    fn refill_buffer(&mut self) -> std::io::Result<()> {
        let n = loop {
            match self.inner.read(&mut self.buffer) {
                Ok(n) => break n,
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        self.out_buffer.clear();

        let mut i = 0;
        while i < n {
            let b = Self::sanitize_byte(self.buffer[i]);
            if b == b'&' && !Self::is_valid_entity_start(&self.buffer[i..n]) {
                self.out_buffer.extend_from_slice(b"&amp;");
                i += 1;
                continue;
            }
            self.out_buffer.push(b);
            i += 1;
        }

        self.pos = 0;
        self.filled = self.out_buffer.len();
        Ok(())
    }

    /// Check if bytes starting with & look like a valid XML entity
    fn is_valid_entity_start(bytes: &[u8]) -> bool {
        if bytes.len() < 2 {
            return false;
        }

        // Numeric entity &#...
        if bytes[1] == b'#' {
            return true;
        }

        // Named entity &name;
        let mut end = 1;
        while end < bytes.len() && end < 10 {
            match bytes[end] {
                b';' => return end > 1,
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => end += 1,
                _ => return false,
            }
        }

        false
    }
}

impl<R: Read> Read for SanitizingBufReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.filled {
            self.refill_buffer()?;
            if self.filled == 0 {
                return Ok(0);
            }
        }

        let available = self.filled - self.pos;
        let to_copy = available.min(buf.len());
        buf[..to_copy].copy_from_slice(&self.out_buffer[self.pos..self.pos + to_copy]);
        self.pos += to_copy;
        Ok(to_copy)
    }
}

impl<R: Read> BufRead for SanitizingBufReader<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        if self.pos >= self.filled {
            self.refill_buffer()?;
        }
        Ok(&self.out_buffer[self.pos..self.filled])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.filled);
    }
}

/// Decode XML entities back to normal characters
fn decode_xml_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut result = s
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ");

    // Numeric entities, decimal or hex
    let mut search_from = 0;
    while let Some(rel) = result[search_from..].find("&#") {
        let start = search_from + rel;
        let Some(end) = result[start..].find(';') else { break };
        let entity_end = start + end + 1;

        let decoded = {
            let num_str = &result[start + 2..entity_end - 1];
            if let Some(hex) = num_str.strip_prefix(['x', 'X']) {
                u32::from_str_radix(hex, 16).ok()
            } else {
                num_str.parse::<u32>().ok()
            }
        };

        match decoded.and_then(char::from_u32) {
            Some(c) => {
                result.replace_range(start..entity_end, c.encode_utf8(&mut [0u8; 4]));
                search_from = start + c.len_utf8();
            }
            None => search_from = start + 2,
        }
    }

    // Last so "&amp;lt;" stays "&lt;"
    result.replace("&amp;", "&")
}

/// Get attribute value from XML element
fn get_attribute(e: &BytesStart, name: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name {
            let raw = String::from_utf8(attr.value.as_ref().to_vec()).ok()?;
            return Some(decode_xml_entities(&raw));
        }
    }
    None
}

/// Format episode number for display (e.g., "0.4." -> "S01E05").
/// Anything that is not xmltv_ns style is returned as-is.
pub fn format_episode(episode: &str) -> String {
    let episode = episode.trim();

    // Several systems joined together: use the first one
    let first = episode.split(JOIN_SEPARATOR).next().unwrap_or(episode).trim();

    // XMLTV format: "season.episode.part" (0-indexed)
    let parts: Vec<&str> = first.split('.').collect();

    if parts.len() >= 2 {
        let season = parts[0].trim().split('/').next().and_then(|s| s.parse::<i32>().ok());
        let ep = parts[1].trim().split('/').next().and_then(|s| s.parse::<i32>().ok());

        match (season, ep) {
            (Some(s), Some(e)) if s >= 0 && e >= 0 => return format!("S{:02}E{:02}", s + 1, e + 1),
            (None, Some(e)) if parts[0].trim().is_empty() && e >= 0 => {
                return format!("E{:02}", e + 1)
            }
            _ => {}
        }
    }

    episode.to_string()
}
