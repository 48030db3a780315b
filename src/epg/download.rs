//! Feed downloading and unpacking

use log::{debug, info, warn};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GuideError, Result};

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// Download configuration
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Maximum retry attempts
    pub max_retries: u32,
    /// Delay between retries in milliseconds
    pub retry_delay_ms: u64,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds
    pub read_timeout_secs: u64,
    /// Chunk size for reading (bytes)
    pub chunk_size: usize,
    /// User agent string
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2000,
            connect_timeout_secs: 30,
            read_timeout_secs: 180,
            chunk_size: 64 * 1024, // 64KB chunks
            user_agent: concat!("tvguide/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Download progress callback: (downloaded_bytes, total_bytes)
pub type ProgressCallback = Box<dyn Fn(u64, Option<u64>) + Send>;

/// Create a configured ureq agent
pub fn create_agent(connect_timeout_secs: u64, read_timeout_secs: u64) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(read_timeout_secs)))
        .timeout_connect(Some(Duration::from_secs(connect_timeout_secs)))
        .max_idle_connections(4)
        .max_idle_connections_per_host(2)
        .build()
        .new_agent()
}

/// Feed downloader with retry support
pub struct FeedDownloader;

impl FeedDownloader {
    /// Download to file, retrying on failure (HTTP and HTTPS)
    pub fn download_to_file(
        url: &str,
        output_path: &Path,
        config: &DownloadConfig,
        progress: Option<ProgressCallback>,
    ) -> Result<u64> {
        let agent = create_agent(config.connect_timeout_secs, config.read_timeout_secs);
        let mut attempts = 0;

        loop {
            attempts += 1;

            match Self::try_download(&agent, url, output_path, config, &progress) {
                Ok(total) => {
                    if let Some(ref cb) = progress {
                        cb(total, Some(total));
                    }
                    info!("Downloaded {} bytes from {}", total, url);
                    return Ok(total);
                }
                Err(e) => {
                    if attempts >= config.max_retries {
                        return Err(GuideError::Http(format!(
                            "download failed after {} attempts: {}",
                            attempts, e
                        )));
                    }
                    warn!("Download attempt {} failed: {}", attempts, e);
                    std::thread::sleep(Duration::from_millis(config.retry_delay_ms));
                }
            }
        }
    }

    fn try_download(
        agent: &ureq::Agent,
        url: &str,
        output_path: &Path,
        config: &DownloadConfig,
        progress: &Option<ProgressCallback>,
    ) -> Result<u64> {
        let response = agent
            .get(url)
            .header("User-Agent", &config.user_agent)
            .call()?;

        let status = response.status();
        if status != 200 && status != 206 {
            return Err(GuideError::Http(format!("HTTP error: {}", status)));
        }

        let total_size: Option<u64> = response
            .headers()
            .get("Content-Length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());

        let mut file = File::create(output_path)?;

        let mut reader = response.into_body().into_reader();
        let mut buffer = vec![0u8; config.chunk_size];
        let mut downloaded: u64 = 0;

        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break, // EOF
                Ok(n) => {
                    file.write_all(&buffer[..n])?;
                    downloaded += n as u64;

                    if let Some(ref cb) = progress {
                        cb(downloaded, total_size);
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        file.flush()?;
        Ok(downloaded)
    }
}

/// Log download progress at debug level, one line per 10%
pub fn logging_progress() -> ProgressCallback {
    let last_decile = std::sync::atomic::AtomicU64::new(u64::MAX);
    Box::new(move |downloaded, total| {
        use std::sync::atomic::Ordering;
        let dl_mb = downloaded as f64 / 1_048_576.0;
        match total {
            Some(total) if total > 0 => {
                let decile = downloaded * 10 / total;
                if last_decile.swap(decile, Ordering::Relaxed) != decile {
                    let total_mb = total as f64 / 1_048_576.0;
                    debug!("Downloading: {:.1} / {:.1} MB ({}%)", dl_mb, total_mb, decile * 10);
                }
            }
            _ => {
                let mb = downloaded / 1_048_576;
                if last_decile.swap(mb, Ordering::Relaxed) != mb {
                    debug!("Downloading: {:.1} MB", dl_mb);
                }
            }
        }
    })
}

/// Container format detected from the first bytes of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Zip,
    Gzip,
    Xml,
}

pub fn detect_format(path: &Path) -> Result<FeedFormat> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < magic.len() {
        let n = file.read(&mut magic[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(if filled == 4 && magic == ZIP_MAGIC {
        FeedFormat::Zip
    } else if filled >= 2 && magic[..2] == [0x1f, 0x8b] {
        FeedFormat::Gzip
    } else {
        FeedFormat::Xml
    })
}

/// Make a downloaded feed parseable. Zip archives have their first `.xml`
/// entry (or first file entry) extracted into `dest_dir` and the extracted
/// path is returned; gzip and plain XML are returned unchanged since the
/// parser reads them directly.
pub fn unpack_feed(path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    if detect_format(path)? != FeedFormat::Zip {
        return Ok(path.to_path_buf());
    }

    let mut archive = zip::ZipArchive::new(File::open(path)?)?;

    let mut chosen: Option<usize> = None;
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if !entry.is_file() {
            continue;
        }
        if entry.name().to_ascii_lowercase().ends_with(".xml") {
            chosen = Some(i);
            break;
        }
        chosen.get_or_insert(i);
    }
    let index = chosen.ok_or_else(|| GuideError::Archive("archive contains no files".to_string()))?;

    let mut entry = archive.by_index(index)?;
    let file_name = entry
        .enclosed_name()
        .and_then(|p| p.file_name().map(|n| n.to_owned()))
        .ok_or_else(|| GuideError::Archive(format!("unsafe entry name: {}", entry.name())))?;

    let out_path = dest_dir.join(file_name);
    let mut out = File::create(&out_path)?;
    let written = std::io::copy(&mut entry, &mut out)?;
    out.flush()?;

    info!("Extracted {} ({} bytes) to {}", entry.name(), written, out_path.display());
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_detect_format() {
        let dir = tempfile::tempdir().unwrap();

        let plain = dir.path().join("feed.xml");
        std::fs::write(&plain, "<tv></tv>").unwrap();
        assert_eq!(detect_format(&plain).unwrap(), FeedFormat::Xml);

        let gz = dir.path().join("feed.xml.gz");
        std::fs::write(&gz, [0x1f, 0x8b, 0x08, 0x00]).unwrap();
        assert_eq!(detect_format(&gz).unwrap(), FeedFormat::Gzip);

        let tiny = dir.path().join("tiny");
        std::fs::write(&tiny, "x").unwrap();
        assert_eq!(detect_format(&tiny).unwrap(), FeedFormat::Xml);
    }

    #[test]
    fn test_unpack_zip_picks_xml_entry() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("xmltv.zip");
        write_zip(
            &zip_path,
            &[("README.txt", b"hello"), ("xmltv.xml", b"<tv></tv>")],
        );
        assert_eq!(detect_format(&zip_path).unwrap(), FeedFormat::Zip);

        let out = unpack_feed(&zip_path, dir.path()).unwrap();
        assert_eq!(out, dir.path().join("xmltv.xml"));
        assert_eq!(std::fs::read_to_string(out).unwrap(), "<tv></tv>");
    }

    #[test]
    fn test_unpack_plain_is_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("feed.xml");
        std::fs::write(&plain, "<tv/>").unwrap();
        assert_eq!(unpack_feed(&plain, dir.path()).unwrap(), plain);
    }
}
