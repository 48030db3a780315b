//! On-demand loading of channel data
//!
//! The channel index is loaded once. Programme files are fetched only for
//! selected channels that have not been fetched yet, in batches of
//! [`BATCH_SIZE`]. All fetches of a batch run at the same time and the whole
//! batch finishes before the next one starts.

use std::collections::HashSet;
use std::thread;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};

use crate::error::Result;
use crate::models::{ChannelFile, ChannelIndexEntry, Programme, Schedule};
use crate::source::{channel_file_path, fetch_json, DataSource, CHANNEL_INDEX_PATH};

pub const BATCH_SIZE: usize = 50;

/// Programmes starting further ahead than this are dropped
pub const LOOKAHEAD_DAYS: i64 = 3;

/// Programmes of one channel, ready for `Action::AddChannelProgrammes`
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelProgrammes {
    pub channel_id: String,
    pub programmes: Vec<Programme>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub loaded: usize,
    /// Channels whose programme file could not be fetched, in request order
    pub failed: Vec<String>,
}

/// Load `channels.json` into a schedule with empty programme lists
pub fn load_channel_index(source: &dyn DataSource) -> Result<Schedule> {
    let entries: Vec<ChannelIndexEntry> = fetch_json(source, CHANNEL_INDEX_PATH)?;
    info!("Loaded {} channels from {}", entries.len(), source.describe());
    Ok(Schedule::from_index(entries))
}

/// Selected ids that still need fetching, in selection order.
/// `force` refetches everything selected.
pub fn plan_fetch(selected: &[String], loaded: &HashSet<String>, force: bool) -> Vec<String> {
    let mut seen = HashSet::new();
    selected
        .iter()
        .filter(|id| force || !loaded.contains(id.as_str()))
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Drop programmes that already ended or start more than three days from
/// `now`. Programmes with missing or unparseable times are kept.
pub fn filter_programmes(programmes: Vec<Programme>, now: DateTime<Utc>) -> Vec<Programme> {
    let horizon = now + Duration::days(LOOKAHEAD_DAYS);
    programmes
        .into_iter()
        .filter(|p| {
            if p.stop_time().is_some_and(|end| end < now) {
                return false;
            }
            !p.start_time().is_some_and(|start| start > horizon)
        })
        .collect()
}

/// Fetch and filter one channel's programme file
pub fn fetch_channel(
    source: &dyn DataSource,
    channel_id: &str,
    now: DateTime<Utc>,
) -> Result<ChannelProgrammes> {
    let file: ChannelFile = fetch_json(source, &channel_file_path(channel_id))?;
    let total = file.programmes.len();
    let programmes = filter_programmes(file.programmes, now);
    debug!(
        "Channel {}: kept {} of {} programmes",
        channel_id,
        programmes.len(),
        total
    );
    Ok(ChannelProgrammes {
        channel_id: channel_id.to_string(),
        programmes,
    })
}

/// Fetch the given channels batch by batch, handing each successful result
/// to `on_loaded` as soon as its batch completes. Failures are logged and
/// skipped so the channel stays unfetched.
pub fn fetch_channels<F>(
    source: &dyn DataSource,
    channel_ids: &[String],
    now: DateTime<Utc>,
    mut on_loaded: F,
) -> FetchSummary
where
    F: FnMut(ChannelProgrammes),
{
    let mut summary = FetchSummary::default();

    for (batch_no, batch) in channel_ids.chunks(BATCH_SIZE).enumerate() {
        debug!("Fetching batch {} ({} channels)", batch_no + 1, batch.len());

        let results: Vec<(String, Result<ChannelProgrammes>)> = thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|id| {
                    let handle = scope.spawn(move || fetch_channel(source, id, now));
                    (id, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(id, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(crate::error::GuideError::Http(format!(
                            "fetch thread for {} panicked",
                            id
                        )))
                    });
                    (id.clone(), result)
                })
                .collect()
        });

        for (id, result) in results {
            match result {
                Ok(loaded) => {
                    summary.loaded += 1;
                    on_loaded(loaded);
                }
                Err(e) => {
                    warn!("Failed to load programmes for channel {}: {}", id, e);
                    summary.failed.push(id);
                }
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::compute_layout;
    use crate::source::DirSource;
    use chrono::TimeZone;
    use std::fs;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn prog(title: &str, start: &str, stop: &str) -> Programme {
        Programme {
            title: title.to_string(),
            start: start.to_string(),
            stop: stop.to_string(),
            ..Default::default()
        }
    }

    fn write_channel(dir: &std::path::Path, id: &str, programmes: Vec<Programme>) {
        let file = ChannelFile {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            programmes,
            ..Default::default()
        };
        let path = dir.join(channel_file_path(id));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string(&file).unwrap()).unwrap();
    }

    #[test]
    fn test_plan_fetch() {
        let selected: Vec<String> = ["a", "b", "c", "a"].iter().map(|s| s.to_string()).collect();
        let loaded: HashSet<String> = ["b".to_string()].into_iter().collect();

        assert_eq!(plan_fetch(&selected, &loaded, false), vec!["a", "c"]);
        assert_eq!(plan_fetch(&selected, &loaded, true), vec!["a", "b", "c"]);
        assert!(plan_fetch(&[], &loaded, true).is_empty());
    }

    #[test]
    fn test_filter_programmes() {
        let programmes = vec![
            prog("Ended", "20250101090000", "20250101100000"),
            prog("Airing", "20250101113000", "20250101123000"),
            prog("Tomorrow", "20250102120000", "20250102130000"),
            prog("Too far", "20250105120000", "20250105130000"),
            prog("No times", "", ""),
            prog("Bad stop", "20250101090000", "soon"),
        ];
        let kept: Vec<String> = filter_programmes(programmes, now())
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(kept, vec!["Airing", "Tomorrow", "No times", "Bad stop"]);
    }

    #[test]
    fn test_fetch_channels_in_batches() {
        let dir = tempfile::tempdir().unwrap();
        let ids: Vec<String> = (0..BATCH_SIZE + 7).map(|i| format!("ch{}", i)).collect();
        for id in &ids {
            write_channel(
                dir.path(),
                id,
                vec![prog("Live", "20250101113000", "20250101123000")],
            );
        }
        let source = DirSource::new(dir.path());

        let mut loaded = Vec::new();
        let summary = fetch_channels(&source, &ids, now(), |c| loaded.push(c));

        assert_eq!(summary.loaded, ids.len());
        assert!(summary.failed.is_empty());
        let loaded_ids: Vec<String> = loaded.iter().map(|c| c.channel_id.clone()).collect();
        assert_eq!(loaded_ids, ids);
        assert!(loaded.iter().all(|c| c.programmes.len() == 1));
    }

    #[test]
    fn test_missing_channel_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_channel(dir.path(), "ok", vec![]);
        let source = DirSource::new(dir.path());

        let ids = vec!["ok".to_string(), "missing".to_string()];
        let mut loaded = Vec::new();
        let summary = fetch_channels(&source, &ids, now(), |c| loaded.push(c.channel_id));

        assert_eq!(summary, FetchSummary { loaded: 1, failed: vec!["missing".to_string()] });
        assert_eq!(loaded, vec!["ok"]);
    }

    #[test]
    fn test_index_loads_into_sorted_rows() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CHANNEL_INDEX_PATH),
            r#"[
                {"id":"z","displayName":"zeta","icon":"","categories":[]},
                {"id":"a","displayName":"Alpha","icon":"","categories":["News"]},
                {"id":"m","displayName":"","icon":"","categories":[]}
            ]"#,
        )
        .unwrap();

        let schedule = load_channel_index(&DirSource::new(dir.path())).unwrap();
        assert_eq!(schedule.channels.len(), 3);

        let layout = compute_layout(&schedule.channels, 2, now(), "");
        let names: Vec<&str> = layout.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "m", "zeta"]);
    }

    #[test]
    fn test_missing_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_channel_index(&DirSource::new(dir.path())).is_err());
    }
}
