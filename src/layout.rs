//! Timeline layout
//!
//! Turns the selected channels into pixel geometry for the schedule view:
//! one shared time axis, a block per programme, hour ticks for the header
//! and the position of the "now" marker. Everything here is a pure function
//! of its inputs so the view can recompute it whenever anything changes.

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};

use crate::models::{Channel, Programme};
use crate::time::{format_time, minutes_between};

pub const DEFAULT_PIXELS_PER_MINUTE: u32 = 2;
pub const MIN_PIXELS_PER_MINUTE: u32 = 1;
pub const MAX_PIXELS_PER_MINUTE: u32 = 10;

/// Padding on both sides of the programmes, in minutes
const AXIS_PADDING_MINUTES: i64 = 60;
/// Shortest axis ever produced
const MIN_SPAN_MINUTES: i64 = 60;
/// Duration assumed for a programme with no usable stop time
const DEFAULT_DURATION_MINUTES: i64 = 30;
/// Shortest duration a block is drawn with
const MIN_BLOCK_MINUTES: f64 = 1.0;
/// Guards the tick loop against absurd axes
const MAX_TICKS: usize = 1000;

/// Block colours as RGB
pub const PALETTE: [(u8, u8, u8); 8] = [
    (0x8b, 0x5c, 0xf6),
    (0x60, 0xa5, 0xfa),
    (0xf9, 0x73, 0x16),
    (0xef, 0x44, 0x44),
    (0x10, 0xb9, 0x81),
    (0xf5, 0x9e, 0x0b),
    (0xec, 0x48, 0x99),
    (0x06, 0xb6, 0xd4),
];

/// Shared time range and horizontal scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axis {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub pixels_per_minute: u32,
}

/// One hour mark in the header
#[derive(Debug, Clone, PartialEq)]
pub struct HourTick {
    pub time: DateTime<Utc>,
    pub left: i64,
    /// First tick of a new local calendar day (and always the first tick)
    pub new_day: bool,
}

/// A programme placed on the axis
#[derive(Debug, Clone, PartialEq)]
pub struct ProgrammeBlock {
    pub programme: Programme,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub left: i64,
    pub width: i64,
    /// Index into `PALETTE`
    pub color: usize,
    /// "HH:MM — HH:MM" in local time
    pub time_range: String,
    pub matches_search: bool,
}

/// One channel row
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub blocks: Vec<ProgrammeBlock>,
    pub has_search_match: bool,
}

/// Everything the schedule view draws
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineLayout {
    pub axis: Axis,
    pub total_width: u32,
    pub ticks: Vec<HourTick>,
    pub rows: Vec<ChannelRow>,
}

impl Axis {
    /// Axis over all programmes of `channels`. Falls back to one hour from
    /// `now` when no programme has a parseable start.
    pub fn compute<'a, I>(channels: I, pixels_per_minute: u32, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a Channel>,
    {
        let pixels_per_minute = clamp_scale(pixels_per_minute);
        let mut earliest: Option<DateTime<Utc>> = None;
        let mut latest: Option<DateTime<Utc>> = None;

        for prog in channels.into_iter().flat_map(|c| c.programmes.iter()) {
            let start = prog.start_time();
            let end = prog
                .stop_time()
                .or_else(|| start.map(|s| s + Duration::minutes(DEFAULT_DURATION_MINUTES)));
            if let Some(s) = start {
                earliest = Some(earliest.map_or(s, |e| e.min(s)));
            }
            if let Some(e) = end {
                latest = Some(latest.map_or(e, |l| l.max(e)));
            }
        }

        let Some(earliest) = earliest else {
            return Self {
                start: now,
                end: now + Duration::minutes(MIN_SPAN_MINUTES),
                pixels_per_minute,
            };
        };

        let start = earliest - Duration::minutes(AXIS_PADDING_MINUTES);
        let end = latest.unwrap_or(earliest) + Duration::minutes(AXIS_PADDING_MINUTES);
        let end = end.max(start + Duration::minutes(MIN_SPAN_MINUTES));

        Self {
            start,
            end,
            pixels_per_minute,
        }
    }

    pub fn span_minutes(&self) -> f64 {
        minutes_between(self.start, self.end).max(MIN_SPAN_MINUTES as f64)
    }

    pub fn total_width(&self) -> u32 {
        (self.span_minutes() * self.pixels_per_minute as f64).ceil() as u32
    }

    /// Unrounded pixel position of an instant
    pub fn x_of(&self, t: DateTime<Utc>) -> f64 {
        minutes_between(self.start, t) * self.pixels_per_minute as f64
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }

    /// Position of the "now" marker, if now is on the axis
    pub fn now_marker(&self, now: DateTime<Utc>) -> Option<i64> {
        self.contains(now).then(|| self.x_of(now).round() as i64)
    }

    /// Horizontal scroll offset that puts `now` in the middle of a viewport
    pub fn scroll_to_now(&self, now: DateTime<Utc>, viewport_width: f32) -> f32 {
        let left = self.x_of(now).round();
        let target = left - (viewport_width as f64 / 2.0).round();
        target.max(0.0) as f32
    }

    /// Hour marks from start to end inclusive
    pub fn ticks(&self) -> Vec<HourTick> {
        let mut ticks = Vec::new();
        let mut t = self.start;
        let mut previous_day: Option<NaiveDate> = None;

        while t <= self.end && ticks.len() < MAX_TICKS {
            let day = t.with_timezone(&Local).date_naive();
            ticks.push(HourTick {
                time: t,
                left: self.x_of(t).round() as i64,
                new_day: previous_day != Some(day),
            });
            previous_day = Some(day);
            t += Duration::minutes(60);
        }
        ticks
    }

    /// Place one programme. `None` when its start cannot be parsed.
    pub fn place(&self, programme: &Programme) -> Option<ProgrammeBlock> {
        let start = programme.start_time()?;
        let end = programme
            .stop_time()
            .unwrap_or(start + Duration::minutes(DEFAULT_DURATION_MINUTES));

        let duration = minutes_between(start, end).max(MIN_BLOCK_MINUTES);
        let left = self.x_of(start).round() as i64;
        let width = ((duration * self.pixels_per_minute as f64).round() as i64).max(1);

        Some(ProgrammeBlock {
            programme: programme.clone(),
            start,
            end,
            left,
            width,
            color: color_index(programme),
            time_range: format!("{} — {}", format_time(start), format_time(end)),
            matches_search: true,
        })
    }
}

/// Lay out the given channels. Rows are sorted case-insensitively by name,
/// falling back to the id, whatever order the channels arrive in.
/// `search` dims blocks whose title and description do not contain it.
pub fn compute_layout<'a, I>(
    channels: I,
    pixels_per_minute: u32,
    now: DateTime<Utc>,
    search: &str,
) -> TimelineLayout
where
    I: IntoIterator<Item = &'a Channel>,
{
    let mut channels: Vec<&Channel> = channels.into_iter().collect();
    channels.sort_by_cached_key(|c| (c.label().to_lowercase(), c.id.clone()));

    let axis = Axis::compute(channels.iter().copied(), pixels_per_minute, now);
    let needle = search.trim().to_lowercase();

    let rows = channels
        .into_iter()
        .map(|channel| {
            let blocks: Vec<ProgrammeBlock> = channel
                .programmes
                .iter()
                .filter_map(|p| axis.place(p))
                .map(|mut block| {
                    block.matches_search = matches_search(&block.programme, &needle);
                    block
                })
                .collect();
            let has_search_match = needle.is_empty() || blocks.iter().any(|b| b.matches_search);
            ChannelRow {
                id: channel.id.clone(),
                name: channel.label().to_string(),
                icon: channel.icon.clone(),
                blocks,
                has_search_match,
            }
        })
        .collect();

    TimelineLayout {
        axis,
        total_width: axis.total_width(),
        ticks: axis.ticks(),
        rows,
    }
}

impl TimelineLayout {
    pub fn now_marker(&self, now: DateTime<Utc>) -> Option<i64> {
        self.axis.now_marker(now)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Narrow the highlighted blocks to those carrying `category`, on top
    /// of the search. Rows left without a match are dimmed too.
    pub fn highlight_category(&mut self, category: &str) {
        for row in &mut self.rows {
            for block in &mut row.blocks {
                block.matches_search &= block.programme.categories.iter().any(|c| c == category);
            }
            row.has_search_match = row.blocks.iter().any(|b| b.matches_search);
        }
    }
}

/// Keep a scale value inside the slider range
pub fn clamp_scale(pixels_per_minute: u32) -> u32 {
    pixels_per_minute.clamp(MIN_PIXELS_PER_MINUTE, MAX_PIXELS_PER_MINUTE)
}

/// Palette index for a programme, hashed from its title (or description
/// when the title is empty). Same text, same colour, every run.
pub fn color_index(programme: &Programme) -> usize {
    let key = if programme.title.is_empty() {
        programme.desc.as_str()
    } else {
        programme.title.as_str()
    };
    color_for_text(key)
}

pub fn color_for_text(text: &str) -> usize {
    let mut hash: i32 = 0;
    for unit in text.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(unit as i32);
    }
    (hash.unsigned_abs() as usize) % PALETTE.len()
}

fn matches_search(programme: &Programme, needle: &str) -> bool {
    needle.is_empty()
        || programme.title.to_lowercase().contains(needle)
        || programme.desc.to_lowercase().contains(needle)
}

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;
