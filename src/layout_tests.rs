//! Tests for timeline layout

use chrono::{DateTime, TimeZone, Utc};

use crate::layout::*;
use crate::models::{Channel, Programme};

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

fn prog(title: &str, start: &str, stop: &str) -> Programme {
    Programme {
        title: title.to_string(),
        start: start.to_string(),
        stop: stop.to_string(),
        ..Default::default()
    }
}

fn channel(id: &str, name: &str, programmes: Vec<Programme>) -> Channel {
    Channel {
        id: id.to_string(),
        name: name.to_string(),
        programmes,
        ..Default::default()
    }
}

fn morning() -> Channel {
    channel(
        "ch1",
        "Channel One",
        vec![
            prog("News", "20250101090000", "20250101100000"),
            prog("Film", "20250101100000", "20250101113000"),
        ],
    )
}

#[test]
fn test_example_geometry() {
    let channels = vec![morning()];
    let layout = compute_layout(&channels, 2, utc(2025, 1, 1, 9, 30), "");

    assert_eq!(layout.axis.start, utc(2025, 1, 1, 8, 0));
    assert_eq!(layout.axis.end, utc(2025, 1, 1, 12, 30));
    assert_eq!(layout.total_width, 540);

    let blocks = &layout.rows[0].blocks;
    assert_eq!((blocks[0].left, blocks[0].width), (120, 120));
    assert_eq!((blocks[1].left, blocks[1].width), (240, 180));
}

#[test]
fn test_doubling_scale_doubles_geometry() {
    let channels = vec![morning()];
    let now = utc(2025, 1, 1, 9, 30);
    let single = compute_layout(&channels, 2, now, "");
    let double = compute_layout(&channels, 4, now, "");

    for (a, b) in single.rows[0].blocks.iter().zip(&double.rows[0].blocks) {
        assert_eq!(a.left * 2, b.left);
        assert_eq!(a.width * 2, b.width);
    }
    assert_eq!(single.total_width * 2, double.total_width);
}

#[test]
fn test_empty_selection_uses_one_hour_from_now() {
    let now = utc(2025, 6, 1, 12, 0);
    let layout = compute_layout(std::iter::empty::<&Channel>(), 2, now, "");

    assert!(layout.is_empty());
    assert_eq!(layout.axis.start, now);
    assert_eq!(layout.axis.end, utc(2025, 6, 1, 13, 0));
    assert_eq!(layout.total_width, 120);
    assert_eq!(layout.now_marker(now), Some(0));
}

#[test]
fn test_unparseable_starts_fall_back_to_default_axis() {
    let now = utc(2025, 6, 1, 12, 0);
    let channels = vec![channel("x", "X", vec![prog("Broken", "garbage", "")])];
    let layout = compute_layout(&channels, 2, now, "");

    assert_eq!(layout.axis.start, now);
    assert_eq!(layout.rows.len(), 1);
    assert!(layout.rows[0].blocks.is_empty());
}

#[test]
fn test_channel_without_programmes_still_has_a_row() {
    let channels = vec![morning(), channel("empty", "Empty", vec![])];
    let layout = compute_layout(&channels, 2, utc(2025, 1, 1, 9, 0), "");

    assert_eq!(layout.rows.len(), 2);
    let empty = layout.rows.iter().find(|r| r.id == "empty").unwrap();
    assert!(empty.blocks.is_empty());
}

#[test]
fn test_missing_stop_defaults_to_thirty_minutes() {
    let channels = vec![channel("c", "C", vec![prog("Open", "20250101090000", "")])];
    let layout = compute_layout(&channels, 2, utc(2025, 1, 1, 9, 0), "");

    let block = &layout.rows[0].blocks[0];
    assert_eq!(block.left, 120);
    assert_eq!(block.width, 60);
    assert_eq!(block.end, utc(2025, 1, 1, 9, 30));
    // 09:30 + 1h padding
    assert_eq!(layout.axis.end, utc(2025, 1, 1, 10, 30));
}

#[test]
fn test_zero_length_programme_keeps_minimum_width() {
    let channels = vec![channel(
        "c",
        "C",
        vec![prog("Blip", "20250101090000", "20250101090000")],
    )];
    let layout = compute_layout(&channels, 1, utc(2025, 1, 1, 9, 0), "");
    assert_eq!(layout.rows[0].blocks[0].width, 1);
}

#[test]
fn test_axis_is_never_shorter_than_an_hour() {
    let channels = vec![channel(
        "c",
        "C",
        vec![prog("Backwards", "20250101090000", "20250101070000")],
    )];
    let axis = Axis::compute(&channels, 2, utc(2025, 1, 1, 9, 0));
    assert!(axis.span_minutes() >= 60.0);
    assert_eq!(axis.end - axis.start, chrono::Duration::minutes(60));
}

#[test]
fn test_rows_sorted_case_insensitively() {
    let channels = vec![
        channel("3", "zulu", vec![]),
        channel("1", "Bravo", vec![]),
        channel("alpha-id", "", vec![]),
        channel("2", "bravo two", vec![]),
    ];
    let layout = compute_layout(&channels, 2, utc(2025, 1, 1, 9, 0), "");
    let names: Vec<&str> = layout.rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["alpha-id", "Bravo", "bravo two", "zulu"]);
}

#[test]
fn test_hour_ticks() {
    let channels = vec![morning()];
    let layout = compute_layout(&channels, 2, utc(2025, 1, 1, 9, 0), "");

    // 08:00 .. 12:00, the 12:30 end is not an hour step
    assert_eq!(layout.ticks.len(), 5);
    assert_eq!(layout.ticks[0].left, 0);
    assert_eq!(layout.ticks[1].left, 120);
    assert!(layout.ticks[0].new_day);
}

#[test]
fn test_ticks_mark_each_new_day() {
    let channels = vec![channel(
        "c",
        "C",
        vec![prog("Marathon", "20250101000000", "20250102000000")],
    )];
    let layout = compute_layout(&channels, 1, utc(2025, 1, 1, 0, 0), "");

    assert_eq!(layout.ticks.len(), 27);
    let day_starts = layout.ticks.iter().filter(|t| t.new_day).count();
    assert!(day_starts >= 2);
}

#[test]
fn test_now_marker() {
    let channels = vec![morning()];
    let layout = compute_layout(&channels, 2, utc(2025, 1, 1, 9, 0), "");

    assert_eq!(layout.now_marker(utc(2025, 1, 1, 9, 15)), Some(150));
    assert_eq!(layout.now_marker(utc(2025, 1, 1, 7, 0)), None);
    assert_eq!(layout.now_marker(utc(2025, 1, 2, 0, 0)), None);
}

#[test]
fn test_scroll_to_now_centers_and_clamps() {
    let channels = vec![morning()];
    let axis = Axis::compute(&channels, 2, utc(2025, 1, 1, 9, 0));

    assert_eq!(axis.scroll_to_now(utc(2025, 1, 1, 11, 0), 200.0), 260.0);
    assert_eq!(axis.scroll_to_now(utc(2025, 1, 1, 8, 10), 800.0), 0.0);
}

#[test]
fn test_color_is_pure_function_of_text() {
    assert_eq!(color_for_text("abc"), 2);
    assert_eq!(color_for_text(""), 0);
    assert_eq!(color_for_text("Journal de 20h"), color_for_text("Journal de 20h"));

    let titled = prog("Météo", "", "");
    let untitled = Programme {
        desc: "Météo".to_string(),
        ..Default::default()
    };
    assert_eq!(color_index(&titled), color_index(&untitled));
    assert!(color_index(&titled) < PALETTE.len());
}

#[test]
fn test_search_marks_matches() {
    let mut ch = morning();
    ch.programmes[1].desc = "A thrilling FILM noir".to_string();
    let channels = vec![ch, channel("other", "Other", vec![prog("Sport", "20250101090000", "20250101100000")])];

    let layout = compute_layout(&channels, 2, utc(2025, 1, 1, 9, 0), "noir");
    let one = layout.rows.iter().find(|r| r.id == "ch1").unwrap();
    assert!(!one.blocks[0].matches_search);
    assert!(one.blocks[1].matches_search);
    assert!(one.has_search_match);

    let other = layout.rows.iter().find(|r| r.id == "other").unwrap();
    assert!(!other.has_search_match);
}

#[test]
fn test_scale_is_clamped() {
    assert_eq!(clamp_scale(0), MIN_PIXELS_PER_MINUTE);
    assert_eq!(clamp_scale(99), MAX_PIXELS_PER_MINUTE);
    assert_eq!(clamp_scale(DEFAULT_PIXELS_PER_MINUTE), 2);
}

#[test]
fn test_category_highlight_narrows_search() {
    let mut ch = morning();
    ch.programmes[0].categories = vec!["News".to_string()];
    ch.programmes[1].categories = vec!["Movies".to_string()];
    let channels = vec![ch, channel("other", "Other", vec![prog("Sport", "20250101090000", "20250101100000")])];

    let mut layout = compute_layout(&channels, 2, utc(2025, 1, 1, 9, 0), "");
    layout.highlight_category("Movies");

    let one = layout.rows.iter().find(|r| r.id == "ch1").unwrap();
    assert!(!one.blocks[0].matches_search);
    assert!(one.blocks[1].matches_search);
    assert!(one.has_search_match);
    let other = layout.rows.iter().find(|r| r.id == "other").unwrap();
    assert!(!other.has_search_match);

    // search and category must both match
    let mut layout = compute_layout(&channels, 2, utc(2025, 1, 1, 9, 0), "news");
    layout.highlight_category("Movies");
    assert!(layout.rows.iter().all(|r| !r.has_search_match));
}
