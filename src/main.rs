//! tvguide - TV schedule timeline
//! Desktop viewer for the JSON files produced by xmltv-to-json

// Hide console window on Windows release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use argparse::{ArgumentParser, Store, StoreOption};
use chrono::{DateTime, Local, Timelike, Utc};
use eframe::egui;
use env_logger::Env;
use log::{error, info, warn};
use std::collections::HashSet;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tvguide::config::AppConfig;
use tvguide::epg::format_episode;
use tvguide::fetch::{self, ChannelProgrammes, FetchSummary};
use tvguide::layout::{
    clamp_scale, compute_layout, ProgrammeBlock, TimelineLayout, MAX_PIXELS_PER_MINUTE,
    MIN_PIXELS_PER_MINUTE, PALETTE,
};
use tvguide::models::Schedule;
use tvguide::selection::SelectionStore;
use tvguide::source::{open_source, DataSource};
use tvguide::store::{Action, StoreState};
use tvguide::time::{format_day, format_time};

const LABEL_WIDTH: f32 = 180.0;
const ROW_HEIGHT: f32 = 44.0;
const HEADER_HEIGHT: f32 = 36.0;
/// Room for the body's scroll bars so the header and labels can scroll as far
const SCROLLBAR_ALLOWANCE: f32 = 20.0;
const CONSOLE_LINES: usize = 500;

const NOW_COLOR: egui::Color32 = egui::Color32::from_rgb(0xef, 0x44, 0x44);

/// Get current local time as HH:MM:SS
fn timestamp_now() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Application icon: three programme bars on a dark rounded square
fn load_icon() -> egui::IconData {
    let size: usize = 64;
    let mut rgba = vec![0u8; size * size * 4];

    // (row top, row bottom, bar start, bar end, palette index)
    let bars = [
        (0.20, 0.34, 0.12, 0.55, 0),
        (0.20, 0.34, 0.58, 0.88, 1),
        (0.43, 0.57, 0.12, 0.35, 4),
        (0.43, 0.57, 0.38, 0.88, 2),
        (0.66, 0.80, 0.12, 0.70, 6),
    ];

    for y in 0..size {
        for x in 0..size {
            let idx = (y * size + x) * 4;
            let nx = x as f32 / size as f32;
            let ny = y as f32 / size as f32;

            let corner_radius = 0.125;
            let in_rounded_rect = {
                let dx = if nx < corner_radius {
                    corner_radius - nx
                } else if nx > 1.0 - corner_radius {
                    nx - (1.0 - corner_radius)
                } else {
                    0.0
                };
                let dy = if ny < corner_radius {
                    corner_radius - ny
                } else if ny > 1.0 - corner_radius {
                    ny - (1.0 - corner_radius)
                } else {
                    0.0
                };
                dx * dx + dy * dy <= corner_radius * corner_radius
            };
            if !in_rounded_rect {
                continue;
            }

            let bar = bars.iter().find(|(top, bottom, left, right, _)| {
                ny >= *top && ny <= *bottom && nx >= *left && nx <= *right
            });

            // Now marker at 62%
            let (r, g, b) = if (nx - 0.62).abs() < 0.015 && ny > 0.12 && ny < 0.88 {
                (0xef, 0x44, 0x44)
            } else if let Some((_, _, _, _, color)) = bar {
                PALETTE[*color]
            } else {
                (26, 26, 46)
            };
            rgba[idx] = r;
            rgba[idx + 1] = g;
            rgba[idx + 2] = b;
            rgba[idx + 3] = 255;
        }
    }

    egui::IconData {
        rgba,
        width: size as u32,
        height: size as u32,
    }
}

/// Add a system emoji font so channel names with symbols render
fn load_fonts(ctx: &egui::Context) {
    let mut fonts = egui::FontDefinitions::default();

    #[cfg(target_os = "windows")]
    let candidates: &[&str] = &["C:\\Windows\\Fonts\\seguiemj.ttf"];
    #[cfg(target_os = "linux")]
    let candidates: &[&str] = &[
        "/usr/share/fonts/truetype/noto/NotoColorEmoji.ttf",
        "/usr/share/fonts/noto-emoji/NotoColorEmoji.ttf",
        "/usr/share/fonts/google-noto-emoji/NotoColorEmoji.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    ];
    #[cfg(target_os = "macos")]
    let candidates: &[&str] = &["/System/Library/Fonts/Apple Color Emoji.ttc"];
    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    let candidates: &[&str] = &[];

    for path in candidates {
        if let Ok(font_data) = std::fs::read(path) {
            fonts.font_data.insert(
                "emoji".to_owned(),
                egui::FontData::from_owned(font_data).into(),
            );
            fonts
                .families
                .entry(egui::FontFamily::Proportional)
                .or_default()
                .push("emoji".to_owned());
            break;
        }
    }

    ctx.set_fonts(fonts);
}

struct CliArgs {
    source: Option<String>,
    log_level: String,
}

fn parse_cli() -> CliArgs {
    let mut args = CliArgs {
        source: None,
        log_level: "info".into(),
    };
    {
        let mut ap = ArgumentParser::new();
        ap.set_description("TV schedule timeline");
        ap.refer(&mut args.source).add_argument(
            "source",
            StoreOption,
            "Data URL or directory containing channels.json",
        );
        ap.refer(&mut args.log_level)
            .add_option(&["--log"], Store, "Log level (info|debug|trace|warn|error)");
        ap.parse_args_or_exit();
    }
    args
}

fn main() -> Result<(), eframe::Error> {
    let args = parse_cli();
    env_logger::Builder::from_env(Env::default().filter_or("RUST_LOG", args.log_level.as_str()))
        .init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1250.0, 700.0])
            .with_min_inner_size([800.0, 450.0])
            .with_icon(load_icon()),
        vsync: true,
        hardware_acceleration: eframe::HardwareAcceleration::Preferred,
        ..Default::default()
    };

    eframe::run_native(
        "my tv guide",
        options,
        Box::new(move |cc| {
            load_fonts(&cc.egui_ctx);
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Ok(Box::new(GuideApp::new(args.source)))
        }),
    )
}

/// Background task messages, tagged with the data source generation they
/// were started for
enum TaskResult {
    ChannelsLoaded { generation: u64, schedule: Schedule },
    ChannelsFailed { generation: u64, message: String },
    ProgrammesLoaded { generation: u64, loaded: ChannelProgrammes },
    FetchDone { generation: u64, summary: FetchSummary },
}

/// Programme shown in the details window
struct OpenProgramme {
    channel: String,
    block: ProgrammeBlock,
}

struct GuideApp {
    config: AppConfig,
    store: StoreState,
    selection: SelectionStore,
    source: Arc<dyn DataSource>,
    /// Bumped whenever the data source changes; stale results are dropped
    generation: u64,

    task_receiver: Receiver<TaskResult>,
    task_sender: Sender<TaskResult>,

    // Data source field in the top bar
    source_input: String,

    // Selection view
    editing: bool,
    temp_selected: Vec<String>,
    category_filter: HashSet<String>,
    channel_filter: String,

    // Schedule view
    search: String,
    layout: Option<TimelineLayout>,
    layout_dirty: bool,
    now_minute: DateTime<Utc>,
    scroll_offset: egui::Vec2,
    viewport_width: f32,
    pending_scroll_x: Option<f32>,
    scroll_to_now_pending: bool,
    /// Programme category highlighted in the timeline
    highlight_category: Option<String>,
    fetching: bool,
    /// Selected channels whose last fetch failed
    failed_channel_ids: HashSet<String>,
    /// Force flag of a fetch requested while another was running
    refetch_pending: Option<bool>,
    open_programme: Option<OpenProgramme>,

    // Status / console
    status_message: String,
    console_log: Vec<String>,
    show_console: bool,
}

impl GuideApp {
    fn new(source_override: Option<String>) -> Self {
        let (task_sender, task_receiver) = channel();
        let mut config = AppConfig::load();
        if let Some(location) = source_override {
            config.data_source = location;
        }

        let selection = SelectionStore::new();
        let mut store = StoreState::new();
        store.dispatch(Action::SetSelectedChannels(selection.load()));

        let source: Arc<dyn DataSource> = Arc::from(open_source(&config.data_source));
        let now = Utc::now();

        let mut app = Self {
            source_input: config.data_source.clone(),
            scroll_to_now_pending: config.scroll_to_now_on_load,
            config,
            store,
            selection,
            source,
            generation: 0,
            task_receiver,
            task_sender,
            editing: false,
            temp_selected: Vec::new(),
            category_filter: HashSet::new(),
            channel_filter: String::new(),
            search: String::new(),
            layout: None,
            layout_dirty: true,
            now_minute: truncate_to_minute(now),
            scroll_offset: egui::Vec2::ZERO,
            viewport_width: 800.0,
            pending_scroll_x: None,
            highlight_category: None,
            fetching: false,
            failed_channel_ids: HashSet::new(),
            refetch_pending: None,
            open_programme: None,
            status_message: String::new(),
            console_log: Vec::new(),
            show_console: false,
        };

        app.log(&format!(
            "[INFO] {} channels selected, data source: {}",
            app.store.selected_ids().len(),
            app.source.describe()
        ));
        app.load_channels();
        app
    }

    fn log(&mut self, message: &str) {
        let timestamp = timestamp_now();
        self.console_log.push(format!("[{}] {}", timestamp, message));
        // Keep last 500 lines
        if self.console_log.len() > CONSOLE_LINES {
            self.console_log.remove(0);
        }
    }

    /// Apply an action and write the selection file when it changed
    fn dispatch(&mut self, action: Action) {
        if self.store.dispatch(action) {
            if let Err(e) = self.selection.save(self.store.selected_ids()) {
                let msg = format!(
                    "Failed to save selection to {}: {}",
                    self.selection.path().display(),
                    e
                );
                warn!("{}", msg);
                self.log(&format!("[WARN] {}", msg));
            }
        }
        self.layout_dirty = true;
    }

    fn load_channels(&mut self) {
        self.dispatch(Action::SetLoading(true));
        self.status_message = format!("Loading channels from {}...", self.source.describe());

        let source = Arc::clone(&self.source);
        let sender = self.task_sender.clone();
        let generation = self.generation;
        thread::spawn(move || {
            let result = match fetch::load_channel_index(source.as_ref()) {
                Ok(schedule) => TaskResult::ChannelsLoaded { generation, schedule },
                Err(e) => TaskResult::ChannelsFailed {
                    generation,
                    message: format!("Failed to load channels from {}: {}", source.describe(), e),
                },
            };
            let _ = sender.send(result);
        });
    }

    /// Fetch programme files for selected channels not loaded yet
    /// (or all selected channels when `force`)
    fn fetch_programmes(&mut self, force: bool) {
        if !self.store.channels_loaded {
            return;
        }
        if self.fetching {
            self.refetch_pending = Some(self.refetch_pending.unwrap_or(false) || force);
            return;
        }

        let ids = fetch::plan_fetch(self.store.selected_ids(), &self.store.loaded_channel_ids, force);
        if ids.is_empty() {
            return;
        }

        self.fetching = true;
        self.status_message = format!("Loading programmes for {} channels...", ids.len());
        self.log(&format!("[INFO] Fetching programmes for {} channels", ids.len()));

        let source = Arc::clone(&self.source);
        let sender = self.task_sender.clone();
        let generation = self.generation;
        thread::spawn(move || {
            let summary = fetch::fetch_channels(source.as_ref(), &ids, Utc::now(), |loaded| {
                let _ = sender.send(TaskResult::ProgrammesLoaded { generation, loaded });
            });
            let _ = sender.send(TaskResult::FetchDone { generation, summary });
        });
    }

    /// Point the client at another URL or directory and reload everything
    fn switch_source(&mut self, location: &str) {
        let location = location.trim();
        if location.is_empty() {
            return;
        }

        self.config.data_source = location.to_string();
        self.config.save();
        self.source = Arc::from(open_source(location));
        self.generation += 1;
        self.fetching = false;
        self.failed_channel_ids.clear();
        self.refetch_pending = None;
        self.open_programme = None;
        self.highlight_category = None;

        let selected = self.store.selected_ids().to_vec();
        self.store = StoreState::new();
        self.store.dispatch(Action::SetSelectedChannels(selected));
        self.layout = None;
        self.layout_dirty = true;
        self.scroll_to_now_pending = self.config.scroll_to_now_on_load;

        self.log(&format!("[INFO] Switched data source to {}", location));
        self.load_channels();
    }

    fn process_tasks(&mut self) {
        while let Ok(result) = self.task_receiver.try_recv() {
            match result {
                TaskResult::ChannelsLoaded { generation, schedule } if generation == self.generation => {
                    let count = schedule.channels.len();
                    self.log(&format!("[INFO] Loaded {} channels", count));
                    self.status_message = format!("Loaded {} channels", count);
                    self.dispatch(Action::SetSchedule(schedule));
                    self.fetch_programmes(false);
                }
                TaskResult::ChannelsFailed { generation, message } if generation == self.generation => {
                    error!("{}", message);
                    self.log(&format!("[ERROR] {}", message));
                    self.status_message = "Failed to load channels".to_string();
                    self.dispatch(Action::SetError(Some(message)));
                }
                TaskResult::ProgrammesLoaded { generation, loaded } if generation == self.generation => {
                    self.failed_channel_ids.remove(&loaded.channel_id);
                    self.dispatch(Action::AddChannelProgrammes {
                        channel_id: loaded.channel_id,
                        programmes: loaded.programmes,
                    });
                }
                TaskResult::FetchDone { generation, summary } if generation == self.generation => {
                    self.fetching = false;
                    let msg = if !summary.failed.is_empty() {
                        format!(
                            "Loaded programmes for {} channels, {} failed",
                            summary.loaded,
                            summary.failed.len()
                        )
                    } else {
                        format!("Loaded programmes for {} channels", summary.loaded)
                    };
                    info!("{}", msg);
                    let level = if summary.failed.is_empty() { "[INFO]" } else { "[WARN]" };
                    self.log(&format!("{} {}", level, msg));
                    self.status_message = msg;
                    if !summary.failed.is_empty() {
                        self.layout_dirty = true;
                    }
                    self.failed_channel_ids.extend(summary.failed);

                    if let Some(force) = self.refetch_pending.take() {
                        self.fetch_programmes(force);
                    }
                }
                _ => {}
            }
        }
    }

    fn ensure_layout(&mut self) {
        if self.layout.is_some() && !self.layout_dirty {
            return;
        }
        let mut layout = compute_layout(
            self.store.selected_channels(),
            self.config.pixels_per_minute,
            self.now_minute,
            &self.search,
        );
        if let Some(category) = &self.highlight_category {
            layout.highlight_category(category);
        }
        self.layout = Some(layout);
        self.layout_dirty = false;
    }

    fn showing_schedule(&self) -> bool {
        !self.editing && !self.store.selected_ids().is_empty()
    }

    fn start_editing(&mut self) {
        self.temp_selected = self.store.selected_ids().to_vec();
        self.editing = true;
    }

    fn apply_selection(&mut self) {
        let ids = std::mem::take(&mut self.temp_selected);
        self.log(&format!("[INFO] Showing {} channels", ids.len()));
        self.dispatch(Action::SetSelectedChannels(ids));
        self.editing = false;
        self.fetch_programmes(false);
    }

    fn show_top_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.add_space(5.0);
            ui.horizontal(|ui| {
                ui.heading("📺 my tv guide");
                ui.separator();

                ui.label("Data:");
                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.source_input)
                        .hint_text("https://... or a folder")
                        .desired_width(280.0),
                );
                let submitted =
                    response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

                if ui.button("📁").on_hover_text("Pick a folder with channels.json").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .set_title("Select data folder")
                        .pick_folder()
                    {
                        self.source_input = path.display().to_string();
                        let location = self.source_input.clone();
                        self.switch_source(&location);
                    }
                }
                if ui.button("⟳ Load").clicked() || submitted {
                    let location = self.source_input.clone();
                    self.switch_source(&location);
                }

                ui.separator();

                if ui.checkbox(&mut self.config.dark_mode, "🌙 Dark").changed() {
                    self.config.save();
                }
                if ui.button("🖥 Console").clicked() {
                    self.show_console = !self.show_console;
                }
            });
            ui.add_space(5.0);
        });
    }

    fn show_bottom_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("bottom_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if self.store.loading || self.fetching {
                    ui.spinner();
                }
                ui.label(&self.status_message);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(
                        egui::RichText::new(format!(
                            "{} channels • {} selected • {} loaded",
                            self.store.schedule.channels.len(),
                            self.store.selected_ids().len(),
                            self.store.loaded_channel_ids.len()
                        ))
                        .weak(),
                    );
                });
            });
        });
    }

    fn show_error(&mut self, ui: &mut egui::Ui, message: &str) {
        ui.vertical_centered(|ui| {
            ui.add_space(100.0);
            ui.label(
                egui::RichText::new(message).color(egui::Color32::from_rgb(200, 80, 80)),
            );
            ui.add_space(10.0);
            if ui.button("⟳ Retry").clicked() {
                self.load_channels();
            }
        });
    }

    fn show_selection_view(&mut self, ui: &mut egui::Ui) {
        let has_saved_selection = !self.store.selected_ids().is_empty();

        ui.horizontal(|ui| {
            ui.heading("Select channels");
            ui.label(
                egui::RichText::new(format!("{} selected", self.temp_selected.len())).weak(),
            );
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let done = ui.add_enabled(
                    !self.temp_selected.is_empty(),
                    egui::Button::new("Show schedule ▶"),
                );
                if done.clicked() {
                    self.apply_selection();
                }
                if has_saved_selection && ui.button("Cancel").clicked() {
                    self.editing = false;
                    self.temp_selected.clear();
                }
                if ui.button("Clear").clicked() {
                    self.temp_selected.clear();
                }
            });
        });

        // Category filter chips
        let categories: Vec<String> = self
            .store
            .channel_categories()
            .into_iter()
            .map(str::to_string)
            .collect();
        if !categories.is_empty() {
            ui.horizontal_wrapped(|ui| {
                for cat in &categories {
                    let active = self.category_filter.contains(cat);
                    if ui.add(egui::Button::new(cat.as_str()).selected(active)).clicked() {
                        if active {
                            self.category_filter.remove(cat);
                        } else {
                            self.category_filter.insert(cat.clone());
                        }
                    }
                }
            });
        }

        ui.horizontal(|ui| {
            ui.add(
                egui::TextEdit::singleline(&mut self.channel_filter)
                    .hint_text("Filter channels")
                    .desired_width(220.0),
            );
            ui.label(
                egui::RichText::new("Select channels (use categories above to filter).").weak(),
            );
        });
        ui.separator();

        let needle = self.channel_filter.trim().to_lowercase();
        let mut channels: Vec<(String, String, String, Option<String>)> = self
            .store
            .schedule
            .channels
            .iter()
            .filter(|c| {
                self.category_filter.is_empty()
                    || c.categories.iter().any(|cat| self.category_filter.contains(cat))
            })
            .filter(|c| needle.is_empty() || c.label().to_lowercase().contains(&needle))
            .map(|c| {
                (
                    c.id.clone(),
                    c.label().to_string(),
                    c.categories.join(", "),
                    c.icon.clone(),
                )
            })
            .collect();
        channels.sort_by_cached_key(|(id, name, _, _)| (name.to_lowercase(), id.clone()));

        let mut toggled: Option<String> = None;
        let mut add_now: Option<String> = None;
        egui::ScrollArea::vertical()
            .id_salt("selection_scroll")
            .auto_shrink([false, false])
            .show(ui, |ui| {
                ui.horizontal_wrapped(|ui| {
                    for (id, name, categories, icon) in &channels {
                        let selected = self.temp_selected.contains(id);
                        let text = if categories.is_empty() {
                            egui::RichText::new(name).strong()
                        } else {
                            egui::RichText::new(format!("{}\n{}", name, categories))
                        };
                        let button = egui::Button::new(text)
                            .selected(selected)
                            .min_size(egui::vec2(200.0, 44.0));
                        let hover = match icon {
                            Some(icon) => format!("{}\n{}", id, icon),
                            None => id.clone(),
                        };
                        let response = ui.add(button).on_hover_text(hover);
                        if response.clicked() {
                            toggled = Some(id.clone());
                        }
                        if has_saved_selection && !self.store.is_selected(id) {
                            response.context_menu(|ui| {
                                if ui.button("Add to schedule now").clicked() {
                                    add_now = Some(id.clone());
                                }
                            });
                        }
                    }
                });
                if channels.is_empty() {
                    ui.label("No channels match the current filter");
                }
            });

        if let Some(id) = add_now {
            if !self.temp_selected.contains(&id) {
                self.temp_selected.push(id.clone());
            }
            self.log(&format!("[INFO] Added {} to the schedule", id));
            self.dispatch(Action::AddSelectedChannel(id));
            self.fetch_programmes(false);
        } else if let Some(id) = toggled {
            if let Some(pos) = self.temp_selected.iter().position(|s| *s == id) {
                self.temp_selected.remove(pos);
            } else {
                self.temp_selected.push(id);
            }
        }
    }

    fn show_toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let search = ui.add(
                egui::TextEdit::singleline(&mut self.search)
                    .hint_text("Search")
                    .desired_width(200.0),
            );
            if search.changed() {
                self.layout_dirty = true;
            }

            let old_scale = self.config.pixels_per_minute;
            let slider = ui.add(
                egui::Slider::new(
                    &mut self.config.pixels_per_minute,
                    MIN_PIXELS_PER_MINUTE..=MAX_PIXELS_PER_MINUTE,
                )
                .text("px/min"),
            );
            if slider.changed() {
                self.config.pixels_per_minute = clamp_scale(self.config.pixels_per_minute);
                self.rescale_scroll(old_scale, self.config.pixels_per_minute);
                self.layout_dirty = true;
            }
            if slider.drag_stopped() || (slider.changed() && !slider.dragged()) {
                self.config.save();
            }

            let mut category_changed = false;
            egui::ComboBox::from_id_salt("highlight_category")
                .selected_text(self.highlight_category.as_deref().unwrap_or("All categories"))
                .show_ui(ui, |ui| {
                    category_changed |= ui
                        .selectable_value(&mut self.highlight_category, None, "All categories")
                        .changed();
                    for category in &self.store.all_categories {
                        category_changed |= ui
                            .selectable_value(
                                &mut self.highlight_category,
                                Some(category.clone()),
                                category.as_str(),
                            )
                            .changed();
                    }
                });
            if category_changed {
                self.layout_dirty = true;
            }

            if ui.button("Now").clicked() {
                if let Some(layout) = &self.layout {
                    self.pending_scroll_x =
                        Some(layout.axis.scroll_to_now(Utc::now(), self.viewport_width));
                }
            }
            if ui.button("Change selection").clicked() {
                self.start_editing();
            }
            if ui.button("Clear schedule").clicked() {
                self.log("[INFO] Cleared channel selection");
                self.dispatch(Action::ClearSelectedChannels);
            }
            if ui
                .add_enabled(!self.fetching, egui::Button::new("⟳ Refresh"))
                .on_hover_text("Fetch programmes again for all selected channels")
                .clicked()
            {
                self.log("[INFO] Refreshing programmes");
                self.fetch_programmes(true);
            }
        });
    }

    /// Keep the time at the middle of the viewport in place when the scale changes
    fn rescale_scroll(&mut self, old_scale: u32, new_scale: u32) {
        if old_scale == 0 || old_scale == new_scale {
            return;
        }
        let half = self.viewport_width / 2.0;
        let center = (self.scroll_offset.x + half) * new_scale as f32 / old_scale as f32;
        self.pending_scroll_x = Some((center - half).max(0.0));
    }

    fn show_schedule_view(&mut self, ui: &mut egui::Ui) {
        self.show_toolbar(ui);
        ui.separator();

        self.ensure_layout();
        if self.scroll_to_now_pending && !self.store.loaded_channel_ids.is_empty() {
            self.scroll_to_now_pending = false;
            if let Some(layout) = &self.layout {
                self.pending_scroll_x =
                    Some(layout.axis.scroll_to_now(Utc::now(), self.viewport_width));
            }
        }

        let Some(layout) = self.layout.as_ref() else {
            return;
        };
        if layout.is_empty() {
            ui.label("None of the selected channels are in the channel list.");
            return;
        }

        let offset = self.scroll_offset;
        let pending = self.pending_scroll_x.take();
        let now_x = layout.now_marker(self.now_minute);
        let loaded = &self.store.loaded_channel_ids;
        let failed = &self.failed_channel_ids;
        let font_size = self.config.font_size.clamp(10, 20) as f32;

        let mut clicked: Option<(usize, usize)> = None;
        let mut removed: Option<String> = None;
        let mut body_offset = offset;
        let mut viewport_width = self.viewport_width;

        // Time header, scrolled horizontally with the body
        ui.horizontal(|ui| {
            ui.spacing_mut().item_spacing.x = 0.0;
            ui.allocate_exact_size(egui::vec2(LABEL_WIDTH, HEADER_HEIGHT), egui::Sense::hover());
            egui::ScrollArea::horizontal()
                .id_salt("timeline_header")
                .horizontal_scroll_offset(offset.x)
                .scroll_bar_visibility(egui::scroll_area::ScrollBarVisibility::AlwaysHidden)
                .enable_scrolling(false)
                .auto_shrink([false, true])
                .show(ui, |ui| paint_header(ui, layout, now_x));
        });

        let body_height = ui.available_height();
        ui.horizontal_top(|ui| {
            ui.spacing_mut().item_spacing.x = 0.0;

            // Channel labels, scrolled vertically with the body
            let labels = egui::ScrollArea::vertical()
                .id_salt("timeline_labels")
                .vertical_scroll_offset(offset.y)
                .scroll_bar_visibility(egui::scroll_area::ScrollBarVisibility::AlwaysHidden)
                .enable_scrolling(false)
                .max_width(LABEL_WIDTH)
                .max_height(body_height)
                .auto_shrink([true, false])
                .show(ui, |ui| paint_labels(ui, layout, loaded, failed, font_size));
            removed = labels.inner;

            let mut area = egui::ScrollArea::both()
                .id_salt("timeline_body")
                .auto_shrink([false, false]);
            if let Some(x) = pending {
                area = area.horizontal_scroll_offset(x);
            }
            let output = area.show(ui, |ui| paint_body(ui, layout, now_x, font_size));
            clicked = output.inner;
            body_offset = output.state.offset;
            viewport_width = output.inner_rect.width();
        });

        if let Some((row, block)) = clicked {
            if let Some(row) = layout.rows.get(row) {
                if let Some(block) = row.blocks.get(block) {
                    self.open_programme = Some(OpenProgramme {
                        channel: row.name.clone(),
                        block: block.clone(),
                    });
                }
            }
        }

        if let Some(id) = removed {
            self.log(&format!("[INFO] Removed {} from the schedule", id));
            self.dispatch(Action::RemoveSelectedChannel(id));
        }

        if body_offset != self.scroll_offset {
            self.scroll_offset = body_offset;
            ui.ctx().request_repaint();
        }
        self.viewport_width = viewport_width;
    }

    fn show_programme_window(&mut self, ctx: &egui::Context) {
        let Some(open) = &self.open_programme else {
            return;
        };

        let mut window_open = true;
        let mut close_clicked = false;
        let prog = &open.block.programme;

        egui::Window::new(egui::RichText::new(&open.channel).strong())
            .id(egui::Id::new("programme_details"))
            .collapsible(false)
            .resizable(false)
            .default_width(420.0)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .open(&mut window_open)
            .show(ctx, |ui| {
                ui.heading(&prog.title);
                if let Some(sub) = prog.subtitle() {
                    ui.label(egui::RichText::new(sub).italics());
                }
                ui.label(
                    egui::RichText::new(format!(
                        "{} · {}",
                        format_day(open.block.start),
                        open.block.time_range
                    ))
                    .weak(),
                );
                if let Some(ep) = prog.episode() {
                    let formatted = format_episode(ep);
                    if !formatted.is_empty() {
                        ui.label(egui::RichText::new(format!("Episode: {}", formatted)).small());
                    }
                }
                if let Some(icon) = prog.icon_url() {
                    ui.hyperlink_to("Programme image", icon);
                }
                if !prog.categories.is_empty() {
                    ui.label(
                        egui::RichText::new(prog.categories.join(", "))
                            .small()
                            .weak(),
                    );
                }
                ui.separator();
                egui::ScrollArea::vertical()
                    .max_height(260.0)
                    .show(ui, |ui| match prog.description() {
                        Some(desc) => ui.label(desc),
                        None => ui.label(egui::RichText::new("No description available.").weak()),
                    });
                ui.add_space(6.0);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Close").clicked() {
                        close_clicked = true;
                    }
                });
            });

        if !window_open || close_clicked || ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.open_programme = None;
        }
    }

    fn show_console_window(&mut self, ctx: &egui::Context) {
        if !self.show_console {
            return;
        }
        let mut open = true;
        let mut clear = false;
        egui::Window::new("🖥 Console Log")
            .default_size([600.0, 300.0])
            .open(&mut open)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    if ui.button("🗑 Clear").clicked() {
                        clear = true;
                    }
                });
                ui.separator();
                egui::ScrollArea::vertical()
                    .auto_shrink([false, false])
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        for line in &self.console_log {
                            let color = if line.contains("[ERROR]") {
                                egui::Color32::RED
                            } else if line.contains("[WARN]") {
                                egui::Color32::YELLOW
                            } else if line.contains("[INFO]") {
                                egui::Color32::LIGHT_BLUE
                            } else {
                                egui::Color32::GRAY
                            };
                            ui.label(egui::RichText::new(line).monospace().color(color));
                        }
                    });
            });
        if clear {
            self.console_log.clear();
            self.log("Console cleared");
        }
        self.show_console = open;
    }
}

impl eframe::App for GuideApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Process background task results (non-blocking)
        self.process_tasks();

        let now = Utc::now();
        let minute = truncate_to_minute(now);
        if minute != self.now_minute {
            self.now_minute = minute;
            self.layout_dirty = true;
        }

        // Apply theme
        if self.config.dark_mode {
            ctx.set_visuals(egui::Visuals::dark());
        } else {
            ctx.set_visuals(egui::Visuals::light());
        }

        self.show_top_panel(ctx);
        self.show_bottom_panel(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(message) = self.store.error.clone() {
                self.show_error(ui, &message);
            } else if !self.store.channels_loaded {
                ui.vertical_centered(|ui| {
                    ui.add_space(100.0);
                    ui.spinner();
                    ui.label("Loading channels...");
                });
            } else if self.showing_schedule() {
                self.show_schedule_view(ui);
            } else {
                if !self.editing {
                    self.start_editing();
                }
                self.show_selection_view(ui);
            }
        });

        self.show_programme_window(ctx);
        self.show_console_window(ctx);

        // Poll while background work is running, otherwise wake for the next minute
        if self.store.loading || self.fetching {
            ctx.request_repaint_after(Duration::from_millis(100));
        } else if self.showing_schedule() {
            let into_minute = now.second() as u64 * 1000 + now.timestamp_subsec_millis() as u64;
            let wait = 60_000u64.saturating_sub(into_minute).max(1);
            ctx.request_repaint_after(Duration::from_millis(wait));
        }
    }
}

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

fn block_color(block: &ProgrammeBlock) -> egui::Color32 {
    let (r, g, b) = PALETTE[block.color % PALETTE.len()];
    let color = egui::Color32::from_rgb(r, g, b);
    if block.matches_search {
        color
    } else {
        color.gamma_multiply(0.25)
    }
}

fn paint_header(ui: &mut egui::Ui, layout: &TimelineLayout, now_x: Option<i64>) {
    let width = layout.total_width as f32 + SCROLLBAR_ALLOWANCE;
    let (rect, _) = ui.allocate_exact_size(egui::vec2(width, HEADER_HEIGHT), egui::Sense::hover());
    let painter = ui.painter_at(rect);
    let visuals = ui.visuals();
    let text_color = visuals.text_color();
    let weak = visuals.weak_text_color();
    let line = visuals.widgets.noninteractive.bg_stroke.color;

    for tick in &layout.ticks {
        let x = rect.left() + tick.left as f32;
        if tick.new_day {
            painter.line_segment(
                [egui::pos2(x, rect.top()), egui::pos2(x, rect.bottom())],
                egui::Stroke::new(1.5, text_color),
            );
            painter.text(
                egui::pos2(x + 4.0, rect.top() + 2.0),
                egui::Align2::LEFT_TOP,
                format_day(tick.time),
                egui::FontId::proportional(12.0),
                text_color,
            );
        } else {
            painter.line_segment(
                [egui::pos2(x, rect.bottom() - 10.0), egui::pos2(x, rect.bottom())],
                egui::Stroke::new(1.0, line),
            );
        }
        painter.text(
            egui::pos2(x + 4.0, rect.bottom() - 2.0),
            egui::Align2::LEFT_BOTTOM,
            format_time(tick.time),
            egui::FontId::proportional(12.0),
            weak,
        );
    }

    if let Some(x) = now_x {
        let x = rect.left() + x as f32;
        painter.line_segment(
            [egui::pos2(x, rect.top()), egui::pos2(x, rect.bottom())],
            egui::Stroke::new(2.0, NOW_COLOR),
        );
    }
}

fn paint_labels(
    ui: &mut egui::Ui,
    layout: &TimelineLayout,
    loaded: &HashSet<String>,
    failed: &HashSet<String>,
    font_size: f32,
) -> Option<String> {
    let height = layout.rows.len() as f32 * ROW_HEIGHT + SCROLLBAR_ALLOWANCE;
    let (rect, _) = ui.allocate_exact_size(egui::vec2(LABEL_WIDTH, height), egui::Sense::hover());
    let painter = ui.painter_at(rect);
    let visuals = ui.visuals();
    let visible = ui.clip_rect();
    let mut removed = None;

    for (i, row) in layout.rows.iter().enumerate() {
        let row_rect = egui::Rect::from_min_size(
            egui::pos2(rect.left(), rect.top() + i as f32 * ROW_HEIGHT),
            egui::vec2(LABEL_WIDTH, ROW_HEIGHT),
        );
        if !row_rect.intersects(visible) {
            continue;
        }
        if i % 2 == 1 {
            painter.rect_filled(row_rect, 0.0, visuals.faint_bg_color);
        }

        let color = if row.has_search_match {
            visuals.strong_text_color()
        } else {
            visuals.weak_text_color()
        };
        let clip = painter.with_clip_rect(row_rect.shrink(4.0).intersect(painter.clip_rect()));
        clip.text(
            row_rect.left_center() + egui::vec2(8.0, -7.0),
            egui::Align2::LEFT_CENTER,
            &row.name,
            egui::FontId::proportional(font_size + 1.0),
            color,
        );
        let sub = if failed.contains(&row.id) && !loaded.contains(&row.id) {
            "failed to load".to_string()
        } else if !loaded.contains(&row.id) {
            "loading…".to_string()
        } else if row.blocks.is_empty() {
            "no programmes".to_string()
        } else {
            format!("{} programmes", row.blocks.len())
        };
        clip.text(
            row_rect.left_center() + egui::vec2(8.0, 9.0),
            egui::Align2::LEFT_CENTER,
            sub,
            egui::FontId::proportional(font_size - 2.0),
            visuals.weak_text_color(),
        );

        let hover = match &row.icon {
            Some(icon) => format!("{}\n{}", row.id, icon),
            None => row.id.clone(),
        };
        ui.interact(row_rect, ui.id().with(("channel_label", i)), egui::Sense::click())
            .on_hover_text(hover)
            .context_menu(|ui| {
                if ui.button("Remove from schedule").clicked() {
                    removed = Some(row.id.clone());
                }
            });
    }
    removed
}

/// Paint rows, hour lines, programme blocks and the now marker. Returns the
/// (row, block) that was clicked.
fn paint_body(
    ui: &mut egui::Ui,
    layout: &TimelineLayout,
    now_x: Option<i64>,
    font_size: f32,
) -> Option<(usize, usize)> {
    let width = layout.total_width as f32;
    let height = layout.rows.len() as f32 * ROW_HEIGHT;
    let (rect, _) = ui.allocate_exact_size(egui::vec2(width, height), egui::Sense::hover());
    let painter = ui.painter_at(rect);
    let visible = ui.clip_rect();
    let faint = ui.visuals().faint_bg_color;
    let line = ui.visuals().widgets.noninteractive.bg_stroke.color;
    let day_line = ui.visuals().text_color().gamma_multiply(0.6);

    for i in (1..layout.rows.len()).step_by(2) {
        let row_rect = egui::Rect::from_min_size(
            egui::pos2(rect.left(), rect.top() + i as f32 * ROW_HEIGHT),
            egui::vec2(width, ROW_HEIGHT),
        );
        if row_rect.intersects(visible) {
            painter.rect_filled(row_rect, 0.0, faint);
        }
    }

    for tick in &layout.ticks {
        let x = rect.left() + tick.left as f32;
        let stroke = if tick.new_day {
            egui::Stroke::new(1.5, day_line)
        } else {
            egui::Stroke::new(1.0, line)
        };
        painter.line_segment([egui::pos2(x, rect.top()), egui::pos2(x, rect.bottom())], stroke);
    }

    let mut clicked = None;
    for (r, row) in layout.rows.iter().enumerate() {
        let top = rect.top() + r as f32 * ROW_HEIGHT;
        if top > visible.bottom() || top + ROW_HEIGHT < visible.top() {
            continue;
        }
        for (b, block) in row.blocks.iter().enumerate() {
            let block_rect = egui::Rect::from_min_size(
                egui::pos2(rect.left() + block.left as f32, top + 3.0),
                egui::vec2((block.width as f32 - 1.0).max(1.0), ROW_HEIGHT - 6.0),
            );
            if !block_rect.intersects(visible) {
                continue;
            }

            let response = ui.interact(
                block_rect,
                ui.id().with(("programme", r, b)),
                egui::Sense::click(),
            );
            painter.rect_filled(block_rect, 3.0, block_color(block));
            if response.hovered() {
                painter.rect_stroke(
                    block_rect,
                    3.0,
                    egui::Stroke::new(1.5, egui::Color32::WHITE),
                    egui::StrokeKind::Inside,
                );
            }

            let text_alpha = if block.matches_search { 255 } else { 110 };
            let text = painter.with_clip_rect(block_rect.shrink(3.0).intersect(painter.clip_rect()));
            text.text(
                block_rect.left_top() + egui::vec2(5.0, 4.0),
                egui::Align2::LEFT_TOP,
                &block.programme.title,
                egui::FontId::proportional(font_size),
                egui::Color32::from_white_alpha(text_alpha),
            );
            text.text(
                block_rect.left_top() + egui::vec2(5.0, font_size + 8.0),
                egui::Align2::LEFT_TOP,
                &block.time_range,
                egui::FontId::proportional(font_size - 2.0),
                egui::Color32::from_white_alpha(text_alpha.saturating_sub(60)),
            );

            if response.clicked() {
                clicked = Some((r, b));
            }
            response.on_hover_ui(|ui| {
                ui.label(egui::RichText::new(&block.programme.title).strong());
                ui.label(&block.time_range);
            });
        }
    }

    if let Some(x) = now_x {
        let x = rect.left() + x as f32;
        painter.line_segment(
            [egui::pos2(x, rect.top()), egui::pos2(x, rect.bottom())],
            egui::Stroke::new(2.0, NOW_COLOR),
        );
    }

    clicked
}
