//! Client application state
//!
//! All changes go through [`StoreState::dispatch`]. Background work never
//! touches the state directly; it sends results to the UI thread, which turns
//! them into actions.

use std::collections::{BTreeSet, HashSet};

use crate::models::{Programme, Schedule};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetLoading(bool),
    /// Also clears `loading`
    SetError(Option<String>),
    /// Replaces the channel list, marks channels loaded and clears errors
    SetSchedule(Schedule),
    AddChannelProgrammes {
        channel_id: String,
        programmes: Vec<Programme>,
    },
    SetSelectedChannels(Vec<String>),
    AddSelectedChannel(String),
    RemoveSelectedChannel(String),
    ClearSelectedChannels,
}

impl Action {
    /// Whether applying this action changes what must be written to the
    /// selection file
    pub fn changes_selection(&self) -> bool {
        matches!(
            self,
            Action::SetSelectedChannels(_)
                | Action::AddSelectedChannel(_)
                | Action::RemoveSelectedChannel(_)
                | Action::ClearSelectedChannels
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub schedule: Schedule,
    pub loading: bool,
    pub error: Option<String>,
    pub channels_loaded: bool,
    /// Channels whose programme file has been fetched this session
    pub loaded_channel_ids: HashSet<String>,
    /// Every category seen in fetched programmes, sorted
    pub all_categories: BTreeSet<String>,
    /// Selected channel ids in the order they were picked
    selected: Vec<String>,
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an action. Returns true when the selection must be persisted.
    pub fn dispatch(&mut self, action: Action) -> bool {
        let persist = action.changes_selection();

        match action {
            Action::SetLoading(loading) => self.loading = loading,
            Action::SetError(error) => {
                self.error = error;
                self.loading = false;
            }
            Action::SetSchedule(schedule) => {
                self.schedule = schedule;
                self.loading = false;
                self.error = None;
                self.channels_loaded = true;
            }
            Action::AddChannelProgrammes {
                channel_id,
                programmes,
            } => {
                for category in programmes.iter().flat_map(|p| p.categories.iter()) {
                    if !category.contains("://") {
                        self.all_categories.insert(category.clone());
                    }
                }
                if let Some(channel) = self
                    .schedule
                    .channels
                    .iter_mut()
                    .find(|c| c.id == channel_id)
                {
                    channel.programmes = programmes;
                }
                self.loaded_channel_ids.insert(channel_id);
            }
            Action::SetSelectedChannels(ids) => {
                self.selected.clear();
                for id in ids {
                    self.select(id);
                }
            }
            Action::AddSelectedChannel(id) => self.select(id),
            Action::RemoveSelectedChannel(id) => self.selected.retain(|s| *s != id),
            Action::ClearSelectedChannels => self.selected.clear(),
        }

        persist
    }

    fn select(&mut self, id: String) {
        if !self.selected.contains(&id) {
            self.selected.push(id);
        }
    }

    pub fn selected_ids(&self) -> &[String] {
        &self.selected
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.iter().any(|s| s == id)
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.loaded_channel_ids.contains(id)
    }

    /// Selected channels that exist in the schedule, in schedule order
    pub fn selected_channels(&self) -> impl Iterator<Item = &crate::models::Channel> {
        self.schedule
            .channels
            .iter()
            .filter(move |c| self.is_selected(&c.id))
    }

    /// Categories of all known channels (from the channel index), sorted
    pub fn channel_categories(&self) -> BTreeSet<&str> {
        self.schedule
            .channels
            .iter()
            .flat_map(|c| c.categories.iter())
            .filter(|c| !c.is_empty() && !c.contains("://"))
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, ChannelIndexEntry};

    fn schedule() -> Schedule {
        Schedule::from_index(vec![
            ChannelIndexEntry {
                id: "a".to_string(),
                display_name: "A".to_string(),
                categories: vec!["News".to_string()],
                ..Default::default()
            },
            ChannelIndexEntry {
                id: "b".to_string(),
                display_name: "B".to_string(),
                categories: vec!["Sports".to_string(), "News".to_string()],
                ..Default::default()
            },
        ])
    }

    fn prog(title: &str, categories: &[&str]) -> Programme {
        Programme {
            title: title.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_loading_and_error() {
        let mut state = StoreState::new();
        assert!(!state.dispatch(Action::SetLoading(true)));
        assert!(state.loading);

        state.dispatch(Action::SetError(Some("boom".to_string())));
        assert!(!state.loading);
        assert_eq!(state.error.as_deref(), Some("boom"));

        state.dispatch(Action::SetSchedule(schedule()));
        assert!(state.error.is_none());
        assert!(state.channels_loaded);
        assert_eq!(state.schedule.channels.len(), 2);
    }

    #[test]
    fn test_add_channel_programmes() {
        let mut state = StoreState::new();
        state.dispatch(Action::SetSchedule(schedule()));

        let persist = state.dispatch(Action::AddChannelProgrammes {
            channel_id: "b".to_string(),
            programmes: vec![
                prog("Match", &["Sports"]),
                prog("Link", &["https://example.com/cat", "Movies"]),
            ],
        });
        assert!(!persist);
        assert!(state.is_loaded("b"));
        assert!(!state.is_loaded("a"));

        let b: &Channel = state.schedule.channels.iter().find(|c| c.id == "b").unwrap();
        assert_eq!(b.programmes.len(), 2);
        let categories: Vec<&str> = state.all_categories.iter().map(String::as_str).collect();
        assert_eq!(categories, vec!["Movies", "Sports"]);
    }

    #[test]
    fn test_programmes_for_unknown_channel_still_mark_loaded() {
        let mut state = StoreState::new();
        state.dispatch(Action::SetSchedule(schedule()));
        state.dispatch(Action::AddChannelProgrammes {
            channel_id: "zzz".to_string(),
            programmes: vec![],
        });
        assert!(state.is_loaded("zzz"));
    }

    #[test]
    fn test_selection_actions_request_persistence() {
        let mut state = StoreState::new();
        assert!(state.dispatch(Action::AddSelectedChannel("b".to_string())));
        assert!(state.dispatch(Action::AddSelectedChannel("a".to_string())));
        assert!(state.dispatch(Action::AddSelectedChannel("b".to_string())));
        assert_eq!(state.selected_ids(), ["b", "a"]);

        assert!(state.dispatch(Action::RemoveSelectedChannel("b".to_string())));
        assert_eq!(state.selected_ids(), ["a"]);

        assert!(state.dispatch(Action::SetSelectedChannels(vec![
            "x".to_string(),
            "x".to_string(),
            "y".to_string(),
        ])));
        assert_eq!(state.selected_ids(), ["x", "y"]);

        assert!(state.dispatch(Action::ClearSelectedChannels));
        assert!(state.selected_ids().is_empty());
    }

    #[test]
    fn test_selected_channels_skip_unknown_ids() {
        let mut state = StoreState::new();
        state.dispatch(Action::SetSchedule(schedule()));
        state.dispatch(Action::SetSelectedChannels(vec![
            "gone".to_string(),
            "b".to_string(),
        ]));
        let ids: Vec<&str> = state.selected_channels().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_channel_categories() {
        let mut state = StoreState::new();
        state.dispatch(Action::SetSchedule(schedule()));
        let cats: Vec<&str> = state.channel_categories().into_iter().collect();
        assert_eq!(cats, vec!["News", "Sports"]);
    }
}
