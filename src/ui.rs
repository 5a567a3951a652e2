use crate::{
    dialog::{self, Dialog},
    playback::{PlaybackController, PlaybackState},
    recorder::RecordingHandle,
    station::Station,
    store::StationStore,
};
use anyhow::Result;
use log::debug;
use rand::{seq::SliceRandom, Rng};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};
use std::collections::VecDeque;
use thiserror::Error;
use tui_input::{Input, InputRequest};

// Layout constants
const DISPLAY_HEIGHT: u16 = 6;
const TRANSPORT_HEIGHT: u16 = 3;
const VOLUME_HEIGHT: u16 = 3;
const SEARCH_HEIGHT: u16 = 3;
const FOOTER_HEIGHT: u16 = 3;
const MARGIN: u16 = 1;

const NO_FREQUENCY: &str = "—";

#[derive(Debug, Error)]
pub enum AddStationError {
    #[error("Please enter a station name.")]
    MissingName,
    #[error("Please enter a stream URL.")]
    MissingUrl,
    #[error("URL must start with http:// or https://")]
    UnsupportedScheme,
    #[error("Could not save stations: {0}")]
    Save(String),
}

pub struct UIState {
    pub stations: Vec<Station>,
    store: StationStore,
    /// Storage index of the selected station; `None` when nothing is selected.
    pub current_index: Option<usize>,
    /// Indices into `stations` matching the search text, in list order.
    pub filtered_indices: Vec<usize>,
    pub search: Input,
    pub search_focused: bool,
    pub list_state: ListState,
    pub recording: Option<RecordingHandle>,
    pub dialog: Option<Dialog>,
    queued_dialogs: VecDeque<Dialog>,
    pub status_message: String,
    pub should_quit: bool,
}

impl UIState {
    pub fn new(store: StationStore) -> Self {
        let stations = store.load();
        debug!("Loaded {} stations from {}", stations.len(), store.path().display());

        let mut state = Self {
            current_index: (!stations.is_empty()).then_some(0),
            stations,
            store,
            filtered_indices: Vec::new(),
            search: Input::default(),
            search_focused: false,
            list_state: ListState::default(),
            recording: None,
            dialog: None,
            queued_dialogs: VecDeque::new(),
            status_message: String::new(),
            should_quit: false,
        };
        state.refilter();
        state
    }

    pub fn current_station(&self) -> Option<&Station> {
        self.current_index.and_then(|i| self.stations.get(i))
    }

    /// Apply one edit to the search box and re-filter. The selection is
    /// left alone even if it no longer matches.
    pub fn edit_search(&mut self, request: InputRequest) {
        self.search.handle(request);
        self.refilter();
    }

    pub fn set_search(&mut self, text: &str) {
        self.search = Input::new(text.to_string());
        self.refilter();
    }

    pub fn refilter(&mut self) {
        let query = self.search.value().trim().to_lowercase();
        self.filtered_indices = if query.is_empty() {
            (0..self.stations.len()).collect()
        } else {
            self.stations
                .iter()
                .enumerate()
                .filter(|(_, station)| station.matches(&query))
                .map(|(i, _)| i)
                .collect()
        };
        self.sync_list_selection();
    }

    fn filtered_position(&self) -> Option<usize> {
        let current = self.current_index?;
        self.filtered_indices.iter().position(|&i| i == current)
    }

    fn sync_list_selection(&mut self) {
        self.list_state.select(self.filtered_position());
    }

    pub fn select_station(&mut self, index: usize) {
        if index < self.stations.len() {
            self.current_index = Some(index);
            self.sync_list_selection();
        }
    }

    /// Select by position in the visible list.
    pub fn select_filtered(&mut self, position: usize) -> bool {
        match self.filtered_indices.get(position).copied() {
            Some(index) if Some(index) != self.current_index => {
                self.select_station(index);
                true
            }
            _ => false,
        }
    }

    /// Wraps from the last visible station to the first. A selection that is
    /// filtered out moves to the first visible station.
    pub fn next_station(&mut self) -> bool {
        let n = self.filtered_indices.len();
        if n == 0 {
            return false;
        }
        let next = match self.filtered_position() {
            Some(pos) => (pos + 1) % n,
            None => 0,
        };
        self.select_station(self.filtered_indices[next]);
        true
    }

    /// Wraps from the first visible station to the last. A selection that is
    /// filtered out moves to the last visible station.
    pub fn previous_station(&mut self) -> bool {
        let n = self.filtered_indices.len();
        if n == 0 {
            return false;
        }
        let prev = match self.filtered_position() {
            Some(pos) => (pos + n - 1) % n,
            None => n - 1,
        };
        self.select_station(self.filtered_indices[prev]);
        true
    }

    /// Picks a visible station other than the current one when possible.
    pub fn random_station<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if self.filtered_indices.is_empty() {
            return false;
        }
        let candidates: Vec<usize> = self
            .filtered_indices
            .iter()
            .copied()
            .filter(|&i| Some(i) != self.current_index)
            .collect();
        let index = candidates
            .choose(rng)
            .copied()
            .unwrap_or(self.filtered_indices[0]);
        self.select_station(index);
        true
    }

    /// Validate, append, persist and select a new station. Nothing changes
    /// unless the station file was written.
    pub fn add_station(&mut self, name: &str, url: &str, frequency: &str) -> Result<(), AddStationError> {
        let (name, url, frequency) = (name.trim(), url.trim(), frequency.trim());
        if name.is_empty() {
            return Err(AddStationError::MissingName);
        }
        if url.is_empty() {
            return Err(AddStationError::MissingUrl);
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AddStationError::UnsupportedScheme);
        }
        let frequency = if frequency.is_empty() { NO_FREQUENCY } else { frequency };

        let mut station = Station::new(name, url, frequency);
        station.dial_position = self.stations.len() as u32 + 1;
        self.stations.push(station);

        if let Err(e) = self.store.save(&self.stations) {
            self.stations.pop();
            return Err(AddStationError::Save(format!("{:#}", e)));
        }

        self.current_index = Some(self.stations.len() - 1);
        self.refilter();
        Ok(())
    }

    /// Remove and persist. The selection moves to the station now at the
    /// same position, or to the new last one.
    pub fn delete_station(&mut self, index: usize) -> Result<Station> {
        if index >= self.stations.len() {
            anyhow::bail!("No station at position {}", index + 1);
        }
        let removed = self.stations.remove(index);
        if let Err(e) = self.store.save(&self.stations) {
            self.stations.insert(index, removed);
            return Err(e);
        }

        self.current_index = if self.stations.is_empty() {
            None
        } else {
            Some(index.min(self.stations.len() - 1))
        };
        self.refilter();
        Ok(removed)
    }

    /// Open `dialog`, or queue it behind the one already open.
    pub fn show_dialog(&mut self, dialog: Dialog) {
        if self.dialog.is_none() {
            self.dialog = Some(dialog);
        } else {
            self.queued_dialogs.push_back(dialog);
        }
    }

    /// Replace the open dialog; `None` closes it and brings up the next queued one.
    pub fn set_dialog(&mut self, dialog: Option<Dialog>) {
        self.dialog = dialog.or_else(|| self.queued_dialogs.pop_front());
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
    }

    pub fn quit(&mut self) {
        if let Some(recording) = &self.recording {
            recording.request_stop();
        }
        self.should_quit = true;
    }
}

pub fn render_ui(f: &mut Frame, app: &mut UIState, player: &PlaybackController) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(MARGIN)
        .constraints([
            Constraint::Length(DISPLAY_HEIGHT),
            Constraint::Length(TRANSPORT_HEIGHT),
            Constraint::Length(VOLUME_HEIGHT),
            Constraint::Length(SEARCH_HEIGHT),
            Constraint::Min(5),
            Constraint::Length(FOOTER_HEIGHT),
        ])
        .split(f.area());

    render_display(f, chunks[0], app);
    render_transport(f, chunks[1], app, player);
    render_volume(f, chunks[2], player);
    render_search(f, chunks[3], app);
    render_station_list(f, chunks[4], app);
    render_footer(f, chunks[5]);

    if let Some(dialog) = &app.dialog {
        dialog::render_dialog(f, dialog);
    }
}

fn render_display(f: &mut Frame, area: Rect, app: &UIState) {
    let lines = match app.current_station() {
        Some(station) => vec![
            Line::from(Span::styled(
                station.now_playing_text(),
                Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
            )),
            frequency_line(station),
            Line::from(Span::styled(
                station.summary(),
                Style::default().fg(Color::White),
            )),
        ],
        None => vec![
            Line::from(""),
            Line::from(Span::styled(
                NO_FREQUENCY,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled("— No station —", Style::default().fg(Color::DarkGray))),
        ],
    };

    let title = Span::styled(
        " FM RADIO ",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    );
    let display = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: true });
    f.render_widget(display, area);
}

/// The unit is only shown for numeric labels; "DAB" stays as it is.
fn frequency_line(station: &Station) -> Line<'static> {
    let mut spans = vec![Span::styled(
        station.display_frequency().to_string(),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];
    if station.has_numeric_frequency() {
        spans.push(Span::styled(" MHz", Style::default().fg(Color::DarkGray)));
    }
    Line::from(spans)
}

fn render_transport(f: &mut Frame, area: Rect, app: &UIState, player: &PlaybackController) {
    let state = player.state();
    let state_color = match state {
        PlaybackState::Playing => Color::Green,
        PlaybackState::Paused | PlaybackState::Connecting => Color::Yellow,
        PlaybackState::Error(_) => Color::Red,
        PlaybackState::Stopped => Color::Gray,
    };

    let mut spans = vec![Span::styled(
        format!(" {} ", state.label()),
        Style::default().fg(state_color).add_modifier(Modifier::BOLD),
    )];
    if !player.is_available() {
        spans.push(Span::styled(" (audio disabled)", Style::default().fg(Color::DarkGray)));
    }

    match &app.recording {
        Some(recording) if recording.is_stopping() => {
            spans.push(Span::styled("  ■ STOPPING REC", Style::default().fg(Color::Yellow)));
        }
        Some(recording) => {
            let file = recording
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            spans.push(Span::styled(
                "  ● REC ",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::styled(file, Style::default().fg(Color::Gray)));
        }
        None => {}
    }

    if let PlaybackState::Error(message) = &state {
        spans.push(Span::styled(format!("  {}", message), Style::default().fg(Color::Red)));
    } else if !app.status_message.is_empty() {
        spans.push(Span::styled(
            format!("  {}", app.status_message),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let transport = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(transport, area);
}

fn render_volume(f: &mut Frame, area: Rect, player: &PlaybackController) {
    let volume = player.volume();
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Volume "))
        .gauge_style(Style::default().fg(Color::Cyan).bg(Color::Black))
        .percent(u16::from(volume))
        .label(format!("{}%", volume));
    f.render_widget(gauge, area);
}

fn render_search(f: &mut Frame, area: Rect, app: &UIState) {
    let border = if app.search_focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let width = area.width.saturating_sub(2) as usize;
    let scroll = app.search.visual_scroll(width.saturating_sub(1));
    let search = Paragraph::new(app.search.value())
        .scroll((0, scroll as u16))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Search ")
                .border_style(border),
        );
    f.render_widget(search, area);

    if app.search_focused && app.dialog.is_none() {
        let x = area.x + 1 + (app.search.visual_cursor().saturating_sub(scroll)) as u16;
        f.set_cursor_position(Position::new(x, area.y + 1));
    }
}

fn render_station_list(f: &mut Frame, area: Rect, app: &mut UIState) {
    let n = app.stations.len();
    let title = format!(" {} station{} ", n, if n == 1 { "" } else { "s" });
    let block = Block::default().borders(Borders::ALL).title(title);

    if app.filtered_indices.is_empty() {
        let message = if n == 0 {
            "No stations. Press 'a' to add one."
        } else {
            "No stations match the search."
        };
        let empty = Paragraph::new(message)
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = app
        .filtered_indices
        .iter()
        .map(|&i| ListItem::new(app.stations[i].list_label()))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶");
    f.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let help = "↑/↓ Tune • Enter Play • Space Pause • s Stop • x Random • r Rec • +/- Vol • / Search • a Add • d Remove • q Quit";
    let footer = Paragraph::new(help)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    const EXAMPLE: &str = r#"{"stations":[{"name":"A","url":"http://x/a","frequency":"90.0"},{"name":"B","url":"http://x/b","frequency":"91.0"}]}"#;

    fn state_with(content: &str) -> (UIState, TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stations.json");
        fs::write(&path, content).unwrap();
        (UIState::new(StationStore::new(path)), dir)
    }

    fn named(names: &[&str]) -> String {
        let stations: Vec<Station> = names
            .iter()
            .map(|n| Station::new(*n, format!("http://x/{}", n), "1"))
            .collect();
        serde_json::json!({ "stations": stations }).to_string()
    }

    #[test]
    fn test_next_wraps_around() {
        let (mut app, _dir) = state_with(EXAMPLE);
        app.select_station(0);
        assert!(app.next_station());
        assert_eq!(app.current_index, Some(1));
        assert!(app.next_station());
        assert_eq!(app.current_index, Some(0));
    }

    #[test]
    fn test_previous_wraps_around() {
        let (mut app, _dir) = state_with(&named(&["a", "b", "c"]));
        assert_eq!(app.current_index, Some(0));
        assert!(app.previous_station());
        assert_eq!(app.current_index, Some(2));
        assert_eq!(app.list_state.selected(), Some(2));
    }

    #[test]
    fn test_navigation_on_empty_list_is_noop() {
        let (mut app, _dir) = state_with("garbage");
        assert!(app.stations.is_empty());
        assert_eq!(app.current_index, None);
        assert!(!app.next_station());
        assert!(!app.previous_station());
        assert!(!app.random_station(&mut StdRng::seed_from_u64(1)));
        assert_eq!(app.current_index, None);

        let (mut app, _dir) = state_with(EXAMPLE);
        app.set_search("zzz");
        assert!(app.filtered_indices.is_empty());
        assert!(!app.next_station());
        assert_eq!(app.current_index, Some(0));
    }

    #[test]
    fn test_search_keeps_selection_and_navigates_within_matches() {
        let (mut app, _dir) = state_with(&named(&["rock one", "jazz", "rock two", "pop"]));
        app.select_station(1);

        app.set_search("ROCK");
        assert_eq!(app.filtered_indices, vec![0, 2]);
        assert_eq!(app.current_index, Some(1));
        assert_eq!(app.list_state.selected(), None);

        assert!(app.next_station());
        assert_eq!(app.current_index, Some(0));
        assert!(app.next_station());
        assert_eq!(app.current_index, Some(2));
        assert_eq!(app.list_state.selected(), Some(1));

        app.select_station(3);
        assert!(app.previous_station());
        assert_eq!(app.current_index, Some(2));
    }

    #[test]
    fn test_edit_search_refilters() {
        let (mut app, _dir) = state_with(&named(&["alpha", "beta"]));
        app.edit_search(InputRequest::InsertChar('b'));
        assert_eq!(app.search.value(), "b");
        assert_eq!(app.filtered_indices, vec![1]);
        app.edit_search(InputRequest::DeletePrevChar);
        assert_eq!(app.filtered_indices, vec![0, 1]);
    }

    #[test]
    fn test_random_avoids_current() {
        let (mut app, _dir) = state_with(&named(&["a", "b", "c", "d"]));
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let before = app.current_index;
            assert!(app.random_station(&mut rng));
            assert_ne!(app.current_index, before);
        }

        let (mut app, _dir) = state_with(&named(&["only"]));
        assert!(app.random_station(&mut rng));
        assert_eq!(app.current_index, Some(0));
    }

    #[test]
    fn test_select_filtered() {
        let (mut app, _dir) = state_with(&named(&["a", "b", "c"]));
        assert!(app.select_filtered(2));
        assert_eq!(app.current_index, Some(2));
        assert!(!app.select_filtered(2));
        assert!(!app.select_filtered(9));
    }

    #[test]
    fn test_add_station_appends_persists_and_selects() {
        let (mut app, _dir) = state_with(EXAMPLE);
        app.add_station("  New  ", " https://x/new ", "").unwrap();

        assert_eq!(app.stations.len(), 3);
        assert_eq!(app.current_index, Some(2));
        let added = app.current_station().unwrap();
        assert_eq!(added.name, "New");
        assert_eq!(added.url, "https://x/new");
        assert_eq!(added.frequency, NO_FREQUENCY);
        assert_eq!(added.dial_position, 3);

        let reloaded = app.store.load();
        assert_eq!(reloaded, app.stations);
    }

    #[test]
    fn test_add_station_rejects_bad_input() {
        let (mut app, _dir) = state_with(EXAMPLE);
        let before = fs::read_to_string(app.store.path()).unwrap();

        assert!(matches!(
            app.add_station(" ", "http://x", "1"),
            Err(AddStationError::MissingName)
        ));
        assert!(matches!(
            app.add_station("N", "", "1"),
            Err(AddStationError::MissingUrl)
        ));
        assert!(matches!(
            app.add_station("N", "ftp://x/stream", "1"),
            Err(AddStationError::UnsupportedScheme)
        ));

        assert_eq!(app.stations.len(), 2);
        assert_eq!(app.current_index, Some(0));
        assert_eq!(fs::read_to_string(app.store.path()).unwrap(), before);
    }

    #[test]
    fn test_add_station_rolls_back_when_save_fails() {
        let dir = tempdir().unwrap();
        // A directory where the file should be makes every write fail.
        let path = dir.path().join("stations.json");
        fs::create_dir(&path).unwrap();
        let mut app = UIState::new(StationStore::new(&path));

        let result = app.add_station("N", "http://x/n", "1");
        assert!(matches!(result, Err(AddStationError::Save(_))));
        assert!(app.stations.is_empty());
        assert_eq!(app.current_index, None);
    }

    #[test]
    fn test_delete_selection_rules() {
        let (mut app, _dir) = state_with(&named(&["a", "b", "c"]));

        app.select_station(1);
        assert_eq!(app.delete_station(1).unwrap().name, "b");
        assert_eq!(app.current_index, Some(1));
        assert_eq!(app.current_station().unwrap().name, "c");

        assert_eq!(app.delete_station(1).unwrap().name, "c");
        assert_eq!(app.current_index, Some(0));

        app.delete_station(0).unwrap();
        assert_eq!(app.current_index, None);
        assert!(app.current_station().is_none());
        assert!(app.store.load().is_empty());
        assert!(app.delete_station(0).is_err());
    }

    #[test]
    fn test_dialogs_queue_behind_open_one() {
        let (mut app, _dir) = state_with(EXAMPLE);
        app.show_dialog(Dialog::info("first", ""));
        app.show_dialog(Dialog::error("second", ""));

        assert!(matches!(&app.dialog, Some(Dialog::Message { title, .. }) if title == "first"));
        app.set_dialog(None);
        assert!(matches!(&app.dialog, Some(Dialog::Message { title, .. }) if title == "second"));
        app.set_dialog(None);
        assert!(app.dialog.is_none());
    }

    #[test]
    fn test_frequency_unit_only_for_numbers() {
        let line = frequency_line(&Station::new("A", "http://x/a", "98.5"));
        assert_eq!(line.spans.len(), 2);
        assert_eq!(line.spans[1].content, " MHz");

        for label in ["DAB", NO_FREQUENCY, ""] {
            let line = frequency_line(&Station::new("A", "http://x/a", label));
            assert_eq!(line.spans.len(), 1, "label {:?}", label);
        }
    }

    #[test]
    fn test_add_then_remove_restores_file_contents() {
        let (mut app, _dir) = state_with(EXAMPLE);
        let original = app.store.load();

        app.add_station("C", "http://x/c", "92.0").unwrap();
        app.delete_station(2).unwrap();

        assert_eq!(app.store.load(), original);
        assert_eq!(app.current_index, Some(1));
    }
}
