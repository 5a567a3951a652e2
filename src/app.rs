use anyhow::Result;
use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use log::{debug, info, warn};
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::{
    actions::Notification,
    dialog::{self, AddStationForm, Dialog},
    playback::PlaybackController,
    recorder::{recording_file_name, RecordOutcome, RecorderOptions, RecordingHandle},
    ui::{AddStationError, UIState as UIApp},
};

const VOLUME_STEP: i64 = 5;

pub struct AppController {
    pub ui_app: UIApp,
    pub player: PlaybackController,
    recordings_dir: PathBuf,
    recorder_options: RecorderOptions,
    notify_tx: mpsc::UnboundedSender<Notification>,
}

impl AppController {
    pub fn new(
        ui_app: UIApp,
        player: PlaybackController,
        recordings_dir: PathBuf,
        notify_tx: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        Self {
            ui_app,
            player,
            recordings_dir,
            recorder_options: RecorderOptions::default(),
            notify_tx,
        }
    }

    /// Returns `Ok(true)` once quit was requested.
    pub fn handle_key_event(&mut self, key: KeyEvent) -> Result<bool> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.quit();
            return Ok(true);
        }
        if self.ui_app.dialog.is_some() {
            self.handle_dialog_key(key);
            return Ok(false);
        }
        if self.ui_app.search_focused {
            self.handle_search_key(key);
            return Ok(false);
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                self.quit();
                return Ok(true);
            }
            KeyCode::Up | KeyCode::Left => self.step_station(false),
            KeyCode::Down | KeyCode::Right => self.step_station(true),
            KeyCode::Enter => self.play_current_station(),
            KeyCode::Char(' ') => self.toggle_playback(),
            KeyCode::Char('s') | KeyCode::Char('S') => {
                self.player.stop();
                self.ui_app.set_status("Stopped");
            }
            KeyCode::Char('x') | KeyCode::Char('X') => {
                if self.ui_app.random_station(&mut rand::thread_rng()) {
                    self.play_current_station();
                }
            }
            KeyCode::Char('r') | KeyCode::Char('R') => self.toggle_record(),
            KeyCode::Char('+') | KeyCode::Char('=') => self.change_volume(VOLUME_STEP),
            KeyCode::Char('-') => self.change_volume(-VOLUME_STEP),
            KeyCode::Char('/') => self.ui_app.search_focused = true,
            KeyCode::Char('a') | KeyCode::Char('A') => {
                self.ui_app
                    .show_dialog(Dialog::AddStation(AddStationForm::default()));
            }
            KeyCode::Char('d') | KeyCode::Char('D') | KeyCode::Delete => self.confirm_delete(),
            KeyCode::Char(c) if c.is_ascii_digit() => {
                if self.select_station_by_number(c) {
                    self.play_current_station();
                }
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter | KeyCode::Esc => self.ui_app.search_focused = false,
            KeyCode::Up => self.step_station(false),
            KeyCode::Down => self.step_station(true),
            _ => {
                if let Some(request) = dialog::input_request(&key) {
                    self.ui_app.edit_search(request);
                }
            }
        }
    }

    /// Move through the visible list, keeping playback on the selection.
    fn step_station(&mut self, forward: bool) {
        let was_playing = self.player.is_playing();
        let moved = if forward {
            self.ui_app.next_station()
        } else {
            self.ui_app.previous_station()
        };
        if moved && was_playing {
            self.play_current_station();
        }
    }

    fn handle_dialog_key(&mut self, key: KeyEvent) {
        let Some(open) = self.ui_app.dialog.take() else {
            return;
        };
        let next = match open {
            Dialog::Message { .. } if matches!(key.code, KeyCode::Enter | KeyCode::Esc) => None,
            Dialog::ConfirmDelete { index, .. }
                if matches!(key.code, KeyCode::Char('y' | 'Y') | KeyCode::Enter) =>
            {
                self.delete_station(index)
            }
            Dialog::ConfirmDelete { .. }
                if matches!(key.code, KeyCode::Char('n' | 'N') | KeyCode::Esc) =>
            {
                None
            }
            Dialog::AddStation(form) => self.handle_form_key(form, key),
            other => Some(other),
        };
        self.ui_app.set_dialog(next);
    }

    fn handle_form_key(&mut self, mut form: AddStationForm, key: KeyEvent) -> Option<Dialog> {
        match key.code {
            KeyCode::Esc => return None,
            KeyCode::Tab | KeyCode::Down => form.next_field(),
            KeyCode::BackTab | KeyCode::Up => form.previous_field(),
            KeyCode::Enter => {
                match self
                    .ui_app
                    .add_station(form.name(), form.url(), form.frequency())
                {
                    Ok(()) => {
                        info!("Added station {}", form.name().trim());
                        self.ui_app
                            .set_status(format!("Added {}", form.name().trim()));
                        return None;
                    }
                    Err(AddStationError::Save(message)) => {
                        warn!("Saving new station failed: {}", message);
                        return Some(Dialog::error("Save failed", message));
                    }
                    Err(e) => form.error = Some(e.to_string()),
                }
            }
            _ => {
                if let Some(request) = dialog::input_request(&key) {
                    form.edit(request);
                    form.error = None;
                }
            }
        }
        Some(Dialog::AddStation(form))
    }

    /// Start or restart the selected station.
    fn play_current_station(&mut self) {
        if !self.player.is_available() {
            return;
        }
        let Some(station) = self.ui_app.current_station() else {
            return;
        };
        let url = station.url.trim().to_string();
        let name = station.display_name().to_string();
        if url.is_empty() {
            self.ui_app
                .show_dialog(Dialog::warning("No URL", "This station has no stream URL."));
            return;
        }

        match self.player.play(&url) {
            Ok(()) => self.ui_app.set_status(format!("Tuned to {}", name)),
            Err(e) => {
                warn!("Playback of {} failed: {:#}", url, e);
                self.ui_app.show_dialog(Dialog::error(
                    "Playback error",
                    format!("Could not play {}.\n\n{:#}", name, e),
                ));
            }
        }
    }

    fn toggle_playback(&mut self) {
        if self.player.is_playing() {
            if let Err(e) = self.player.pause() {
                warn!("Pause failed: {:#}", e);
            }
            self.ui_app.set_status("Paused");
        } else {
            self.play_current_station();
        }
    }

    fn select_station_by_number(&mut self, digit: char) -> bool {
        match digit.to_digit(10) {
            Some(n) if n > 0 => self.ui_app.select_filtered(n as usize - 1),
            _ => false,
        }
    }

    fn change_volume(&mut self, delta: i64) {
        let volume = self.player.set_volume(i64::from(self.player.volume()) + delta);
        debug!("Volume set to {}", volume);
    }

    fn confirm_delete(&mut self) {
        let Some(index) = self.ui_app.current_index else {
            return;
        };
        let Some(station) = self.ui_app.stations.get(index) else {
            return;
        };
        let name = station.display_name().to_string();
        self.ui_app.show_dialog(Dialog::ConfirmDelete { index, name });
    }

    fn delete_station(&mut self, index: usize) -> Option<Dialog> {
        if self.player.is_playing() {
            self.player.stop();
        }
        match self.ui_app.delete_station(index) {
            Ok(removed) => {
                info!("Removed station {}", removed.display_name());
                self.ui_app
                    .set_status(format!("Removed {}", removed.display_name()));
                None
            }
            Err(e) => {
                warn!("Removing station failed: {:#}", e);
                Some(Dialog::error(
                    "Save failed",
                    format!("Could not save stations.\n\n{:#}", e),
                ))
            }
        }
    }

    fn toggle_record(&mut self) {
        if let Some(recording) = &self.ui_app.recording {
            if !recording.is_stopping() {
                recording.request_stop();
                self.ui_app.set_status("Stopping recording…");
            }
            return;
        }

        let Some(station) = self.ui_app.current_station() else {
            self.ui_app
                .show_dialog(Dialog::warning("No station", "Select a station first."));
            return;
        };
        let url = station.url.trim().to_string();
        if url.is_empty() {
            self.ui_app
                .show_dialog(Dialog::warning("No URL", "This station has no stream URL."));
            return;
        }

        let path = self
            .recordings_dir
            .join(recording_file_name(Local::now(), &station.name, &url));
        match RecordingHandle::start(
            url,
            path,
            self.recorder_options.clone(),
            self.notify_tx.clone(),
        ) {
            Ok(handle) => {
                self.ui_app.set_status("Recording");
                self.ui_app.recording = Some(handle);
            }
            Err(e) => {
                warn!("Could not start recorder: {:#}", e);
                self.ui_app.show_dialog(Dialog::error(
                    "Recording error",
                    format!("Recording failed.\n\n{:#}", e),
                ));
            }
        }
    }

    pub fn process_notification(&mut self, notification: Notification) {
        match notification {
            Notification::RecordingFinished { path, outcome } => {
                if let Some(handle) = self.ui_app.recording.take() {
                    handle.join();
                }
                match outcome {
                    RecordOutcome::Failed(message) => {
                        warn!("Recording {} failed: {}", path.display(), message);
                        self.ui_app.set_status("");
                        self.ui_app.show_dialog(Dialog::error(
                            "Recording error",
                            format!("Recording failed.\n\n{}", message),
                        ));
                    }
                    RecordOutcome::Finished { bytes } if bytes > 0 => {
                        info!("Recording saved: {} ({} bytes)", path.display(), bytes);
                        self.ui_app.set_status("");
                        self.ui_app.show_dialog(Dialog::info(
                            "Recording saved",
                            format!("Saved to:\n{}", path.display()),
                        ));
                    }
                    RecordOutcome::Finished { .. } => {
                        self.ui_app.set_status("Recording stopped, nothing was received");
                    }
                }
            }
        }
    }

    /// Stop playback and signal a running recorder.
    pub fn quit(&mut self) {
        self.player.stop();
        self.ui_app.quit();
    }

    pub fn should_quit(&self) -> bool {
        self.ui_app.should_quit
    }
}
