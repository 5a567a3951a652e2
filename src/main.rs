mod actions;
mod app;
mod audio;
mod config;
mod dialog;
mod playback;
mod recorder;
mod station;
mod store;
mod ui;
mod utils;

use anyhow::{Context, Result};
use app::AppController;
use audio::StreamPlayer;
use clap::Parser;
use config::{Cli, Config};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use dialog::Dialog;
use log::{error, info, warn};
use playback::PlaybackController;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::{self, OpenOptions};
use std::io;
use std::time::Duration;
use store::StationStore;
use tokio::sync::mpsc;
use tokio::time::sleep;
use ui::UIState;

const DEFAULT_STATIONS: &str = include_str!("../stations.json");

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_cli(Cli::parse());
    init_logging(&config);
    info!("Starting fm-radio with {:?}", config);

    fs::create_dir_all(&config.recordings_dir).with_context(|| {
        format!(
            "creating recordings directory {}",
            config.recordings_dir.display()
        )
    })?;

    let store = StationStore::new(&config.stations_file);
    match store.seed_if_missing(DEFAULT_STATIONS) {
        Ok(true) => info!("Wrote default stations to {}", store.path().display()),
        Ok(false) => {}
        Err(e) => warn!("Could not write default stations: {:#}", e),
    }

    let volume = i64::from(config.volume);
    let (player, engine_error) = if config.audio_enabled {
        match StreamPlayer::new() {
            Ok(engine) => (PlaybackController::new(Box::new(engine), volume), None),
            Err(e) => {
                error!("Audio output unavailable: {:#}", e);
                (PlaybackController::disabled(volume), Some(e))
            }
        }
    } else {
        (PlaybackController::disabled(volume), None)
    };

    let mut ui_app = UIState::new(store);
    if let Some(e) = engine_error {
        ui_app.show_dialog(Dialog::error(
            "Audio unavailable",
            format!(
                "Could not open the audio output. Playback is disabled.\n\n{:#}",
                e
            ),
        ));
    } else if !config.audio_enabled {
        ui_app.set_status("Audio disabled");
    }

    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
    let mut app_controller =
        AppController::new(ui_app, player, config.recordings_dir.clone(), notify_tx);

    // Set up panic handler to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic);
    }));

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app_controller, &mut notify_rx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(e) = &res {
        error!("Exiting after error: {:#}", e);
    }
    info!("fm-radio stopped");
    res
}

/// Logs go to a file since the UI owns the terminal. `RUST_LOG` overrides
/// the default `info` level.
fn init_logging(config: &Config) {
    if let Some(dir) = config.log_file.parent() {
        let _ = fs::create_dir_all(dir);
    }
    let file = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "fm-radio: cannot open log file {}: {}",
                config.log_file.display(),
                e
            );
            return;
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app_controller: &mut AppController,
    notify_rx: &mut mpsc::UnboundedReceiver<actions::Notification>,
) -> Result<()> {
    loop {
        // Render UI
        terminal.draw(|f| {
            ui::render_ui(f, &mut app_controller.ui_app, &app_controller.player)
        })?;

        if event::poll(Duration::from_millis(50))? {
            match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if app_controller.handle_key_event(key)? {
                        break; // Quit was requested
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to read terminal event: {}", e),
            }
        }

        while let Ok(notification) = notify_rx.try_recv() {
            app_controller.process_notification(notification);
        }

        // Small delay to prevent high CPU usage but keep responsive
        sleep(Duration::from_millis(16)).await;

        if app_controller.should_quit() {
            break;
        }
    }

    Ok(())
}
