use clap::Parser;
use std::path::PathBuf;

use crate::playback::{clamp_volume, DEFAULT_VOLUME};

const APP_DIR_NAME: &str = "fm-radio";

#[derive(Debug, Parser)]
#[command(name = "fm-radio", version, about = "Internet radio player for the terminal")]
pub struct Cli {
    /// Station list file (JSON)
    #[arg(long, value_name = "PATH")]
    pub stations: Option<PathBuf>,

    /// Directory recordings are written to
    #[arg(long, value_name = "PATH")]
    pub recordings_dir: Option<PathBuf>,

    /// Initial volume, 0-100
    #[arg(long, default_value_t = i64::from(DEFAULT_VOLUME), allow_negative_numbers = true)]
    pub volume: i64,

    /// Start without an audio device (browse and record only)
    #[arg(long)]
    pub no_audio: bool,

    /// Log file; the terminal is taken over by the UI
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Settings resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub stations_file: PathBuf,
    pub recordings_dir: PathBuf,
    pub log_file: PathBuf,
    pub volume: u8,
    pub audio_enabled: bool,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Self {
        Self {
            stations_file: cli
                .stations
                .unwrap_or_else(|| config_dir().join("stations.json")),
            recordings_dir: cli
                .recordings_dir
                .unwrap_or_else(|| data_dir().join("Recordings")),
            log_file: cli
                .log_file
                .unwrap_or_else(|| data_dir().join("fm-radio.log")),
            volume: clamp_volume(cli.volume),
            audio_enabled: !cli.no_audio,
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
