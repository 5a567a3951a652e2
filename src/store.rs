use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::station::Station;

/// Accepts the current `{"stations": [...]}` layout and a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum StationFile {
    Wrapped {
        #[serde(default)]
        stations: Vec<Value>,
    },
    Bare(Vec<Value>),
}

#[derive(Serialize)]
struct StationFileRef<'a> {
    stations: &'a [Station],
}

/// JSON-backed station list. Every write replaces the whole file.
#[derive(Debug, Clone)]
pub struct StationStore {
    path: PathBuf,
}

impl StationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files yield an empty list.
    pub fn load(&self) -> Vec<Station> {
        match fs::read_to_string(&self.path) {
            Ok(content) => parse_stations(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No station file at {}", self.path.display());
                Vec::new()
            }
            Err(e) => {
                warn!("Failed to read station file {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    pub fn save(&self, stations: &[Station]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&StationFileRef { stations })?;
        fs::write(&self.path, content)
            .with_context(|| format!("writing {}", self.path.display()))?;
        debug!("Saved {} stations to {}", stations.len(), self.path.display());
        Ok(())
    }

    /// Writes `contents` as the station file on first run. Returns whether
    /// anything was written.
    pub fn seed_if_missing(&self, contents: &str) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&self.path, contents)
            .with_context(|| format!("writing {}", self.path.display()))?;
        debug!("Seeded default stations at {}", self.path.display());
        Ok(true)
    }
}

/// Parses station file content, applying defaults and dial positions.
/// Entries that are not station objects are skipped.
pub fn parse_stations(content: &str) -> Vec<Station> {
    let raw = match serde_json::from_str::<StationFile>(content) {
        Ok(StationFile::Wrapped { stations }) | Ok(StationFile::Bare(stations)) => stations,
        Err(e) => {
            warn!("Ignoring malformed station file: {}", e);
            return Vec::new();
        }
    };

    raw.into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value::<Station>(value) {
            Ok(mut station) => {
                if station.dial_position == 0 {
                    station.dial_position = i as u32 + 1;
                }
                Some(station)
            }
            Err(e) => {
                warn!("Skipping malformed station entry {}: {}", i + 1, e);
                None
            }
        })
        .collect()
}
