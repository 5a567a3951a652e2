//! Messages posted from background workers to the UI loop
use crate::recorder::RecordOutcome;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Notification {
    RecordingFinished { path: PathBuf, outcome: RecordOutcome },
}
