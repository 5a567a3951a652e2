use anyhow::Result;
use log::{debug, warn};

pub const DEFAULT_VOLUME: u8 = 80;

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackState {
    Stopped,
    Connecting,
    Playing,
    Paused,
    Error(String),
}

impl PlaybackState {
    pub fn label(&self) -> &'static str {
        match self {
            PlaybackState::Stopped => "STOPPED",
            PlaybackState::Connecting => "CONNECTING",
            PlaybackState::Playing => "PLAYING",
            PlaybackState::Paused => "PAUSED",
            PlaybackState::Error(_) => "ERROR",
        }
    }
}

/// The streaming audio engine the player drives. Decoding, buffering and
/// output all live behind this boundary.
pub trait AudioEngine {
    /// Start streaming `url`, replacing whatever was loaded.
    fn play(&self, url: &str) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    /// `volume` is linear gain in 0.0..=1.0.
    fn set_volume(&self, volume: f32);
    fn state(&self) -> PlaybackState;

    fn is_playing(&self) -> bool {
        matches!(self.state(), PlaybackState::Playing)
    }
}

/// Clamp any requested volume into 0..=100.
pub fn clamp_volume(volume: i64) -> u8 {
    volume.clamp(0, 100) as u8
}

/// Single playback handle. When the engine could not be created the
/// controller is disabled and every operation is a no-op.
pub struct PlaybackController {
    engine: Option<Box<dyn AudioEngine>>,
    volume: u8,
}

impl PlaybackController {
    pub fn new(engine: Box<dyn AudioEngine>, volume: i64) -> Self {
        Self::with_engine(Some(engine), volume)
    }

    pub fn disabled(volume: i64) -> Self {
        Self::with_engine(None, volume)
    }

    fn with_engine(engine: Option<Box<dyn AudioEngine>>, volume: i64) -> Self {
        let controller = Self {
            engine,
            volume: clamp_volume(volume),
        };
        if let Some(engine) = &controller.engine {
            engine.set_volume(controller.gain());
        }
        controller
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    fn gain(&self) -> f32 {
        f32::from(self.volume) / 100.0
    }

    pub fn play(&self, url: &str) -> Result<()> {
        let Some(engine) = &self.engine else {
            return Ok(());
        };
        debug!("Starting playback of {} at volume {}", url, self.volume);
        engine.set_volume(self.gain());
        engine.play(url)
    }

    pub fn pause(&self) -> Result<()> {
        match &self.engine {
            Some(engine) => engine.pause(),
            None => Ok(()),
        }
    }

    pub fn stop(&self) {
        if let Some(engine) = &self.engine {
            if let Err(e) = engine.stop() {
                warn!("Failed to stop playback: {}", e);
            }
        }
    }

    /// Returns the value actually applied.
    pub fn set_volume(&mut self, volume: i64) -> u8 {
        self.volume = clamp_volume(volume);
        if let Some(engine) = &self.engine {
            engine.set_volume(self.gain());
        }
        self.volume
    }

    pub fn is_playing(&self) -> bool {
        self.engine.as_ref().is_some_and(|engine| engine.is_playing())
    }

    pub fn state(&self) -> PlaybackState {
        self.engine
            .as_ref()
            .map_or(PlaybackState::Stopped, |engine| engine.state())
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeEngine;
    use super::*;

    #[test]
    fn test_clamp_volume() {
        assert_eq!(clamp_volume(-20), 0);
        assert_eq!(clamp_volume(0), 0);
        assert_eq!(clamp_volume(55), 55);
        assert_eq!(clamp_volume(100), 100);
        assert_eq!(clamp_volume(i64::MAX), 100);
        assert_eq!(clamp_volume(i64::MIN), 0);
    }

    #[test]
    fn test_set_volume_applies_to_engine() {
        let engine = FakeEngine::default();
        let mut controller = PlaybackController::new(Box::new(engine.clone()), 80);
        assert!((engine.log.borrow().volume - 0.8).abs() < f32::EPSILON);

        assert_eq!(controller.set_volume(250), 100);
        assert!((engine.log.borrow().volume - 1.0).abs() < f32::EPSILON);

        assert_eq!(controller.set_volume(-3), 0);
        assert_eq!(controller.volume(), 0);
        assert_eq!(engine.log.borrow().volume, 0.0);
    }

    #[test]
    fn test_play_pause_stop() {
        let engine = FakeEngine::default();
        let controller = PlaybackController::new(Box::new(engine.clone()), 50);

        controller.play("http://x/a").unwrap();
        assert!(controller.is_playing());
        assert_eq!(engine.log.borrow().played, vec!["http://x/a".to_string()]);

        controller.pause().unwrap();
        assert!(!controller.is_playing());
        assert_eq!(controller.state(), PlaybackState::Paused);

        controller.stop();
        controller.stop();
        assert_eq!(engine.log.borrow().stops, 2);
        assert_eq!(controller.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_disabled_controller_is_inert() {
        let mut controller = PlaybackController::disabled(120);
        assert!(!controller.is_available());
        assert_eq!(controller.volume(), 100);

        controller.play("http://x/a").unwrap();
        assert!(!controller.is_playing());
        controller.pause().unwrap();
        controller.stop();
        assert_eq!(controller.set_volume(40), 40);
        assert_eq!(controller.state(), PlaybackState::Stopped);
    }
}
