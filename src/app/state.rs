use crate::lyrics::{self, LyricLine};
use crate::remote::Track;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PlayMode {
    #[default]
    Sequential,
    RepeatOne,
    Shuffle,
}

impl PlayMode {
    pub fn next(self) -> Self {
        match self {
            PlayMode::Sequential => PlayMode::RepeatOne,
            PlayMode::RepeatOne => PlayMode::Shuffle,
            PlayMode::Shuffle => PlayMode::Sequential,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PlayMode::Sequential => "Sequential play",
            PlayMode::RepeatOne => "Repeat one",
            PlayMode::Shuffle => "Shuffle",
        }
    }
}

/// Where the controller is in loading/playing the current track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No track selected.
    #[default]
    Idle,
    /// Track selected, waiting for its playback URL.
    Loading,
    /// Source handed to the device, waiting for it to start.
    Ready,
    Playing,
    Paused,
    Stopped,
    /// The last attempt to play the current track failed.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WidgetPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    pub kind: ToastKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Error,
}

impl Toast {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ToastKind::Info,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ToastKind::Error,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    pub should_quit: bool,

    pub current_track: Option<Track>,
    pub play_mode: PlayMode,
    pub phase: Phase,
    /// Mirrors the last device lifecycle event.
    pub is_playing: bool,
    pub position: f64,
    pub duration: f64,
    pub lyric_lines: Vec<LyricLine>,

    pub widget_position: WidgetPosition,

    pub toast: Option<Toast>,
    pub status: String,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current_track.as_ref().map(|t| t.id.as_str())
    }

    pub fn is_current(&self, track_id: &str) -> bool {
        self.current_id() == Some(track_id)
    }

    /// Reset everything derived from the previous track and start loading
    /// `track`.
    pub fn begin_loading(&mut self, track: Track) {
        self.status = format!("Loading {}", track.name);
        self.current_track = Some(track);
        self.phase = Phase::Loading;
        self.is_playing = false;
        self.position = 0.0;
        self.duration = 0.0;
        self.lyric_lines.clear();
    }

    pub fn set_position(&mut self, seconds: f64) {
        let seconds = seconds.max(0.0);
        self.position = if self.duration > 0.0 {
            seconds.min(self.duration)
        } else {
            seconds
        };
    }

    pub fn set_duration(&mut self, seconds: f64) {
        self.duration = seconds.max(0.0);
        if self.duration > 0.0 && self.position > self.duration {
            self.position = self.duration;
        }
    }

    pub fn current_lyric_index(&self) -> Option<usize> {
        lyrics::current_line_index(&self.lyric_lines, self.position)
    }

    pub fn current_lyric(&self) -> Option<&LyricLine> {
        self.current_lyric_index().map(|i| &self.lyric_lines[i])
    }

    pub fn notify(&mut self, toast: Toast) {
        match toast.kind {
            ToastKind::Info => tracing::info!("{}", toast.message),
            ToastKind::Error => tracing::warn!("{}", toast.message),
        }
        self.toast = Some(toast);
    }

    pub fn take_toast(&mut self) -> Option<Toast> {
        self.toast.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_mode_cycles() {
        let m = PlayMode::Sequential;
        assert_eq!(m.next(), PlayMode::RepeatOne);
        assert_eq!(m.next().next(), PlayMode::Shuffle);
        assert_eq!(m.next().next().next(), PlayMode::Sequential);
    }

    #[test]
    fn position_never_exceeds_known_duration() {
        let mut s = PlaybackState::new();
        s.set_position(500.0);
        assert_eq!(s.position, 500.0);
        s.set_duration(200.0);
        assert_eq!(s.position, 200.0);
        s.set_position(250.0);
        assert_eq!(s.position, 200.0);
        s.set_position(-3.0);
        assert_eq!(s.position, 0.0);
    }

    #[test]
    fn begin_loading_clears_derived_state() {
        let mut s = PlaybackState::new();
        s.is_playing = true;
        s.set_duration(100.0);
        s.set_position(40.0);
        s.lyric_lines = lyrics::parse("[00:01]x");

        s.begin_loading(Track::from_id("2"));
        assert_eq!(s.phase, Phase::Loading);
        assert!(!s.is_playing);
        assert_eq!((s.position, s.duration), (0.0, 0.0));
        assert!(s.lyric_lines.is_empty());
        assert!(s.is_current("2"));
    }
}
