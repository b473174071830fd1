use crate::app::actions::Action;

#[derive(Debug, Clone)]
pub enum Event {
    Input(InputEvent),
    Action(Action),
    Player(PlayerEvent),
    Network(NetworkEvent),
}

#[derive(Debug, Clone)]
pub enum InputEvent {
    Line(String),
    Closed,
}

/// Lifecycle callbacks from the audio device.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Started,
    Paused,
    Stopped,
    Ended,
    TimeUpdate { seconds: f64 },
    DurationReady { seconds: f64 },
    Error(String),
}

/// Resolver results, tagged with the track they were issued for.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    UrlResolved { track_id: String, url: String },
    UrlFailed { track_id: String, error: String },
    CoverResolved { track_id: String, url: String },
    LyricsLoaded { track_id: String, text: String },
}
