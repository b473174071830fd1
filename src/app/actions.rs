use crate::remote::Track;

#[derive(Debug, Clone)]
pub enum Action {
    Quit,

    SetPlaylist(Vec<Track>),
    SelectIndex(usize),

    Play,
    Pause,
    TogglePause,
    Seek(f64),
    SeekRelative(f64),
    Advance,
    Retreat,
    TogglePlayMode,

    MoveWidget { x: f64, y: f64 },
}
