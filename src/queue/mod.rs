use crate::app::state::PlayMode;
use crate::remote::Track;
use rand::Rng;

/// What to play after a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    /// Play the current track again.
    Replay,
    /// Play the playlist entry at this index.
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

#[derive(Debug, Clone, Default)]
pub struct Playlist {
    tracks: Vec<Track>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole playlist with an owned copy of `tracks`.
    pub fn set(&mut self, tracks: &[Track]) {
        self.tracks = tracks.to_vec();
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Position of the first entry with this id.
    pub fn position_of(&self, track_id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == track_id)
    }

    /// Fill in a missing cover on every entry with this id.
    pub fn enrich_cover(&mut self, track_id: &str, cover_url: &str) {
        for t in self.tracks.iter_mut().filter(|t| t.id == track_id) {
            if t.cover_url.is_none() {
                t.cover_url = Some(cover_url.to_string());
            }
        }
    }

    /// Decide what comes after (or before) `current` under `mode`.
    ///
    /// - Shuffle picks any entry uniformly, the current one included.
    /// - RepeatOne replays the current track, but only when the track ended
    ///   on its own (`auto`); manual skips behave as Sequential.
    /// - Sequential steps from the first entry matching `current`, wrapping
    ///   at both ends; an unknown current track starts from index 0.
    ///
    /// Returns `None` for an empty playlist.
    pub fn pick<R: Rng>(
        &self,
        current: Option<&str>,
        mode: PlayMode,
        direction: Direction,
        auto: bool,
        rng: &mut R,
    ) -> Option<Pick> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }

        match mode {
            PlayMode::RepeatOne if auto && direction == Direction::Next && current.is_some() => {
                Some(Pick::Replay)
            }
            PlayMode::Shuffle => Some(Pick::Index(rng.random_range(0..len))),
            _ => {
                let index = match current.and_then(|id| self.position_of(id)) {
                    None => 0,
                    Some(i) => match direction {
                        Direction::Next => (i + 1) % len,
                        Direction::Prev => (i + len - 1) % len,
                    },
                };
                Some(Pick::Index(index))
            }
        }
    }
}
