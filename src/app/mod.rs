pub mod actions;
pub mod events;
pub mod state;

#[cfg(test)]
mod tests;

use crate::history::HistoryRecorder;
use crate::input;
use crate::lyrics;
use crate::player::{AudioDevice, Source};
use crate::queue::{Direction, Pick, Playlist};
use crate::remote::{Track, TrackResolver, secure_url};
use actions::Action;
use events::{Event, NetworkEvent, PlayerEvent};
use rand::SeedableRng;
use rand::rngs::StdRng;
use state::{Phase, PlayMode, PlaybackState, Toast, WidgetPosition};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Owns the playback session: current track, playlist, play mode and
/// transport position.
///
/// All mutation goes through `&mut self`, either from caller actions or from
/// events delivered on the app channel. Resolver work runs on spawned tasks
/// and comes back as [`NetworkEvent`]s tagged with the track id it was issued
/// for; anything tagged with a track that is no longer current is dropped.
pub struct Controller {
    state: PlaybackState,
    playlist: Playlist,
    device: Box<dyn AudioDevice>,
    resolver: Arc<dyn TrackResolver>,
    recorder: HistoryRecorder,
    tx: mpsc::Sender<Event>,
    rng: StdRng,
    /// Track whose stream the device currently holds.
    loaded_source: Option<String>,
    resolve_timeout: Duration,
}

impl Controller {
    pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(
        device: Box<dyn AudioDevice>,
        resolver: Arc<dyn TrackResolver>,
        recorder: HistoryRecorder,
        tx: mpsc::Sender<Event>,
    ) -> Self {
        Self {
            state: PlaybackState::new(),
            playlist: Playlist::new(),
            device,
            resolver,
            recorder,
            tx,
            rng: StdRng::from_os_rng(),
            loaded_source: None,
            resolve_timeout: Self::DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Restore persisted preferences.
    pub fn restore(&mut self, mode: PlayMode, widget: WidgetPosition) {
        self.state.play_mode = mode;
        self.state.widget_position = widget;
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Process events until the channel closes or a quit is requested.
    /// `draw` runs after every event with the current state and any new
    /// notice.
    pub async fn run(
        &mut self,
        mut rx: mpsc::Receiver<Event>,
        mut draw: impl FnMut(&PlaybackState, Option<Toast>),
    ) {
        draw(&self.state, None);
        while let Some(ev) = rx.recv().await {
            self.handle_event(ev).await;
            if self.state.should_quit {
                break;
            }
            let toast = self.state.take_toast();
            draw(&self.state, toast);
        }
    }

    pub async fn handle_event(&mut self, ev: Event) {
        match ev {
            Event::Input(ie) => {
                if let Some(action) = input::map_input_to_action(&self.state, ie) {
                    self.handle_action(action).await;
                }
            }
            Event::Action(action) => self.handle_action(action).await,
            Event::Player(pe) => self.handle_player(pe).await,
            Event::Network(ne) => self.handle_network(ne).await,
        }
    }

    pub async fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.state.should_quit = true,
            Action::SetPlaylist(tracks) => self.set_playlist(&tracks),
            Action::SelectIndex(index) => self.select_index(index).await,
            Action::Play => self.play().await,
            Action::Pause => self.pause().await,
            Action::TogglePause => self.toggle_pause().await,
            Action::Seek(seconds) => self.seek(seconds).await,
            Action::SeekRelative(delta) => self.seek(self.state.position + delta).await,
            Action::Advance => self.advance().await,
            Action::Retreat => self.retreat().await,
            Action::TogglePlayMode => self.toggle_play_mode(),
            Action::MoveWidget { x, y } => self.state.widget_position = WidgetPosition { x, y },
        }
    }

    pub fn set_playlist(&mut self, tracks: &[Track]) {
        self.playlist.set(tracks);
        self.state.status = format!("Playlist: {} tracks", self.playlist.len());
    }

    /// Make `track` current and start loading it.
    ///
    /// Local state is reset before anything is awaited, so later actions see
    /// `Loading` straight away.
    pub async fn select_track_and_play(&mut self, track: Track) {
        tracing::info!(track_id = %track.id, name = %track.name, "select track");
        self.loaded_source = None;
        self.state.begin_loading(track.clone());

        if let Err(e) = self.device.stop().await {
            tracing::warn!("device stop failed: {e:#}");
        }

        if track.cover_url.is_none() {
            self.spawn_resolve_cover(track.id.clone());
        }
        self.spawn_resolve_lyrics(track.id.clone());

        match &track.url {
            Some(url) => self.apply_url(&track.id, url).await,
            None => self.spawn_resolve_url(track.id.clone()),
        }
    }

    pub async fn select_index(&mut self, index: usize) {
        match self.playlist.get(index).cloned() {
            Some(track) => self.select_track_and_play(track).await,
            None => self
                .state
                .notify(Toast::error(format!("No track at position {}", index + 1))),
        }
    }

    pub async fn play(&mut self) {
        let Some(track) = self.state.current_track.clone() else {
            return;
        };
        if self.state.phase == Phase::Loading {
            tracing::debug!(track_id = %track.id, "play ignored while loading");
            return;
        }
        if self.loaded_source.as_deref() == Some(track.id.as_str()) {
            if let Err(e) = self.device.play().await {
                tracing::warn!("device play failed: {e:#}");
            }
        } else {
            self.select_track_and_play(track).await;
        }
    }

    pub async fn pause(&mut self) {
        if let Err(e) = self.device.pause().await {
            tracing::warn!("device pause failed: {e:#}");
        }
    }

    pub async fn toggle_pause(&mut self) {
        if self.state.is_playing {
            self.pause().await;
        } else {
            self.play().await;
        }
    }

    /// Seek to `seconds`, clamped to the known duration. No-op until the
    /// duration is known.
    pub async fn seek(&mut self, seconds: f64) {
        if self.state.duration <= 0.0 {
            tracing::debug!("seek ignored, duration unknown");
            return;
        }
        let target = seconds.clamp(0.0, self.state.duration);
        if let Err(e) = self.device.seek(target).await {
            tracing::warn!("device seek failed: {e:#}");
        }
    }

    /// Manual skip forward.
    pub async fn advance(&mut self) {
        self.navigate(Direction::Next, false).await;
    }

    pub async fn retreat(&mut self) {
        self.navigate(Direction::Prev, false).await;
    }

    pub fn toggle_play_mode(&mut self) {
        self.state.play_mode = self.state.play_mode.next();
        self.state.notify(Toast::info(self.state.play_mode.label()));
    }

    async fn navigate(&mut self, direction: Direction, auto: bool) {
        if self.playlist.is_empty() {
            tracing::debug!("playlist empty, nothing to play");
            return;
        }
        let current = self.state.current_id().map(str::to_string);
        let Some(pick) = self.playlist.pick(
            current.as_deref(),
            self.state.play_mode,
            direction,
            auto,
            &mut self.rng,
        ) else {
            return;
        };

        let track = match pick {
            Pick::Replay => self.state.current_track.clone(),
            Pick::Index(i) => self.playlist.get(i).cloned(),
        };
        if let Some(track) = track {
            self.select_track_and_play(track).await;
        }
    }

    async fn handle_player(&mut self, pe: PlayerEvent) {
        let loading = self.state.phase == Phase::Loading;
        // A new source is set but has not started; progress and end-of-file
        // still come from the one it replaced.
        let replaced = loading || self.state.phase == Phase::Ready;
        match pe {
            PlayerEvent::Started => {
                self.state.is_playing = true;
                if matches!(self.state.phase, Phase::Ready | Phase::Paused) {
                    self.state.phase = Phase::Playing;
                    if let Some(t) = &self.state.current_track {
                        self.state.status = format!("Playing {}", t.name);
                    }
                }
            }
            PlayerEvent::Paused => {
                self.state.is_playing = false;
                if matches!(self.state.phase, Phase::Playing | Phase::Ready) {
                    self.state.phase = Phase::Paused;
                    self.state.status = "Paused".into();
                }
            }
            PlayerEvent::Stopped => {
                self.state.is_playing = false;
                self.state.position = 0.0;
                if matches!(self.state.phase, Phase::Playing | Phase::Paused) {
                    self.state.phase = Phase::Stopped;
                    self.loaded_source = None;
                    self.state.status = "Stopped".into();
                }
            }
            // Until the new source is set, these belong to the replaced one.
            PlayerEvent::DurationReady { .. } | PlayerEvent::Error(_) if loading => {
                tracing::debug!("dropping device event while loading");
            }
            PlayerEvent::TimeUpdate { .. } | PlayerEvent::Ended if replaced => {
                tracing::debug!(phase = ?self.state.phase, "dropping event of replaced source");
            }
            PlayerEvent::TimeUpdate { seconds } => self.state.set_position(seconds),
            PlayerEvent::DurationReady { seconds } => self.state.set_duration(seconds),
            PlayerEvent::Ended => {
                self.state.is_playing = false;
                self.navigate(Direction::Next, true).await;
            }
            PlayerEvent::Error(info) => {
                if self.state.is_playing && self.state.position > 0.0 {
                    tracing::warn!(position = self.state.position, "transient device error ignored: {info}");
                    return;
                }
                self.fail_attempt(format!("Audio playback error: {info}"));
            }
        }
    }

    async fn handle_network(&mut self, ne: NetworkEvent) {
        match ne {
            NetworkEvent::UrlResolved { track_id, url } => self.apply_url(&track_id, &url).await,
            NetworkEvent::UrlFailed { track_id, error } => {
                if !self.state.is_current(&track_id) || self.state.phase != Phase::Loading {
                    tracing::debug!(%track_id, "discarding stale url failure");
                    return;
                }
                self.fail_attempt(format!("Unable to get playback URL: {error}"));
            }
            NetworkEvent::CoverResolved { track_id, url } => {
                let url = secure_url(&url);
                let Some(track) = self
                    .state
                    .current_track
                    .as_mut()
                    .filter(|t| t.id == track_id)
                else {
                    tracing::debug!(%track_id, "discarding stale cover");
                    return;
                };
                if track.cover_url.is_none() {
                    track.cover_url = Some(url.clone());
                }
                self.playlist.enrich_cover(&track_id, &url);
            }
            NetworkEvent::LyricsLoaded { track_id, text } => {
                if !self.state.is_current(&track_id) {
                    tracing::debug!(%track_id, "discarding stale lyrics");
                    return;
                }
                self.state.lyric_lines = lyrics::parse(&text);
                tracing::debug!(%track_id, lines = self.state.lyric_lines.len(), "lyrics loaded");
            }
        }
    }

    /// Hand a resolved stream to the device, if it still belongs to the
    /// track being loaded.
    async fn apply_url(&mut self, track_id: &str, url: &str) {
        if !self.state.is_current(track_id) || self.state.phase != Phase::Loading {
            tracing::debug!(track_id, "discarding stale playback url");
            return;
        }
        let Some(track) = self.state.current_track.clone() else {
            return;
        };

        let source = Source {
            url: secure_url(url),
            title: track.name.clone(),
            artist: track.artist_line(),
            cover_url: track.cover_url.clone(),
        };
        match self.device.set_source(&source).await {
            Ok(()) => {
                self.loaded_source = Some(track.id.clone());
                self.state.phase = Phase::Ready;
                self.state.status = format!("Buffering {}", track.name);
                self.recorder.record(&track);
            }
            Err(e) => self.fail_attempt(format!("Playback failed: {e:#}")),
        }
    }

    fn fail_attempt(&mut self, message: String) {
        self.state.phase = Phase::Error;
        self.state.is_playing = false;
        self.loaded_source = None;
        self.state.status = message.clone();
        self.state.notify(Toast::error(message));
    }

    fn spawn_resolve_url(&self, track_id: String) {
        let resolver = self.resolver.clone();
        let tx = self.tx.clone();
        let timeout = self.resolve_timeout;
        tokio::spawn(async move {
            let ev = match tokio::time::timeout(timeout, resolver.playback_url(&track_id)).await {
                Ok(Ok(url)) => NetworkEvent::UrlResolved { track_id, url },
                Ok(Err(e)) => NetworkEvent::UrlFailed {
                    track_id,
                    error: format!("{e:#}"),
                },
                Err(_) => NetworkEvent::UrlFailed {
                    track_id,
                    error: format!("timed out after {timeout:?}"),
                },
            };
            let _ = tx.send(Event::Network(ev)).await;
        });
    }

    fn spawn_resolve_cover(&self, track_id: String) {
        let resolver = self.resolver.clone();
        let tx = self.tx.clone();
        let timeout = self.resolve_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, resolver.cover_url(&track_id)).await {
                Ok(Ok(Some(url))) => {
                    let _ = tx
                        .send(Event::Network(NetworkEvent::CoverResolved { track_id, url }))
                        .await;
                }
                Ok(Ok(None)) => tracing::debug!(%track_id, "no cover"),
                Ok(Err(e)) => tracing::warn!(%track_id, "cover lookup failed: {e:#}"),
                Err(_) => tracing::warn!(%track_id, "cover lookup timed out"),
            }
        });
    }

    fn spawn_resolve_lyrics(&self, track_id: String) {
        let resolver = self.resolver.clone();
        let tx = self.tx.clone();
        let timeout = self.resolve_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, resolver.lyric_text(&track_id)).await {
                Ok(Ok(Some(text))) => {
                    let _ = tx
                        .send(Event::Network(NetworkEvent::LyricsLoaded { track_id, text }))
                        .await;
                }
                Ok(Ok(None)) => tracing::debug!(%track_id, "no lyrics"),
                Ok(Err(e)) => tracing::warn!(%track_id, "lyrics lookup failed: {e:#}"),
                Err(_) => tracing::warn!(%track_id, "lyrics lookup timed out"),
            }
        });
    }
}
