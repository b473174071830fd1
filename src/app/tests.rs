use super::*;
use crate::app::state::ToastKind;
use crate::history::testing::MemorySink;
use crate::remote::Session;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
enum Cmd {
    SetSource(Source),
    Play,
    Pause,
    Stop,
    Seek(f64),
}

#[derive(Clone, Default)]
struct FakeDevice {
    log: Arc<Mutex<Vec<Cmd>>>,
    fail_set_source: bool,
}

impl FakeDevice {
    fn commands(&self) -> Vec<Cmd> {
        self.log.lock().unwrap().clone()
    }

    fn sources(&self) -> Vec<Source> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                Cmd::SetSource(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

#[async_trait]
impl AudioDevice for FakeDevice {
    async fn set_source(&self, source: &Source) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(Cmd::SetSource(source.clone()));
        if self.fail_set_source {
            anyhow::bail!("decoder unavailable");
        }
        Ok(())
    }

    async fn play(&self) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(Cmd::Play);
        Ok(())
    }

    async fn pause(&self) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(Cmd::Pause);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(Cmd::Stop);
        Ok(())
    }

    async fn seek(&self, seconds: f64) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(Cmd::Seek(seconds));
        Ok(())
    }
}

/// Answers every track with `http://cdn/{id}.mp3`, one lyric line and a
/// cover unless told otherwise.
#[derive(Default)]
struct FakeResolver {
    fail_url: HashSet<String>,
    hang_url: HashSet<String>,
    lyrics: HashMap<String, String>,
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn playback_url(&self, track_id: &str) -> anyhow::Result<String> {
        if self.hang_url.contains(track_id) {
            std::future::pending::<()>().await;
        }
        if self.fail_url.contains(track_id) {
            anyhow::bail!("backend returned no url");
        }
        Ok(format!("http://cdn/{track_id}.mp3"))
    }

    async fn cover_url(&self, track_id: &str) -> anyhow::Result<Option<String>> {
        Ok(Some(format!("http://img/{track_id}.jpg")))
    }

    async fn lyric_text(&self, track_id: &str) -> anyhow::Result<Option<String>> {
        Ok(Some(
            self.lyrics
                .get(track_id)
                .cloned()
                .unwrap_or_else(|| format!("[00:01.00]line of {track_id}")),
        ))
    }
}

struct Harness {
    ctrl: Controller,
    rx: mpsc::Receiver<Event>,
    device: FakeDevice,
    sink: Arc<MemorySink>,
    session: Session,
}

impl Harness {
    fn new(resolver: FakeResolver) -> Self {
        Self::with_device(resolver, FakeDevice::default())
    }

    fn with_device(resolver: FakeResolver, device: FakeDevice) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let sink = Arc::new(MemorySink::default());
        let session = Session::default();
        let recorder = HistoryRecorder::new(sink.clone(), session.clone());
        let mut ctrl = Controller::new(
            Box::new(device.clone()),
            Arc::new(resolver),
            recorder,
            tx,
        );
        ctrl.rng = StdRng::seed_from_u64(7);
        Self {
            ctrl,
            rx,
            device,
            sink,
            session,
        }
    }

    /// Apply queued events until nothing arrives for a short while.
    async fn settle(&mut self) {
        while let Ok(Some(ev)) =
            tokio::time::timeout(Duration::from_millis(50), self.rx.recv()).await
        {
            self.ctrl.handle_event(ev).await;
        }
    }

    async fn player(&mut self, ev: PlayerEvent) {
        self.ctrl.handle_event(Event::Player(ev)).await;
    }

    async fn action(&mut self, action: Action) {
        self.ctrl.handle_event(Event::Action(action)).await;
    }

    fn current(&self) -> Option<&str> {
        self.ctrl.state().current_id()
    }

    /// Select `track`, let it resolve and report it as started.
    async fn start(&mut self, track: Track) {
        self.ctrl.select_track_and_play(track).await;
        self.settle().await;
        self.player(PlayerEvent::Started).await;
    }
}

fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter()
        .map(|id| Track {
            id: id.to_string(),
            name: format!("Song {id}"),
            artists: vec!["Singer".into()],
            album: None,
            cover_url: None,
            url: None,
        })
        .collect()
}

fn track(id: &str) -> Track {
    tracks(&[id]).remove(0)
}

#[tokio::test]
async fn select_resets_state_before_resolving() {
    let mut h = Harness::new(FakeResolver::default());
    h.ctrl.select_track_and_play(track("1")).await;

    let s = h.ctrl.state();
    assert_eq!(s.phase, Phase::Loading);
    assert!(s.is_current("1"));
    assert!(!s.is_playing);
    assert_eq!((s.position, s.duration), (0.0, 0.0));
    assert!(s.lyric_lines.is_empty());
    assert_eq!(h.device.commands(), vec![Cmd::Stop]);
}

#[tokio::test]
async fn resolved_url_is_upgraded_and_loaded() {
    let mut h = Harness::new(FakeResolver::default());
    h.ctrl.select_track_and_play(track("1")).await;
    h.settle().await;

    assert_eq!(h.ctrl.state().phase, Phase::Ready);
    let sources = h.device.sources();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].url, "https://cdn/1.mp3");
    assert_eq!(sources[0].title, "Song 1");
    assert_eq!(sources[0].artist, "Singer");

    h.player(PlayerEvent::Started).await;
    assert_eq!(h.ctrl.state().phase, Phase::Playing);
    assert!(h.ctrl.state().is_playing);
}

#[tokio::test]
async fn preset_url_skips_resolution() {
    let mut h = Harness::new(FakeResolver::default());
    let mut t = track("9");
    t.url = Some("http://direct/9.flac".into());

    h.ctrl.select_track_and_play(t).await;
    assert_eq!(h.ctrl.state().phase, Phase::Ready);
    assert_eq!(h.device.sources()[0].url, "https://direct/9.flac");

    // Lyrics and cover still arrive, no second source is set.
    h.settle().await;
    assert_eq!(h.device.sources().len(), 1);
    assert_eq!(h.ctrl.state().lyric_lines.len(), 1);
}

#[tokio::test]
async fn url_failure_surfaces_error() {
    let mut h = Harness::new(FakeResolver {
        fail_url: HashSet::from(["1".to_string()]),
        ..Default::default()
    });
    h.ctrl.select_track_and_play(track("1")).await;
    h.settle().await;

    let toast = h.ctrl.state.take_toast().expect("error toast");
    assert_eq!(toast.kind, ToastKind::Error);
    assert!(toast.message.contains("Unable to get playback URL"));

    let s = h.ctrl.state();
    assert_eq!(s.phase, Phase::Error);
    assert!(!s.is_playing);
    assert!(h.device.sources().is_empty());
}

#[tokio::test]
async fn url_timeout_surfaces_error() {
    let mut h = Harness::new(FakeResolver {
        hang_url: HashSet::from(["1".to_string()]),
        ..Default::default()
    });
    h.ctrl.resolve_timeout = Duration::from_millis(20);

    h.ctrl.select_track_and_play(track("1")).await;
    h.settle().await;

    assert_eq!(h.ctrl.state().phase, Phase::Error);
    assert!(h.device.sources().is_empty());
}

#[tokio::test]
async fn device_rejecting_source_is_an_error() {
    let device = FakeDevice {
        fail_set_source: true,
        ..Default::default()
    };
    let mut h = Harness::with_device(FakeResolver::default(), device);
    h.ctrl.select_track_and_play(track("1")).await;
    h.settle().await;

    assert_eq!(h.ctrl.state().phase, Phase::Error);
    // Nothing was loaded, so play retries from scratch.
    h.device.clear();
    h.ctrl.play().await;
    assert_eq!(h.device.commands()[0], Cmd::Stop);
    assert_eq!(h.ctrl.state().phase, Phase::Loading);
}

#[tokio::test]
async fn stale_url_for_previous_track_is_dropped() {
    let mut h = Harness::new(FakeResolver::default());
    h.ctrl.select_track_and_play(track("1")).await;
    h.ctrl.select_track_and_play(track("2")).await;
    h.settle().await;

    let sources = h.device.sources();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].url, "https://cdn/2.mp3");
    assert!(h.ctrl.state().is_current("2"));
}

#[tokio::test]
async fn stale_lyrics_never_replace_current() {
    let mut h = Harness::new(FakeResolver {
        lyrics: HashMap::from([
            ("X".to_string(), "[00:01.00]from X".to_string()),
            ("Y".to_string(), "[00:01.00]from Y".to_string()),
        ]),
        ..Default::default()
    });
    h.ctrl.select_track_and_play(track("X")).await;
    h.ctrl.select_track_and_play(track("Y")).await;
    h.settle().await;

    let lines = &h.ctrl.state().lyric_lines;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].text, "from Y");

    // A late response for X arriving on its own is ignored as well.
    h.ctrl
        .handle_event(Event::Network(NetworkEvent::LyricsLoaded {
            track_id: "X".into(),
            text: "[00:02.00]late".into(),
        }))
        .await;
    assert_eq!(h.ctrl.state().lyric_lines[0].text, "from Y");
}

#[tokio::test]
async fn cover_fills_current_track_and_playlist() {
    let mut h = Harness::new(FakeResolver::default());
    h.ctrl.set_playlist(&tracks(&["1", "2"]));
    h.ctrl.select_index(0).await;
    h.settle().await;

    let current = h.ctrl.state().current_track.as_ref().unwrap();
    assert_eq!(current.cover_url.as_deref(), Some("https://img/1.jpg"));
    assert_eq!(
        h.ctrl.playlist.get(0).unwrap().cover_url.as_deref(),
        Some("https://img/1.jpg")
    );
    assert_eq!(h.ctrl.playlist.get(1).unwrap().cover_url, None);
}

#[tokio::test]
async fn existing_cover_is_not_fetched() {
    let mut h = Harness::new(FakeResolver::default());
    let mut t = track("1");
    t.cover_url = Some("https://mine.jpg".into());
    h.ctrl.select_track_and_play(t).await;
    h.settle().await;

    let current = h.ctrl.state().current_track.as_ref().unwrap();
    assert_eq!(current.cover_url.as_deref(), Some("https://mine.jpg"));
    assert_eq!(
        h.device.sources()[0].cover_url.as_deref(),
        Some("https://mine.jpg")
    );
}

#[tokio::test]
async fn play_resumes_loaded_track_and_ignores_loading() {
    let mut h = Harness::new(FakeResolver::default());

    // Nothing selected.
    h.ctrl.play().await;
    assert!(h.device.commands().is_empty());

    h.ctrl.select_track_and_play(track("1")).await;
    h.ctrl.play().await;
    assert_eq!(h.device.commands(), vec![Cmd::Stop]);

    h.settle().await;
    h.player(PlayerEvent::Started).await;
    h.action(Action::Pause).await;
    h.player(PlayerEvent::Paused).await;
    assert_eq!(h.ctrl.state().phase, Phase::Paused);

    h.device.clear();
    h.action(Action::Play).await;
    assert_eq!(h.device.commands(), vec![Cmd::Play]);
}

#[tokio::test]
async fn play_after_stop_reselects() {
    let mut h = Harness::new(FakeResolver::default());
    h.start(track("1")).await;
    h.player(PlayerEvent::TimeUpdate { seconds: 12.0 }).await;
    h.player(PlayerEvent::Stopped).await;

    let s = h.ctrl.state();
    assert_eq!(s.phase, Phase::Stopped);
    assert!(!s.is_playing);
    assert_eq!(s.position, 0.0);

    h.device.clear();
    h.ctrl.play().await;
    h.settle().await;
    assert_eq!(h.device.sources().len(), 1);
}

#[tokio::test]
async fn pause_then_paused_event_clears_playing() {
    let mut h = Harness::new(FakeResolver::default());
    h.start(track("1")).await;
    h.player(PlayerEvent::TimeUpdate { seconds: 30.0 }).await;

    h.action(Action::TogglePause).await;
    assert_eq!(h.device.commands().last(), Some(&Cmd::Pause));
    h.player(PlayerEvent::Paused).await;

    let s = h.ctrl.state();
    assert!(!s.is_playing);
    assert_eq!(s.position, 30.0);
}

#[tokio::test]
async fn seek_waits_for_duration_and_clamps() {
    let mut h = Harness::new(FakeResolver::default());
    h.start(track("1")).await;
    h.device.clear();

    h.ctrl.seek(30.0).await;
    assert!(h.device.commands().is_empty());

    h.player(PlayerEvent::DurationReady { seconds: 200.0 }).await;
    h.ctrl.seek(500.0).await;
    h.ctrl.seek(-4.0).await;
    h.player(PlayerEvent::TimeUpdate { seconds: 50.0 }).await;
    h.action(Action::SeekRelative(10.0)).await;
    assert_eq!(
        h.device.commands(),
        vec![Cmd::Seek(200.0), Cmd::Seek(0.0), Cmd::Seek(60.0)]
    );
}

#[tokio::test]
async fn sequential_advance_wraps() {
    let mut h = Harness::new(FakeResolver::default());
    h.ctrl.set_playlist(&tracks(&["A", "B", "C"]));
    h.ctrl.select_index(1).await;

    h.ctrl.advance().await;
    assert_eq!(h.current(), Some("C"));
    h.ctrl.advance().await;
    assert_eq!(h.current(), Some("A"));
    h.ctrl.retreat().await;
    assert_eq!(h.current(), Some("C"));
}

#[tokio::test]
async fn repeat_one_replays_only_on_natural_end() {
    let mut h = Harness::new(FakeResolver::default());
    h.ctrl.set_playlist(&tracks(&["A", "B", "C"]));
    h.ctrl.restore(PlayMode::RepeatOne, WidgetPosition::default());
    h.ctrl.select_index(1).await;
    h.settle().await;
    h.player(PlayerEvent::Started).await;

    h.device.clear();
    h.player(PlayerEvent::Ended).await;
    assert_eq!(h.current(), Some("B"));
    assert_eq!(h.ctrl.state().phase, Phase::Loading);
    assert_eq!(h.device.commands(), vec![Cmd::Stop]);

    h.ctrl.advance().await;
    assert_eq!(h.current(), Some("C"));
}

#[tokio::test]
async fn shuffle_picks_from_playlist() {
    let mut h = Harness::new(FakeResolver::default());
    let list = tracks(&["A", "B", "C", "D"]);
    h.ctrl.set_playlist(&list);
    h.ctrl.restore(PlayMode::Shuffle, WidgetPosition::default());

    for _ in 0..20 {
        h.ctrl.advance().await;
        let id = h.current().unwrap().to_string();
        assert!(list.iter().any(|t| t.id == id));
    }
}

#[tokio::test]
async fn empty_playlist_advance_is_a_no_op() {
    let mut h = Harness::new(FakeResolver::default());
    h.ctrl.advance().await;
    h.player(PlayerEvent::Ended).await;
    assert!(h.current().is_none());
    assert!(h.device.commands().is_empty());
}

#[tokio::test]
async fn plays_through_playlist_end_to_end() {
    let mut h = Harness::new(FakeResolver::default());
    h.ctrl.set_playlist(&tracks(&["1", "2"]));
    h.start(track("1")).await;
    h.player(PlayerEvent::DurationReady { seconds: 180.0 }).await;
    h.player(PlayerEvent::TimeUpdate { seconds: 180.0 }).await;

    h.player(PlayerEvent::Ended).await;
    assert!(h.ctrl.state().is_current("2"));
    h.settle().await;
    h.player(PlayerEvent::Started).await;

    let urls: Vec<_> = h.device.sources().into_iter().map(|s| s.url).collect();
    assert_eq!(urls, vec!["https://cdn/1.mp3", "https://cdn/2.mp3"]);
    let s = h.ctrl.state();
    assert_eq!(s.phase, Phase::Playing);
    assert_eq!((s.position, s.duration), (0.0, 0.0));
    assert_eq!(s.lyric_lines[0].text, "line of 2");

    h.player(PlayerEvent::Ended).await;
    assert!(h.ctrl.state().is_current("1"));
}

#[tokio::test]
async fn device_events_for_old_source_ignored_while_loading() {
    let mut h = Harness::new(FakeResolver::default());
    h.ctrl.set_playlist(&tracks(&["1", "2", "3"]));
    h.ctrl.select_index(0).await;

    h.player(PlayerEvent::TimeUpdate { seconds: 99.0 }).await;
    h.player(PlayerEvent::DurationReady { seconds: 120.0 }).await;
    h.player(PlayerEvent::Error("old stream".into())).await;
    h.player(PlayerEvent::Ended).await;

    let s = h.ctrl.state();
    assert!(s.is_current("1"));
    assert_eq!(s.phase, Phase::Loading);
    assert_eq!((s.position, s.duration), (0.0, 0.0));
    assert!(s.toast.is_none());
}

#[tokio::test]
async fn late_end_of_replaced_track_keeps_new_selection() {
    let mut h = Harness::new(FakeResolver::default());
    let mut list = tracks(&["A", "B", "C"]);
    for t in &mut list {
        t.url = Some(format!("https://cdn/{}.mp3", t.id));
    }
    h.ctrl.set_playlist(&list);
    h.ctrl.select_index(0).await;
    h.player(PlayerEvent::Started).await;
    h.player(PlayerEvent::TimeUpdate { seconds: 40.0 }).await;

    h.ctrl.select_index(1).await;
    assert_eq!(h.ctrl.state().phase, Phase::Ready);
    h.player(PlayerEvent::TimeUpdate { seconds: 41.0 }).await;
    h.player(PlayerEvent::Ended).await;

    let s = h.ctrl.state();
    assert_eq!(s.current_id(), Some("B"));
    assert_eq!(s.phase, Phase::Ready);
    assert_eq!(s.position, 0.0);

    h.player(PlayerEvent::Started).await;
    assert_eq!(h.ctrl.state().phase, Phase::Playing);
    h.player(PlayerEvent::Ended).await;
    assert_eq!(h.current(), Some("C"));
}

#[tokio::test]
async fn device_error_mid_play_is_transient() {
    let mut h = Harness::new(FakeResolver::default());
    h.start(track("1")).await;
    h.player(PlayerEvent::TimeUpdate { seconds: 5.0 }).await;

    h.player(PlayerEvent::Error("buffer underrun".into())).await;
    assert_eq!(h.ctrl.state().phase, Phase::Playing);
    assert!(h.ctrl.state().toast.is_none());
}

#[tokio::test]
async fn device_error_before_playing_is_fatal() {
    let mut h = Harness::new(FakeResolver::default());
    h.ctrl.select_track_and_play(track("1")).await;
    h.settle().await;

    h.player(PlayerEvent::Error("unsupported codec".into())).await;
    let s = h.ctrl.state();
    assert_eq!(s.phase, Phase::Error);
    assert!(!s.is_playing);
    assert_eq!(s.toast.as_ref().map(|t| t.kind), Some(ToastKind::Error));
}

#[tokio::test]
async fn history_recorded_only_when_logged_in() {
    let mut h = Harness::new(FakeResolver::default());
    h.ctrl.select_track_and_play(track("1")).await;
    h.settle().await;
    assert!(h.sink.recorded.lock().unwrap().is_empty());

    h.session.set_user(serde_json::json!({"id": 3}));
    h.ctrl.select_track_and_play(track("2")).await;
    h.settle().await;
    assert_eq!(*h.sink.recorded.lock().unwrap(), vec!["2".to_string()]);
}

#[tokio::test]
async fn set_playlist_takes_a_copy() {
    let mut h = Harness::new(FakeResolver::default());
    let mut list = tracks(&["1", "2"]);
    h.action(Action::SetPlaylist(list.clone())).await;
    list[0].name = "renamed".into();
    list.clear();

    assert_eq!(h.ctrl.playlist.len(), 2);
    assert_eq!(h.ctrl.playlist.get(0).unwrap().name, "Song 1");
    // The current track is left alone.
    assert!(h.current().is_none());
}

#[tokio::test]
async fn toggle_play_mode_cycles_with_notice() {
    let mut h = Harness::new(FakeResolver::default());
    h.action(Action::TogglePlayMode).await;
    assert_eq!(h.ctrl.state().play_mode, PlayMode::RepeatOne);
    let toast = h.ctrl.state.take_toast().unwrap();
    assert_eq!(toast.kind, ToastKind::Info);
    assert_eq!(toast.message, "Repeat one");

    h.action(Action::TogglePlayMode).await;
    h.action(Action::TogglePlayMode).await;
    assert_eq!(h.ctrl.state().play_mode, PlayMode::Sequential);
}

#[tokio::test]
async fn select_index_out_of_range_notifies() {
    let mut h = Harness::new(FakeResolver::default());
    h.ctrl.set_playlist(&tracks(&["1"]));
    h.action(Action::SelectIndex(4)).await;
    assert!(h.current().is_none());
    assert_eq!(
        h.ctrl.state().toast.as_ref().map(|t| t.message.as_str()),
        Some("No track at position 5")
    );
}

#[tokio::test]
async fn run_stops_on_quit() {
    let h = Harness::new(FakeResolver::default());
    let Harness { mut ctrl, rx, .. } = h;
    let tx = ctrl.tx.clone();
    tx.send(Event::Action(Action::MoveWidget { x: 3.0, y: 4.0 }))
        .await
        .unwrap();
    tx.send(Event::Action(Action::Quit)).await.unwrap();

    let mut draws = 0;
    ctrl.run(rx, |_, _| draws += 1).await;
    assert!(ctrl.state().should_quit);
    assert_eq!(ctrl.state().widget_position, WidgetPosition { x: 3.0, y: 4.0 });
    assert_eq!(draws, 2);
}
