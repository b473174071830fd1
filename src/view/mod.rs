//! Plain stdout rendering for the interactive player and the listing
//! commands. Only changes are printed, one line each.

use crate::app::state::{Phase, PlaybackState, Toast, ToastKind};
use crate::remote::Track;
use crate::remote::models::Playlist;
use std::io::Write;

/// Prints what changed since the previous draw.
#[derive(Debug, Default)]
pub struct Console {
    track_id: Option<String>,
    phase: Phase,
    lyric_index: Option<usize>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, out: &mut impl Write, state: &PlaybackState, toast: Option<Toast>) {
        let _ = self.render(out, state, toast);
    }

    fn render(
        &mut self,
        out: &mut impl Write,
        state: &PlaybackState,
        toast: Option<Toast>,
    ) -> std::io::Result<()> {
        let track_id = state.current_id().map(str::to_string);
        if track_id != self.track_id {
            self.track_id = track_id;
            self.lyric_index = None;
            if let Some(t) = &state.current_track {
                writeln!(out, "> {} - {}", truncate_str(&t.name, 60), t.artist_line())?;
            }
        }

        if state.phase != self.phase {
            self.phase = state.phase;
            match state.phase {
                Phase::Playing => writeln!(
                    out,
                    "  [playing {}] {}",
                    clock(state.position, state.duration),
                    state.play_mode.label()
                )?,
                Phase::Paused => writeln!(out, "  [paused {}]", clock(state.position, state.duration))?,
                Phase::Stopped => writeln!(out, "  [stopped]")?,
                Phase::Idle | Phase::Loading | Phase::Ready | Phase::Error => {}
            }
        }

        let lyric_index = state.current_lyric_index();
        if lyric_index != self.lyric_index {
            self.lyric_index = lyric_index;
            if let Some(line) = state.current_lyric() {
                writeln!(out, "  ♪ {}", line.text)?;
            }
        }

        if let Some(toast) = toast {
            let prefix = match toast.kind {
                ToastKind::Info => "*",
                ToastKind::Error => "!",
            };
            writeln!(out, "{prefix} {}", toast.message)?;
        }
        out.flush()
    }
}

pub fn mmss(secs: f64) -> String {
    let secs = secs.max(0.0).floor() as u64;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// `mm:ss/mm:ss`
pub fn clock(position: f64, duration: f64) -> String {
    format!("{}/{}", mmss(position), mmss(duration))
}

pub fn print_tracks(tracks: &[Track]) {
    for (i, t) in tracks.iter().enumerate() {
        let album = t
            .album
            .as_deref()
            .map(|a| format!(" [{a}]"))
            .unwrap_or_default();
        println!("{:02}. {} - {}{}  (id={})", i + 1, t.name, t.artist_line(), album, t.id);
    }
}

pub fn print_playlists(playlists: &[Playlist]) {
    for (i, p) in playlists.iter().enumerate() {
        println!("{:02}. {}  (id={})", i + 1, p.name, p.id);
    }
}

fn truncate_str(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{truncated}...")
    } else {
        s.chars().take(max_len).collect()
    }
}
