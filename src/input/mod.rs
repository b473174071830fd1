use crate::app::actions::Action;
use crate::app::events::{Event, InputEvent};
use crate::app::state::PlaybackState;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Forward stdin lines as input events until EOF or the app goes away.
pub fn spawn_input_task(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(Event::Input(InputEvent::Line(line))).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("stdin read failed: {e}");
                    break;
                }
            }
        }
        let _ = tx.send(Event::Input(InputEvent::Closed)).await;
    });
}

pub fn map_input_to_action(state: &PlaybackState, ev: InputEvent) -> Option<Action> {
    match ev {
        InputEvent::Closed => Some(Action::Quit),
        InputEvent::Line(line) => parse_command(state, &line),
    }
}

fn parse_command(state: &PlaybackState, line: &str) -> Option<Action> {
    let mut words = line.split_whitespace();
    let head = words.next()?;
    let rest: Vec<&str> = words.collect();

    match (head, rest.as_slice()) {
        ("q" | "quit", []) => Some(Action::Quit),

        // Playback
        ("p" | "play", []) => Some(Action::Play),
        ("pause", []) => Some(Action::Pause),
        ("t" | "toggle", []) => Some(Action::TogglePause),
        ("n" | "next", []) => Some(Action::Advance),
        ("b" | "prev", []) => Some(Action::Retreat),
        ("m" | "mode", []) => Some(Action::TogglePlayMode),
        ("s" | "seek", [secs]) => secs.parse().ok().map(Action::Seek),

        ("w" | "widget", [x, y]) => match (x.parse(), y.parse()) {
            (Ok(x), Ok(y)) => Some(Action::MoveWidget { x, y }),
            _ => None,
        },

        // `+10` / `-10`
        (rel, []) if rel.starts_with('+') || rel.starts_with('-') => {
            rel.parse::<f64>().ok().map(Action::SeekRelative)
        }

        // Playlist entries are shown 1-based.
        (n, []) => match n.parse::<usize>() {
            Ok(0) | Err(_) => {
                tracing::debug!(line, "unrecognized command");
                None
            }
            Ok(i) => Some(Action::SelectIndex(i - 1)),
        },

        _ => {
            tracing::debug!(line, track = ?state.current_id(), "unrecognized command");
            None
        }
    }
}
