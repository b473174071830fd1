mod app;
mod config;
mod history;
mod input;
mod lyrics;
mod player;
mod queue;
mod remote;
mod storage;
mod view;

use anyhow::Context;
use app::Controller;
use app::actions::Action;
use app::events::Event;
use app::state::PlayMode;
use clap::{Parser, Subcommand};
use history::HistoryRecorder;
use remote::auth::SessionData;
use remote::{CachedResolver, RemoteClient, Session, Track};
use std::sync::Arc;
use std::time::Duration;
use storage::StorageHandle;
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "cadenza", version, about = "Playlist player for a music backend, driven by mpv")]
struct Cli {
    /// Override config file path.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Log at debug level.
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Play tracks and read transport commands from stdin.
    Play {
        /// Track ids to queue, in order.
        ids: Vec<String>,
        /// Queue a backend playlist.
        #[arg(long, conflicts_with = "search")]
        playlist: Option<String>,
        /// Queue the first page of search results.
        #[arg(long)]
        search: Option<String>,
        /// Play mode for this session (saved on exit).
        #[arg(long, value_enum)]
        mode: Option<PlayMode>,
        /// 1-based playlist entry to start with.
        #[arg(long, default_value_t = 1)]
        start: usize,
    },
    /// Search tracks and print to stdout.
    Search {
        query: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// List the tracks of a playlist.
    Playlist { playlist_id: String },
    /// List recommended playlists.
    Hot,
    /// Print the playback URL of a track.
    Url { id: String },
    /// Print the cover URL of a track.
    Cover { id: String },
    /// Print the parsed lyrics of a track.
    Lyrics { id: String },
    /// Log in and keep the session for later runs.
    Login { username: String, password: String },
    /// Create an account.
    Register { username: String, password: String },
    Logout,
    /// Show the logged-in user.
    Whoami,
    /// List your own playlists.
    MyPlaylists,
    CreatePlaylist { name: String },
    /// Add a track to one of your playlists.
    AddSong {
        playlist_id: String,
        id: String,
        #[arg(long)]
        name: Option<String>,
        /// Artists separated by `/`.
        #[arg(long)]
        artist: Option<String>,
        #[arg(long)]
        album: Option<String>,
    },
    /// Show recently played tracks.
    History {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

const STDIN_HELP: &str = "commands: p|play, pause, t|toggle, n|next, b|prev, m|mode, \
s|seek SECS, +SECS, -SECS, N (play entry N), w X Y, q|quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load(cli.config.as_deref()).context("load config")?;

    let storage = StorageHandle::new(cfg.paths.data_dir.join("cache.sqlite3"));
    let session = match storage.load_session() {
        Ok(data) => Session::new(data),
        Err(e) => {
            tracing::warn!("could not restore session: {e:#}");
            Session::default()
        }
    };
    let client = RemoteClient::new(
        &cfg.remote.base_url,
        Duration::from_secs(cfg.remote.timeout_secs),
        session.clone(),
    )?;

    let result = run_command(cli.command, cfg, cli.config.as_deref(), &client, &storage).await;

    // Cookies may have rotated on any response.
    persist_session(&storage, session.snapshot()).await;
    result
}

async fn run_command(
    command: Command,
    cfg: config::Config,
    config_path: Option<&std::path::Path>,
    client: &RemoteClient,
    storage: &StorageHandle,
) -> anyhow::Result<()> {
    match command {
        Command::Play {
            ids,
            playlist,
            search,
            mode,
            start,
        } => {
            let tracks = if let Some(id) = playlist {
                client.playlist_tracks(&id).await?
            } else if let Some(query) = search {
                client.search(&query, 1).await?
            } else {
                ids.into_iter().map(Track::from_id).collect()
            };
            if tracks.is_empty() {
                anyhow::bail!("nothing to play");
            }
            play(cfg, config_path, client, storage, tracks, mode, start).await?;
        }
        Command::Search { query, page } => {
            let tracks = client.search(&query, page).await?;
            view::print_tracks(&tracks);
        }
        Command::Playlist { playlist_id } => {
            let tracks = client.playlist_tracks(&playlist_id).await?;
            view::print_tracks(&tracks);
        }
        Command::Hot => {
            let playlists = client.hot_playlists().await?;
            view::print_playlists(&playlists);
        }
        Command::Url { id } => match client.song_url(&id).await? {
            Some(url) => println!("{}", remote::secure_url(&url)),
            None => anyhow::bail!("no playback url for track {id}"),
        },
        Command::Cover { id } => match client.song_cover(&id).await? {
            Some(url) => println!("{}", remote::secure_url(&url)),
            None => println!("(no cover)"),
        },
        Command::Lyrics { id } => {
            let text = client.song_lyric(&id).await?.unwrap_or_default();
            let lines = lyrics::parse(&text);
            if lines.is_empty() {
                println!("(no lyrics)");
            }
            for line in lines {
                println!("{}  {}", view::mmss(line.time), line.text);
            }
        }
        Command::Login { username, password } => {
            let user = client.login(&username, &password).await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Command::Register { username, password } => {
            let user = client.register(&username, &password).await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Command::Logout => {
            client.logout().await?;
            println!("Logged out.");
        }
        Command::Whoami => {
            let user = client.user_info().await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Command::MyPlaylists => {
            let playlists = client.user_playlists().await?;
            view::print_playlists(&playlists);
        }
        Command::CreatePlaylist { name } => {
            let created = client.create_playlist(&name).await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        Command::AddSong {
            playlist_id,
            id,
            name,
            artist,
            album,
        } => {
            let mut track = Track::from_id(id);
            if let Some(name) = name {
                track.name = name;
            }
            if let Some(artist) = artist {
                track.artists = artist
                    .split('/')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            track.album = album;
            client.add_song_to_playlist(&playlist_id, &track).await?;
            println!("Added {} to playlist {playlist_id}.", track.name);
        }
        Command::History { page, limit } => {
            let tracks = client.play_history(page, limit).await?;
            view::print_tracks(&tracks);
        }
    }
    Ok(())
}

async fn play(
    mut cfg: config::Config,
    config_path: Option<&std::path::Path>,
    client: &RemoteClient,
    storage: &StorageHandle,
    tracks: Vec<Track>,
    mode: Option<PlayMode>,
    start: usize,
) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel::<Event>(256);

    let log_file = cfg.paths.data_dir.join("mpv.log");
    let mpv = player::mpv::MpvHandle::spawn(
        tx.clone(),
        cfg.player.audio_device.as_deref(),
        Some(&log_file),
    )
    .await
    .context("start mpv")?;
    if let Err(e) = mpv.set_volume(cfg.player.volume).await {
        tracing::warn!("set volume failed: {e:#}");
    }

    let resolver = CachedResolver::new(client.clone(), storage.clone(), cfg.remote.stream_cache_secs);
    let recorder = HistoryRecorder::new(Arc::new(client.clone()), client.session().clone());
    let mut controller = Controller::new(Box::new(mpv), Arc::new(resolver), recorder, tx.clone())
        .with_resolve_timeout(Duration::from_secs(cfg.remote.timeout_secs));
    controller.restore(
        mode.unwrap_or(cfg.playback.mode),
        cfg.playback.widget_position(),
    );

    eprintln!("{STDIN_HELP}");
    input::spawn_input_task(tx.clone());

    let start = start.saturating_sub(1).min(tracks.len().saturating_sub(1));
    tx.send(Event::Action(Action::SetPlaylist(tracks))).await?;
    tx.send(Event::Action(Action::SelectIndex(start))).await?;

    let mut console = view::Console::new();
    let mut stdout = std::io::stdout();
    controller
        .run(rx, |state, toast| console.draw(&mut stdout, state, toast))
        .await;

    let state = controller.state();
    cfg.playback.remember(state.play_mode, state.widget_position);
    config::save(&cfg, config_path).context("save config")?;
    Ok(())
}

async fn persist_session(storage: &StorageHandle, data: SessionData) {
    let storage = storage.clone();
    match tokio::task::spawn_blocking(move || storage.save_session(&data)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("could not save session: {e:#}"),
        Err(e) => tracing::warn!("session save task failed: {e}"),
    }
}
