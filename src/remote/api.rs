use crate::remote::auth::Session;
use crate::remote::models::{Playlist, Track};
use anyhow::Context;
use reqwest::header::{
    CONTENT_TYPE, COOKIE, HeaderMap, HeaderValue, SET_COOKIE, USER_AGENT,
};
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    base_url: String,
    session: Session,
}

/// Client for the music backend.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    inner: Arc<Inner>,
}

impl RemoteClient {
    const USER_AGENT: &'static str = "cadenza/0.1.0";

    pub fn new(base_url: &str, timeout: Duration, session: Session) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(Self::USER_AGENT));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("build reqwest client")?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                session,
            }),
        })
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Playback URL for a song, if the backend has one.
    pub async fn song_url(&self, song_id: &str) -> anyhow::Result<Option<String>> {
        let v = self
            .get(&format!("/music/song/url/{}", urlencoding::encode(song_id)))
            .await
            .context("song url")?;
        Ok(extract_url(unwrap_envelope(&v)))
    }

    /// Raw LRC text for a song.
    pub async fn song_lyric(&self, song_id: &str) -> anyhow::Result<Option<String>> {
        let v = self
            .get(&format!("/music/song/lyric/{}", urlencoding::encode(song_id)))
            .await
            .context("song lyric")?;
        Ok(extract_lyric(unwrap_envelope(&v)))
    }

    /// Cover image URL for a song.
    pub async fn song_cover(&self, song_id: &str) -> anyhow::Result<Option<String>> {
        let v = self
            .get(&format!("/music/song/cover/{}", urlencoding::encode(song_id)))
            .await
            .context("song cover")?;
        Ok(extract_cover(unwrap_envelope(&v)))
    }

    pub async fn save_history(&self, track: &Track) -> anyhow::Result<()> {
        self.post_json("/music/save_history", &song_body(track))
            .await
            .context("save history")?;
        Ok(())
    }

    pub async fn search(&self, name: &str, page: u32) -> anyhow::Result<Vec<Track>> {
        let path = format!(
            "/music/search?name={}&page={}",
            urlencoding::encode(name),
            page
        );
        let v = self.get(&path).await.context("search")?;
        Ok(extract_tracks(&v))
    }

    pub async fn playlist_tracks(&self, playlist_id: &str) -> anyhow::Result<Vec<Track>> {
        let v = self
            .get(&format!("/music/playlist/{}", urlencoding::encode(playlist_id)))
            .await
            .context("playlist detail")?;
        Ok(extract_tracks(&v))
    }

    pub async fn hot_playlists(&self) -> anyhow::Result<Vec<Playlist>> {
        let v = self.get("/music/hot_playlists").await.context("hot playlists")?;
        Ok(extract_playlists(&v))
    }

    /// Playlists owned by the logged-in user.
    pub async fn user_playlists(&self) -> anyhow::Result<Vec<Playlist>> {
        let v = self.get("/user/playlists").await.context("user playlists")?;
        Ok(extract_playlists(&v))
    }

    pub async fn create_playlist(&self, name: &str) -> anyhow::Result<Value> {
        let v = self
            .post_json("/user/create_playlist", &json!({ "name": name }))
            .await
            .context("create playlist")?;
        Ok(unwrap_envelope(&v).clone())
    }

    pub async fn add_song_to_playlist(&self, playlist_id: &str, track: &Track) -> anyhow::Result<()> {
        let path = format!("/user/playlist/{}/add_song", urlencoding::encode(playlist_id));
        self.post_json(&path, &song_body(track))
            .await
            .context("add song to playlist")?;
        Ok(())
    }

    /// One page of the logged-in user's play history, newest first as the
    /// backend orders it.
    pub async fn play_history(&self, page: u32, limit: u32) -> anyhow::Result<Vec<Track>> {
        let path = format!("/user/get_history?page={page}&limit={limit}");
        let v = self.get(&path).await.context("play history")?;
        Ok(extract_history(&v))
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, username: &str, password: &str) -> anyhow::Result<Value> {
        let v = self
            .post_form("/user/register", &[("username", username), ("password", password)])
            .await
            .context("register")?;
        Ok(unwrap_envelope(&v).clone())
    }

    /// Log in with a form post. On success the session holds the cookie and
    /// the returned user record.
    pub async fn login(&self, username: &str, password: &str) -> anyhow::Result<Value> {
        let v = self
            .post_form("/user/login", &[("username", username), ("password", password)])
            .await
            .context("login")?;

        let user = unwrap_envelope(&v)
            .get("user")
            .cloned()
            .unwrap_or_else(|| unwrap_envelope(&v).clone());
        self.session().set_user(user.clone());
        Ok(user)
    }

    pub async fn user_info(&self) -> anyhow::Result<Value> {
        let v = self.get("/user/get_user_info").await.context("user info")?;
        Ok(unwrap_envelope(&v).clone())
    }

    /// Log out remotely and forget the local session either way.
    pub async fn logout(&self) -> anyhow::Result<()> {
        let res = self.get("/user/logout").await;
        self.session().clear();
        match res {
            Ok(_) => Ok(()),
            // The backend answers logout with an HTML redirect page.
            Err(e) if is_session_expired(&e) => Ok(()),
            Err(e) => Err(e.context("logout")),
        }
    }

    async fn get(&self, path: &str) -> anyhow::Result<Value> {
        let resp = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .with_context(|| format!("send GET {path}"))?;
        self.read_response(resp).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        let resp = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await
            .with_context(|| format!("send POST {path}"))?;
        self.read_response(resp).await
    }

    async fn post_form(&self, path: &str, fields: &[(&str, &str)]) -> anyhow::Result<Value> {
        let form = fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let resp = self
            .request(reqwest::Method::POST, path)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await
            .with_context(|| format!("send POST {path}"))?;
        self.read_response(resp).await
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.inner.base_url, path);
        tracing::debug!(%method, %url, "request");
        let mut rb = self.inner.http.request(method, url);
        if let Some(cookie) = self.session().cookie_header() {
            rb = rb.header(COOKIE, cookie);
        }
        rb
    }

    async fn read_response(&self, resp: reqwest::Response) -> anyhow::Result<Value> {
        let set_cookies: Vec<String> = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        if !set_cookies.is_empty() {
            self.session()
                .absorb_set_cookie(set_cookies.iter().map(String::as_str));
        }

        let status = resp.status();
        let text = resp.text().await.context("read response body")?;
        tracing::debug!(status = status.as_u16(), bytes = text.len(), "response");
        interpret_response(status, &text, self.session())
    }
}

const SESSION_EXPIRED: &str = "session expired";

fn is_session_expired(e: &anyhow::Error) -> bool {
    e.chain().any(|c| c.to_string() == SESSION_EXPIRED)
}

/// Turn a status and body into JSON or an error.
///
/// A successful status with a non-JSON body is the backend's login page, which
/// means the session cookie is no longer valid.
fn interpret_response(status: StatusCode, text: &str, session: &Session) -> anyhow::Result<Value> {
    if status == StatusCode::UNAUTHORIZED {
        anyhow::bail!("login required");
    }

    let parsed = if text.trim().is_empty() {
        Ok(Value::Object(Default::default()))
    } else {
        serde_json::from_str::<Value>(text)
    };

    if status.is_success() {
        return match parsed {
            Ok(v) => Ok(v),
            Err(_) => {
                session.clear();
                Err(anyhow::anyhow!(SESSION_EXPIRED))
            }
        };
    }

    let message = parsed
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    anyhow::bail!(message)
}

/// Responses come either as `{data: ...}` or as the bare object.
pub fn unwrap_envelope(v: &Value) -> &Value {
    match v.get("data") {
        Some(d) if !d.is_null() => d,
        _ => v,
    }
}

fn non_empty(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn extract_url(v: &Value) -> Option<String> {
    if let Some(s) = non_empty(Some(v)) {
        return Some(s);
    }
    non_empty(v.get("url")).or_else(|| {
        v.as_array()
            .and_then(|a| a.first())
            .and_then(|first| non_empty(first.get("url")))
    })
}

fn extract_lyric(v: &Value) -> Option<String> {
    if let Some(s) = non_empty(Some(v)) {
        return Some(s);
    }
    non_empty(v.get("lyric"))
        .or_else(|| non_empty(v.get("lrc").and_then(|l| l.get("lyric"))))
        .or_else(|| non_empty(v.get("lrc")))
}

fn extract_cover(v: &Value) -> Option<String> {
    if let Some(s) = non_empty(Some(v)) {
        return Some(s);
    }
    ["cover_url", "picUrl", "pic", "cover", "url"]
        .iter()
        .find_map(|k| non_empty(v.get(*k)))
}

/// Find a track list in a listing response: the unwrapped body itself when it
/// is an array, or the first array under a well-known key (searched a few
/// levels deep).
fn extract_tracks(v: &Value) -> Vec<Track> {
    find_list(unwrap_envelope(v), &["songs", "tracks", "list", "result", "playlist"])
        .map(|items| items.iter().filter_map(Track::from_json).collect())
        .unwrap_or_default()
}

fn extract_playlists(v: &Value) -> Vec<Playlist> {
    find_list(unwrap_envelope(v), &["playlists", "list", "result"])
        .map(|items| items.iter().filter_map(Playlist::from_json).collect())
        .unwrap_or_default()
}

/// History rows carry the song fields flat (`song_id`, `song_name`, `artist`).
fn extract_history(v: &Value) -> Vec<Track> {
    find_list(unwrap_envelope(v), &["history", "records", "list", "songs"])
        .map(|items| items.iter().filter_map(Track::from_json).collect())
        .unwrap_or_default()
}

/// Song fields as the history and playlist endpoints expect them.
fn song_body(track: &Track) -> Value {
    json!({
        "song_id": track.id,
        "song_name": track.name,
        "artist": track.artist_line(),
        "album": track.album,
    })
}

fn find_list<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    fn scan<'a>(v: &'a Value, keys: &[&str], depth: usize) -> Option<&'a Vec<Value>> {
        if let Some(a) = v.as_array() {
            return Some(a);
        }
        if depth == 0 {
            return None;
        }
        keys.iter()
            .filter_map(|k| v.get(*k))
            .find_map(|child| scan(child, keys, depth - 1))
    }
    scan(v, keys, 3)
}

/// Rewrite plain-http and scheme-relative URLs to https.
pub fn secure_url(url: &str) -> String {
    let url = url.trim();
    if let Some(rest) = url.strip_prefix("http://") {
        format!("https://{rest}")
    } else if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        url.to_string()
    }
}
