use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    /// Pre-resolved cover image, filled in lazily when missing.
    pub cover_url: Option<String>,
    /// Pre-resolved playback URL; skips URL resolution when present.
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub cover_url: Option<String>,
}

impl Track {
    /// A track known only by id (e.g. passed on the command line).
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: format!("Track {id}"),
            id,
            artists: Vec::new(),
            album: None,
            cover_url: None,
            url: None,
        }
    }

    /// Normalize one song object from any backend listing.
    ///
    /// Accepts `name`/`title`, `ar`/`artists`/`artist`, `al`/`album`
    /// (object or string) and a cover from `picUrl`, `pic`, `cover_url` or
    /// the album's `picUrl`. Returns `None` without an id (`song_id` or `id`).
    pub fn from_json(v: &Value) -> Option<Self> {
        // History rows carry their own row `id` next to the song's.
        let id = ["song_id", "id"]
            .iter()
            .find_map(|k| v.get(*k).and_then(id_string))?;

        let name = first_str(v, &["name", "title", "song_name"])
            .unwrap_or("Unknown title")
            .to_string();

        let artists = ["ar", "artists"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_array))
            .map(|list| {
                list.iter()
                    .filter_map(|a| match a {
                        Value::String(s) => Some(s.clone()),
                        other => other.get("name").and_then(Value::as_str).map(str::to_string),
                    })
                    .collect::<Vec<_>>()
            })
            .or_else(|| {
                first_str(v, &["artist", "singer"]).map(|s| {
                    s.split('/')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
            })
            .unwrap_or_default();

        let album_obj = v.get("al").or_else(|| v.get("album"));
        let album = album_obj.and_then(|a| match a {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            other => other.get("name").and_then(Value::as_str).map(str::to_string),
        });

        let cover_url = first_str(v, &["picUrl", "pic", "cover_url", "cover"])
            .or_else(|| album_obj.and_then(|a| first_str(a, &["picUrl"])))
            .map(str::to_string);

        let url = v
            .get("url")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Some(Self {
            id,
            name,
            artists,
            album,
            cover_url,
            url,
        })
    }

    /// Artist names joined for display, or a placeholder.
    pub fn artist_line(&self) -> String {
        if self.artists.is_empty() {
            "Unknown artist".to_string()
        } else {
            self.artists.join("/")
        }
    }
}

impl Playlist {
    pub fn from_json(v: &Value) -> Option<Self> {
        let id = id_string(v.get("id")?)?;
        let name = first_str(v, &["name", "title"]).unwrap_or("Untitled").to_string();
        let cover_url = first_str(v, &["coverImgUrl", "picUrl", "cover_url"]).map(str::to_string);
        Some(Self { id, name, cover_url })
    }
}

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First non-empty string under any of `keys`, in order.
fn first_str<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| v.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()))
}
