use crate::remote::auth::SessionData;
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }

        let conn = Connection::open(path).with_context(|| format!("open {}", path.display()))?;
        let s = Self { conn };
        s.init_schema()?;
        Ok(s)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                r#"
CREATE TABLE IF NOT EXISTS stream_cache (
  track_id TEXT PRIMARY KEY,
  url TEXT NOT NULL,
  expires_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS lyrics_cache (
  track_id TEXT PRIMARY KEY,
  content TEXT NOT NULL,
  fetched_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS session (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);
"#,
            )
            .context("init schema")?;
        Ok(())
    }

    pub fn get_stream_url(&self, track_id: &str, now_unix: i64) -> anyhow::Result<Option<String>> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT url, expires_at FROM stream_cache WHERE track_id=?1",
                params![track_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("query stream cache")?;
        Ok(row.and_then(|(url, exp)| (exp > now_unix).then_some(url)))
    }

    pub fn cache_stream_url(
        &self,
        track_id: &str,
        url: &str,
        expires_at: i64,
        now_unix: i64,
    ) -> anyhow::Result<()> {
        self.conn
            .execute(
                r#"
INSERT INTO stream_cache(track_id, url, expires_at, updated_at)
VALUES(?1, ?2, ?3, ?4)
ON CONFLICT(track_id) DO UPDATE SET
  url=excluded.url,
  expires_at=excluded.expires_at,
  updated_at=excluded.updated_at
"#,
                params![track_id, url, expires_at, now_unix],
            )
            .context("cache stream url")?;
        Ok(())
    }

    /// Cache raw LRC text for a track
    pub fn cache_lyrics(&self, track_id: &str, content: &str, now_unix: i64) -> anyhow::Result<()> {
        self.conn
            .execute(
                r#"
INSERT INTO lyrics_cache(track_id, content, fetched_at)
VALUES(?1, ?2, ?3)
ON CONFLICT(track_id) DO UPDATE SET
  content=excluded.content,
  fetched_at=excluded.fetched_at
"#,
                params![track_id, content, now_unix],
            )
            .context("cache lyrics")?;
        Ok(())
    }

    pub fn get_lyrics(&self, track_id: &str) -> anyhow::Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT content FROM lyrics_cache WHERE track_id=?1",
                params![track_id],
                |row| row.get(0),
            )
            .optional()
            .context("query lyrics cache")
    }

    pub fn load_session(&self) -> anyhow::Result<SessionData> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM session")
            .context("prepare session")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .context("query session")?;

        let mut data = SessionData::default();
        for row in rows {
            let (key, value) = row.context("read session row")?;
            match key.as_str() {
                "cookie" => data.cookie = Some(value),
                "user" => {
                    data.user = Some(serde_json::from_str(&value).context("parse stored user")?)
                }
                _ => {}
            }
        }
        Ok(data)
    }

    pub fn save_session(&mut self, data: &SessionData) -> anyhow::Result<()> {
        let tx = self.conn.transaction().context("begin session tx")?;
        tx.execute("DELETE FROM session", []).context("clear session")?;
        if let Some(cookie) = &data.cookie {
            tx.execute(
                "INSERT INTO session(key, value) VALUES('cookie', ?1)",
                params![cookie],
            )
            .context("store cookie")?;
        }
        if let Some(user) = &data.user {
            tx.execute(
                "INSERT INTO session(key, value) VALUES('user', ?1)",
                params![user.to_string()],
            )
            .context("store user")?;
        }
        tx.commit().context("commit session")?;
        Ok(())
    }
}

// Simple way to use rusqlite from async tasks: open per-operation.
#[derive(Debug, Clone)]
pub struct StorageHandle {
    path: PathBuf,
}

impl StorageHandle {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn open(&self) -> anyhow::Result<Storage> {
        Storage::open(&self.path)
    }

    pub fn get_stream_url(&self, track_id: &str, now_unix: i64) -> anyhow::Result<Option<String>> {
        self.open()?.get_stream_url(track_id, now_unix)
    }

    pub fn cache_stream_url(
        &self,
        track_id: &str,
        url: &str,
        expires_at: i64,
        now_unix: i64,
    ) -> anyhow::Result<()> {
        self.open()?
            .cache_stream_url(track_id, url, expires_at, now_unix)
    }

    pub fn get_lyrics(&self, track_id: &str) -> anyhow::Result<Option<String>> {
        self.open()?.get_lyrics(track_id)
    }

    pub fn cache_lyrics(&self, track_id: &str, content: &str, now_unix: i64) -> anyhow::Result<()> {
        self.open()?.cache_lyrics(track_id, content, now_unix)
    }

    pub fn load_session(&self) -> anyhow::Result<SessionData> {
        self.open()?.load_session()
    }

    pub fn save_session(&self, data: &SessionData) -> anyhow::Result<()> {
        self.open()?.save_session(data)
    }
}

pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
