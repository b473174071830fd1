use crate::remote::api::RemoteClient;
use crate::storage::{StorageHandle, now_unix};
use anyhow::Context;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Per-track lookups the player needs. Each call is independent and safe to
/// repeat; results may come from a cache.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Playable stream URL. Failing here means the track cannot be played.
    async fn playback_url(&self, track_id: &str) -> anyhow::Result<String>;
    async fn cover_url(&self, track_id: &str) -> anyhow::Result<Option<String>>;
    async fn lyric_text(&self, track_id: &str) -> anyhow::Result<Option<String>>;
}

/// Backend resolver with an sqlite stream/lyric cache and an in-memory cover
/// cache.
pub struct CachedResolver {
    client: RemoteClient,
    storage: StorageHandle,
    covers: Mutex<LruCache<String, String>>,
    stream_ttl_secs: i64,
}

impl CachedResolver {
    const COVER_CACHE_SIZE: usize = 256;

    pub fn new(client: RemoteClient, storage: StorageHandle, stream_ttl_secs: i64) -> Self {
        let cap = NonZeroUsize::new(Self::COVER_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            storage,
            covers: Mutex::new(LruCache::new(cap)),
            stream_ttl_secs,
        }
    }

    fn cached_cover(&self, track_id: &str) -> Option<String> {
        self.covers
            .lock()
            .ok()
            .and_then(|mut c| c.get(track_id).cloned())
    }
}

#[async_trait]
impl TrackResolver for CachedResolver {
    async fn playback_url(&self, track_id: &str) -> anyhow::Result<String> {
        let now = now_unix();

        let cached = tokio::task::spawn_blocking({
            let storage = self.storage.clone();
            let id = track_id.to_string();
            move || storage.get_stream_url(&id, now)
        })
        .await;
        match cached {
            Ok(Ok(Some(url))) => {
                tracing::debug!(track_id, "stream url cache hit");
                return Ok(url);
            }
            Ok(Err(e)) => tracing::warn!(track_id, "stream cache read failed: {e:#}"),
            _ => {}
        }

        let url = self
            .client
            .song_url(track_id)
            .await?
            .with_context(|| format!("no playback url for track {track_id}"))?;

        let expires_at = now + self.stream_ttl_secs;
        let _ = tokio::task::spawn_blocking({
            let storage = self.storage.clone();
            let id = track_id.to_string();
            let url = url.clone();
            move || storage.cache_stream_url(&id, &url, expires_at, now)
        })
        .await;

        Ok(url)
    }

    async fn cover_url(&self, track_id: &str) -> anyhow::Result<Option<String>> {
        if let Some(url) = self.cached_cover(track_id) {
            return Ok(Some(url));
        }
        let url = self.client.song_cover(track_id).await?;
        if let (Some(url), Ok(mut covers)) = (&url, self.covers.lock()) {
            covers.put(track_id.to_string(), url.clone());
        }
        Ok(url)
    }

    async fn lyric_text(&self, track_id: &str) -> anyhow::Result<Option<String>> {
        if let Ok(Ok(Some(text))) = tokio::task::spawn_blocking({
            let storage = self.storage.clone();
            let id = track_id.to_string();
            move || storage.get_lyrics(&id)
        })
        .await
        {
            tracing::debug!(track_id, "lyrics cache hit");
            return Ok(Some(text));
        }

        let text = self.client.song_lyric(track_id).await?;
        if let Some(text) = &text {
            let _ = tokio::task::spawn_blocking({
                let storage = self.storage.clone();
                let id = track_id.to_string();
                let text = text.clone();
                move || storage.cache_lyrics(&id, &text, now_unix())
            })
            .await;
        }
        Ok(text)
    }
}
