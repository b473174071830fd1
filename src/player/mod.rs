//! Audio output device abstraction.
//!
//! The controller only ever talks to an [`AudioDevice`]; lifecycle events
//! travel back as [`crate::app::events::PlayerEvent`] on the app channel.

pub mod mpv;

use async_trait::async_trait;

/// What to load into the device: stream plus display metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub url: String,
    pub title: String,
    pub artist: String,
    pub cover_url: Option<String>,
}

/// Imperative side of an audio output. Setting a source replaces whatever was
/// loaded and starts playback once the stream is ready.
#[async_trait]
pub trait AudioDevice: Send + Sync {
    async fn set_source(&self, source: &Source) -> anyhow::Result<()>;
    async fn play(&self) -> anyhow::Result<()>;
    async fn pause(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
    async fn seek(&self, seconds: f64) -> anyhow::Result<()>;
}
