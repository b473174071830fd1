//! "Track started" reporting.
//!
//! Recording is best-effort: it only happens for logged-in users, runs on its
//! own task, and failures end up in the log.

use crate::remote::{RemoteClient, Session, Track};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn save_history(&self, track: &Track) -> anyhow::Result<()>;
}

#[async_trait]
impl HistorySink for RemoteClient {
    async fn save_history(&self, track: &Track) -> anyhow::Result<()> {
        RemoteClient::save_history(self, track).await
    }
}

#[derive(Clone)]
pub struct HistoryRecorder {
    sink: Arc<dyn HistorySink>,
    session: Session,
}

impl HistoryRecorder {
    pub fn new(sink: Arc<dyn HistorySink>, session: Session) -> Self {
        Self { sink, session }
    }

    /// Fire-and-forget record of `track`. Returns the spawned task, or `None`
    /// when nobody is logged in.
    pub fn record(&self, track: &Track) -> Option<JoinHandle<()>> {
        if !self.session.is_logged_in() {
            tracing::debug!(track_id = %track.id, "not logged in, skipping history");
            return None;
        }

        let sink = self.sink.clone();
        let track = track.clone();
        Some(tokio::spawn(async move {
            match sink.save_history(&track).await {
                Ok(()) => tracing::debug!(track_id = %track.id, "history recorded"),
                Err(e) => tracing::warn!(track_id = %track.id, "history record failed: {e:#}"),
            }
        }))
    }
}
