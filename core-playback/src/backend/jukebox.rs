//! Remote jukebox backend.
//!
//! Playback happens on the server; this backend only forwards transport
//! commands. It accepts every track while jukebox mode is enabled and none
//! otherwise.

use super::{BackendKind, PlayOutcome, PlayRequest, PlaybackBackend};
use crate::error::Result;
use async_trait::async_trait;
use bridge_traits::{JukeboxClient, JukeboxStatus};
use core_download::TrackFetchEntry;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Gain change applied by one volume step.
pub const GAIN_STEP: f32 = 0.05;

pub struct JukeboxBackend {
    client: Arc<dyn JukeboxClient>,
    enabled: AtomicBool,
    status: Mutex<JukeboxStatus>,
}

impl JukeboxBackend {
    pub fn new(client: Arc<dyn JukeboxClient>) -> Self {
        Self {
            client,
            enabled: AtomicBool::new(false),
            status: Mutex::new(JukeboxStatus::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Last status reported by the server.
    pub fn last_status(&self) -> JukeboxStatus {
        self.status.lock().clone()
    }

    fn remember(&self, status: JukeboxStatus) {
        *self.status.lock() = status;
    }

    /// Replace the server playlist with the queue contents.
    pub async fn update_playlist(&self, track_ids: &[String]) -> Result<()> {
        let status = self.client.update_playlist(track_ids).await?;
        debug!(tracks = track_ids.len(), "Jukebox playlist updated");
        self.remember(status);
        Ok(())
    }

    /// Step the server gain up or down, clamped to `[0, 1]`.
    pub async fn adjust_volume(&self, up: bool) -> Result<f32> {
        let current = self.status.lock().gain;
        let delta = if up { GAIN_STEP } else { -GAIN_STEP };
        let gain = (current + delta).clamp(0.0, 1.0);
        let status = self.client.set_gain(gain).await?;
        self.remember(status);
        Ok(gain)
    }
}

#[async_trait]
impl PlaybackBackend for JukeboxBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Jukebox
    }

    fn can_play(&self, _entry: &TrackFetchEntry) -> bool {
        self.is_enabled()
    }

    fn can_download(&self) -> bool {
        false
    }

    async fn play(&self, entry: &Arc<TrackFetchEntry>, request: PlayRequest) -> Result<PlayOutcome> {
        debug!(track_id = entry.id(), index = request.index, "Jukebox skip");
        let status = self
            .client
            .skip(request.index, request.position_ms / 1000)
            .await?;
        self.remember(status);

        if request.auto_start {
            self.remember(self.client.start().await?);
            Ok(PlayOutcome::Started)
        } else {
            self.remember(self.client.stop().await?);
            Ok(PlayOutcome::Paused)
        }
    }

    async fn pause(&self) -> Result<()> {
        self.remember(self.client.stop().await?);
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.remember(self.client.start().await?);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.remember(self.client.stop().await?);
        Ok(())
    }

    async fn seek(&self, index: usize, position_ms: u64) -> Result<()> {
        self.remember(self.client.skip(index, position_ms / 1000).await?);
        Ok(())
    }

    async fn position_ms(&self) -> Result<u64> {
        let status = self.client.status().await?;
        let position = status.position_secs * 1000;
        self.remember(status);
        Ok(position)
    }

    async fn duration_ms(&self) -> Result<Option<u64>> {
        Ok(None)
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        self.remember(self.client.set_gain(volume.clamp(0.0, 1.0)).await?);
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        if self.status.lock().playing {
            self.remember(self.client.stop().await?);
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.reset().await
    }
}
