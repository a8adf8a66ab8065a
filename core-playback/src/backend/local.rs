//! Local-file backend with gapless handoff.
//!
//! Two host players are kept: the active one and, once the successor's file
//! is complete, a prepared "next" player chained to it with
//! [`Player::set_next_player`]. At completion the handles swap instead of
//! tearing down and rebuilding, so there is no re-initialization gap.

use super::{BackendKind, PlayOutcome, PlayRequest, PlaybackBackend};
use crate::config::PlaybackConfig;
use crate::error::Result;
use async_trait::async_trait;
use bridge_traits::{Player, PlayerEventSender, PlayerFactory, PlayerId};
use core_download::TrackFetchEntry;
use core_runtime::logging::strip_path;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Which slot a player event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerRole {
    Active,
    Next,
}

struct StagedPlayer {
    player: Arc<dyn Player>,
    track_id: String,
}

pub struct LocalBackend {
    factory: Arc<dyn PlayerFactory>,
    events: PlayerEventSender,
    config: PlaybackConfig,
    active: Mutex<Option<Arc<dyn Player>>>,
    next: Mutex<Option<StagedPlayer>>,
    volume: Mutex<f32>,
    /// Set when the active player was opened on the partial file.
    partial_source: AtomicBool,
}

impl LocalBackend {
    pub fn new(factory: Arc<dyn PlayerFactory>, events: PlayerEventSender, config: PlaybackConfig) -> Self {
        Self {
            factory,
            events,
            config,
            active: Mutex::new(None),
            next: Mutex::new(None),
            volume: Mutex::new(1.0),
            partial_source: AtomicBool::new(false),
        }
    }

    /// Classify a player by id.
    pub fn role_of(&self, id: PlayerId) -> Option<PlayerRole> {
        if self.active.lock().as_ref().is_some_and(|p| p.id() == id) {
            return Some(PlayerRole::Active);
        }
        if self.next.lock().as_ref().is_some_and(|s| s.player.id() == id) {
            return Some(PlayerRole::Next);
        }
        None
    }

    /// Track id of the staged successor, if any.
    pub fn staged_track(&self) -> Option<String> {
        self.next.lock().as_ref().map(|s| s.track_id.clone())
    }

    /// Whether enough of `entry` is on disk to play from `position_ms`.
    pub fn is_buffered(&self, entry: &TrackFetchEntry, position_ms: u64) -> bool {
        if entry.is_complete_file_available() {
            return true;
        }
        let track = entry.track();
        let target = self
            .config
            .buffer_target_bytes(track.bitrate_kbps, position_ms, track.size_bytes);
        entry.bytes_downloaded() >= target
    }

    fn active_player(&self) -> Option<Arc<dyn Player>> {
        self.active.lock().clone()
    }

    fn active_or_err(&self) -> Result<Arc<dyn Player>> {
        self.active_player()
            .ok_or(crate::error::PlaybackError::NoTrackLoaded)
    }

    async fn ensure_active(&self) -> Result<Arc<dyn Player>> {
        if let Some(player) = self.active_player() {
            return Ok(player);
        }
        let player = self.factory.create(self.events.clone())?;
        debug!(player = %player.id(), "Created player");
        *self.active.lock() = Some(Arc::clone(&player));
        Ok(player)
    }
}

#[async_trait]
impl PlaybackBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn can_play(&self, _entry: &TrackFetchEntry) -> bool {
        true
    }

    fn can_download(&self) -> bool {
        true
    }

    async fn play(&self, entry: &Arc<TrackFetchEntry>, request: PlayRequest) -> Result<PlayOutcome> {
        if !self.is_buffered(entry, request.position_ms) {
            debug!(
                track_id = entry.id(),
                bytes = entry.bytes_downloaded(),
                "Not enough data buffered"
            );
            return Ok(PlayOutcome::Buffering);
        }

        let player = self.ensure_active().await?;
        let path = entry.playable_path();
        debug!(
            track_id = entry.id(),
            file = %strip_path(&path.to_string_lossy()),
            position_ms = request.position_ms,
            "Preparing player"
        );

        player.reset().await?;
        self.partial_source
            .store(path == entry.paths().partial, Ordering::Release);
        player.set_source(&path).await?;
        player.prepare().await?;
        if request.position_ms > 0 {
            player.seek_to(request.position_ms).await?;
        }
        let volume = *self.volume.lock();
        player.set_volume(volume).await?;

        if request.auto_start {
            player.start().await?;
            Ok(PlayOutcome::Started)
        } else {
            Ok(PlayOutcome::Paused)
        }
    }

    async fn pause(&self) -> Result<()> {
        self.active_or_err()?.pause().await?;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.active_or_err()?.start().await?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.active_or_err()?.stop().await?;
        Ok(())
    }

    async fn seek(&self, _index: usize, position_ms: u64) -> Result<()> {
        self.active_or_err()?.seek_to(position_ms).await?;
        Ok(())
    }

    async fn position_ms(&self) -> Result<u64> {
        match self.active_player() {
            Some(player) => Ok(player.position_ms().await?),
            None => Ok(0),
        }
    }

    async fn duration_ms(&self) -> Result<Option<u64>> {
        match self.active_player() {
            Some(player) => Ok(Some(player.duration_ms().await?).filter(|d| *d > 0)),
            None => Ok(None),
        }
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        *self.volume.lock() = volume;
        if let Some(player) = self.active_player() {
            player.set_volume(volume).await?;
        }
        let staged = self.next.lock().as_ref().map(|s| Arc::clone(&s.player));
        if let Some(next) = staged {
            next.set_volume(volume).await?;
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.clear_next().await?;
        if let Some(player) = self.active_player() {
            player.reset().await?;
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.clear_next().await?;
        let active = self.active.lock().take();
        if let Some(player) = active {
            player.release().await?;
        }
        Ok(())
    }

    async fn setup_next(&self, entry: &Arc<TrackFetchEntry>) -> Result<bool> {
        let Some(active) = self.active_player() else {
            return Ok(false);
        };
        self.clear_next().await?;

        let next = self.factory.create(self.events.clone())?;
        next.set_source(&entry.playable_path()).await?;
        next.prepare().await?;
        let volume = *self.volume.lock();
        next.set_volume(volume).await?;
        active.set_next_player(Some(Arc::clone(&next))).await?;

        debug!(track_id = entry.id(), player = %next.id(), "Successor staged");
        *self.next.lock() = Some(StagedPlayer {
            player: next,
            track_id: entry.id().to_string(),
        });
        Ok(true)
    }

    async fn advance_to_next(&self) -> Result<bool> {
        let staged = self.next.lock().take();
        let Some(staged) = staged else {
            return Ok(false);
        };

        // Successors are staged only once their file is complete.
        self.partial_source.store(false, Ordering::Release);
        let previous = self.active.lock().replace(staged.player);
        if let Some(previous) = previous {
            if let Err(e) = previous.release().await {
                warn!(error = %e, "Failed to release finished player");
            }
        }
        Ok(true)
    }

    fn playing_partial(&self) -> bool {
        self.partial_source.load(Ordering::Acquire)
    }

    async fn clear_next(&self) -> Result<()> {
        let staged = self.next.lock().take();
        if let Some(staged) = staged {
            if let Some(active) = self.active_player() {
                active.set_next_player(None).await?;
            }
            staged.player.release().await?;
        }
        Ok(())
    }
}
