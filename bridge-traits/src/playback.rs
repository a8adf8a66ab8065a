//! Opaque player primitive.
//!
//! The core never decodes or renders audio itself. Hosts hand it a
//! [`PlayerFactory`] that builds [`Player`] instances wrapping the platform
//! media engine (MediaPlayer, AVPlayer, a desktop audio stack, ...). The core
//! drives each player with transport commands and learns about completion and
//! decoder failures through [`PlayerEvent`]s posted on the channel it passed to
//! the factory. Events are tagged with the [`PlayerId`] of the player that
//! raised them so stale notifications from a swapped-out player can be told
//! apart from the active one.

use crate::error::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identity of a single player instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerId(Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Asynchronous notifications raised by a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// The player reached the end of its data source.
    Completed { player: PlayerId },
    /// The underlying engine reported a failure.
    Error {
        player: PlayerId,
        code: i32,
        message: String,
    },
}

impl PlayerEvent {
    pub fn player(&self) -> PlayerId {
        match self {
            PlayerEvent::Completed { player } | PlayerEvent::Error { player, .. } => *player,
        }
    }
}

/// Channel the core listens on for [`PlayerEvent`]s.
pub type PlayerEventSender = mpsc::UnboundedSender<PlayerEvent>;

/// A platform media engine instance able to play one local file at a time.
///
/// Files handed to [`Player::set_source`] may still be growing while they
/// play; implementations must tolerate reaching end-of-file before the
/// expected length and report it as [`PlayerEvent::Completed`]. The core
/// decides whether such a completion was genuine.
#[async_trait::async_trait]
pub trait Player: Send + Sync {
    /// Identity used to tag this player's events.
    fn id(&self) -> PlayerId;

    /// Point the player at a local file.
    async fn set_source(&self, path: &Path) -> Result<()>;

    /// Prepare the data source for playback.
    async fn prepare(&self) -> Result<()>;

    async fn start(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Return to the uninitialized state so the player can be reused.
    async fn reset(&self) -> Result<()>;

    /// Free the engine resources. The player must not be used afterwards.
    async fn release(&self) -> Result<()>;

    async fn seek_to(&self, position_ms: u64) -> Result<()>;

    async fn position_ms(&self) -> Result<u64>;

    async fn duration_ms(&self) -> Result<u64>;

    /// Set output volume in `[0.0, 1.0]`.
    async fn set_volume(&self, volume: f32) -> Result<()>;

    /// Chain a prepared player that takes over without a gap when this one
    /// completes. `None` unlinks any previously chained player.
    async fn set_next_player(&self, next: Option<Arc<dyn Player>>) -> Result<()>;
}

/// Builds [`Player`] instances bound to an event channel.
pub trait PlayerFactory: Send + Sync {
    fn create(&self, events: PlayerEventSender) -> Result<Arc<dyn Player>>;
}
