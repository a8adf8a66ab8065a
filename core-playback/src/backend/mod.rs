//! # Playback Backends
//!
//! A backend executes audio playback for one track at a time. Three variants
//! exist:
//!
//! - [`LocalBackend`] plays downloaded (or still downloading) files through
//!   the host [`Player`](bridge_traits::Player) primitive, with gapless
//!   handoff to a second player.
//! - [`JukeboxBackend`] drives a server-side player; no audio reaches the client.
//! - [`StreamingBackend`] hands URIs of an external streaming service to its SDK.
//!
//! ## Selection
//!
//! [`BackendSelector`] evaluates [`PlaybackBackend::can_play`] in fixed
//! priority order (jukebox, streaming, local) and uses the first backend that
//! accepts the track. The backend can therefore change from one track to the
//! next within a single queue.

mod jukebox;
mod local;
mod streaming;

pub use jukebox::JukeboxBackend;
pub use local::{LocalBackend, PlayerRole};
pub use streaming::StreamingBackend;

use crate::error::Result;
use crate::state::PlayerState;
use async_trait::async_trait;
use core_download::TrackFetchEntry;
use std::fmt;
use std::sync::Arc;

/// Which backend variant is handling a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Local,
    Jukebox,
    Streaming,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Local => "local",
            BackendKind::Jukebox => "jukebox",
            BackendKind::Streaming => "streaming",
        })
    }
}

/// Parameters of a `play` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayRequest {
    /// Index of the track in the main queue.
    pub index: usize,
    pub position_ms: u64,
    /// Start playing once prepared; otherwise stay paused.
    pub auto_start: bool,
}

impl PlayRequest {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            position_ms: 0,
            auto_start: true,
        }
    }

    pub fn at(mut self, position_ms: u64) -> Self {
        self.position_ms = position_ms;
        self
    }

    pub fn paused(mut self) -> Self {
        self.auto_start = false;
        self
    }
}

/// How a `play` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Started,
    /// Prepared and positioned but not started.
    Paused,
    /// Not enough of the file is on disk yet; retry once more has arrived.
    Buffering,
}

/// Executes playback of one track.
#[async_trait]
pub trait PlaybackBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// One-time setup (SDK sessions, player allocation).
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Whether this backend accepts `entry`.
    fn can_play(&self, entry: &TrackFetchEntry) -> bool;

    /// Whether tracks played here need to be fetched to local storage.
    fn can_download(&self) -> bool;

    async fn play(&self, entry: &Arc<TrackFetchEntry>, request: PlayRequest) -> Result<PlayOutcome>;

    /// Resume a previously saved session at `request.position_ms`.
    async fn restore(&self, entry: &Arc<TrackFetchEntry>, request: PlayRequest) -> Result<PlayOutcome> {
        self.play(entry, request).await
    }

    async fn pause(&self) -> Result<()>;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn seek(&self, index: usize, position_ms: u64) -> Result<()>;

    async fn position_ms(&self) -> Result<u64>;

    /// Duration reported by the backend, if it knows one.
    async fn duration_ms(&self) -> Result<Option<u64>>;

    async fn set_volume(&self, volume: f32) -> Result<()>;

    /// Return to an idle state, keeping resources for reuse.
    async fn reset(&self) -> Result<()>;

    /// Release all resources.
    async fn destroy(&self) -> Result<()>;

    /// Pre-stage `entry` as the successor for a gapless handoff.
    async fn setup_next(&self, _entry: &Arc<TrackFetchEntry>) -> Result<bool> {
        Ok(false)
    }

    /// Promote the pre-staged successor to the active slot.
    ///
    /// Returns `false` when nothing was staged.
    async fn advance_to_next(&self) -> Result<bool> {
        Ok(false)
    }

    /// Drop any pre-staged successor.
    async fn clear_next(&self) -> Result<()> {
        Ok(())
    }

    /// Whether the active player reads a file that is still being written.
    ///
    /// Only such a player can run out of data before the real end of the track.
    fn playing_partial(&self) -> bool {
        false
    }

    fn notify_state_change(&self, _state: PlayerState) {}
}

/// Priority-ordered backend chain.
#[derive(Clone)]
pub struct BackendSelector {
    chain: Vec<Arc<dyn PlaybackBackend>>,
    fallback: Arc<dyn PlaybackBackend>,
}

impl BackendSelector {
    /// Chain that always falls back to `fallback`.
    pub fn new(fallback: Arc<dyn PlaybackBackend>) -> Self {
        Self {
            chain: Vec::new(),
            fallback,
        }
    }

    /// Append a backend with lower priority than those already added.
    pub fn with_backend(mut self, backend: Arc<dyn PlaybackBackend>) -> Self {
        self.chain.push(backend);
        self
    }

    /// First backend in priority order that accepts `entry`.
    pub fn select(&self, entry: &TrackFetchEntry) -> Arc<dyn PlaybackBackend> {
        self.chain
            .iter()
            .find(|b| b.can_play(entry))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn backends(&self) -> impl Iterator<Item = &Arc<dyn PlaybackBackend>> {
        self.chain.iter().chain(std::iter::once(&self.fallback))
    }
}

impl fmt::Debug for BackendSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.backends().map(|b| b.kind()))
            .finish()
    }
}
