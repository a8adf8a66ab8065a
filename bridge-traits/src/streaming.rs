//! Third-party streaming SDK abstraction.
//!
//! Some tracks are not served by the music server at all but by an external
//! streaming service whose SDK owns playback end to end. The core treats that
//! SDK as a black box: it issues transport commands and reacts to the events
//! the SDK posts back.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Notifications raised by the streaming SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamingEvent {
    /// The SDK started (or resumed) playing `uri`.
    Playing { uri: String },
    /// Playback of `uri` was paused by the SDK or the remote device.
    Paused { uri: String },
    /// `uri` played to its end.
    TrackEnded { uri: String },
    /// The SDK failed; the session may need to be re-established.
    Error { message: String },
}

/// Channel the core listens on for [`StreamingEvent`]s.
pub type StreamingEventSender = mpsc::UnboundedSender<StreamingEvent>;

#[async_trait]
pub trait StreamingSdk: Send + Sync {
    /// Establish the SDK session and register the event channel.
    async fn connect(&self, events: StreamingEventSender) -> Result<()>;

    async fn play_uri(&self, uri: &str, position_ms: u64) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    async fn seek(&self, position_ms: u64) -> Result<()>;

    async fn position_ms(&self) -> Result<u64>;

    /// Tear down the SDK session.
    async fn disconnect(&self) -> Result<()>;
}
