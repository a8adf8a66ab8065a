//! External streaming-service backend.
//!
//! Tracks whose URI carries the service scheme are handed to the SDK by URI.
//! The SDK owns decoding and output; it reports back through
//! [`StreamingEvent`](bridge_traits::StreamingEvent)s.

use super::{BackendKind, PlayOutcome, PlayRequest, PlaybackBackend};
use crate::error::Result;
use async_trait::async_trait;
use bridge_traits::{StreamingEventSender, StreamingSdk};
use core_download::TrackFetchEntry;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub struct StreamingBackend {
    sdk: Arc<dyn StreamingSdk>,
    events: StreamingEventSender,
    scheme: String,
    connected: AtomicBool,
    current_uri: Mutex<Option<String>>,
}

impl StreamingBackend {
    pub fn new(sdk: Arc<dyn StreamingSdk>, events: StreamingEventSender, scheme: impl Into<String>) -> Self {
        Self {
            sdk,
            events,
            scheme: scheme.into(),
            connected: AtomicBool::new(false),
            current_uri: Mutex::new(None),
        }
    }

    /// URI handed to the SDK most recently.
    pub fn current_uri(&self) -> Option<String> {
        self.current_uri.lock().clone()
    }

    /// Whether `uri` belongs to the streaming service.
    pub fn handles_uri(&self, uri: &str) -> bool {
        uri.starts_with(&self.scheme)
    }
}

#[async_trait]
impl PlaybackBackend for StreamingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Streaming
    }

    async fn init(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        self.sdk.connect(self.events.clone()).await?;
        self.connected.store(true, Ordering::Release);
        info!("Streaming SDK connected");
        Ok(())
    }

    fn can_play(&self, entry: &TrackFetchEntry) -> bool {
        self.handles_uri(&entry.track().stream_uri)
    }

    fn can_download(&self) -> bool {
        false
    }

    async fn play(&self, entry: &Arc<TrackFetchEntry>, request: PlayRequest) -> Result<PlayOutcome> {
        self.init().await?;

        let uri = entry.track().stream_uri.clone();
        debug!(track_id = entry.id(), position_ms = request.position_ms, "Streaming play");
        self.sdk.play_uri(&uri, request.position_ms).await?;
        *self.current_uri.lock() = Some(uri);

        if request.auto_start {
            Ok(PlayOutcome::Started)
        } else {
            self.sdk.pause().await?;
            Ok(PlayOutcome::Paused)
        }
    }

    async fn pause(&self) -> Result<()> {
        self.sdk.pause().await?;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.sdk.resume().await?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.sdk.pause().await?;
        Ok(())
    }

    async fn seek(&self, _index: usize, position_ms: u64) -> Result<()> {
        self.sdk.seek(position_ms).await?;
        Ok(())
    }

    async fn position_ms(&self) -> Result<u64> {
        Ok(self.sdk.position_ms().await?)
    }

    async fn duration_ms(&self) -> Result<Option<u64>> {
        Ok(None)
    }

    async fn set_volume(&self, _volume: f32) -> Result<()> {
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        if self.current_uri.lock().take().is_some() {
            self.sdk.pause().await?;
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.reset().await?;
        if self.connected.swap(false, Ordering::AcqRel) {
            self.sdk.disconnect().await?;
        }
        Ok(())
    }
}
