//! # Queue Persistence
//!
//! The play queue, the current index and the play position survive restarts
//! as one JSON document in the host [`SettingsStore`]. Repeat mode and the
//! endless-shuffle flag are stored next to it as plain settings.

use crate::error::Result;
use crate::state::RepeatMode;
use bridge_traits::{SettingsStore, Track};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Settings key of the serialized queue.
pub const SAVED_QUEUE_KEY: &str = "playback.saved_queue";
/// Settings key of the repeat mode.
pub const REPEAT_MODE_KEY: &str = "playback.repeat_mode";
/// Settings key of the endless shuffle flag.
pub const SHUFFLE_PLAY_KEY: &str = "playback.shuffle_play";

/// Snapshot of the play queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedQueue {
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub current_index: Option<usize>,
    #[serde(default)]
    pub position_ms: u64,
}

impl SavedQueue {
    pub fn new(tracks: Vec<Track>, current_index: Option<usize>, position_ms: u64) -> Self {
        Self {
            tracks,
            current_index,
            position_ms,
        }
    }

    pub fn track_ids(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.id.clone()).collect()
    }

    /// Current index, dropped when it does not point into `tracks`.
    pub fn valid_index(&self) -> Option<usize> {
        self.current_index.filter(|i| *i < self.tracks.len())
    }
}

/// Typed access to the playback settings.
pub struct QueueStorage<'a> {
    store: &'a dyn SettingsStore,
}

impl<'a> QueueStorage<'a> {
    pub fn new(store: &'a dyn SettingsStore) -> Self {
        Self { store }
    }

    pub async fn save(&self, queue: &SavedQueue) -> Result<()> {
        let json = serde_json::to_string(queue)?;
        self.store.set_string(SAVED_QUEUE_KEY, &json).await?;
        debug!(
            tracks = queue.tracks.len(),
            index = ?queue.current_index,
            position_ms = queue.position_ms,
            "Saved play queue"
        );
        Ok(())
    }

    /// Load the saved queue. A corrupt document is discarded.
    pub async fn load(&self) -> Result<Option<SavedQueue>> {
        let Some(json) = self.store.get_string(SAVED_QUEUE_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(queue) => Ok(Some(queue)),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable saved queue");
                self.store.delete(SAVED_QUEUE_KEY).await?;
                Ok(None)
            }
        }
    }

    pub async fn save_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.store.set_string(REPEAT_MODE_KEY, mode.as_str()).await?;
        Ok(())
    }

    pub async fn load_repeat_mode(&self) -> Result<RepeatMode> {
        let stored = self.store.get_string(REPEAT_MODE_KEY).await?;
        Ok(stored
            .and_then(|s| s.parse().ok())
            .unwrap_or_default())
    }

    pub async fn save_shuffle_play(&self, enabled: bool) -> Result<()> {
        self.store.set_bool(SHUFFLE_PLAY_KEY, enabled).await?;
        Ok(())
    }

    pub async fn load_shuffle_play(&self) -> Result<bool> {
        Ok(self.store.get_bool(SHUFFLE_PLAY_KEY).await?.unwrap_or(false))
    }
}
