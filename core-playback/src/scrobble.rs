//! Now-playing and submission reports to the music service.

use crate::state::PlayerState;
use bridge_traits::MusicService;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which report a state change calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrobbleKind {
    NowPlaying,
    Submission,
}

/// Tracks which reports were already sent for the current track.
#[derive(Debug, Default)]
pub struct ScrobbleTracker {
    track_id: Option<String>,
    now_playing_sent: bool,
    submission_sent: bool,
}

impl ScrobbleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report due for `track_id` entering `state`, marking it as sent.
    ///
    /// Each kind is reported at most once per track; switching tracks
    /// starts over.
    pub fn observe(&mut self, track_id: &str, state: PlayerState) -> Option<ScrobbleKind> {
        if self.track_id.as_deref() != Some(track_id) {
            self.track_id = Some(track_id.to_string());
            self.now_playing_sent = false;
            self.submission_sent = false;
        }

        match state {
            PlayerState::Started if !self.now_playing_sent => {
                self.now_playing_sent = true;
                Some(ScrobbleKind::NowPlaying)
            }
            PlayerState::Completed if !self.submission_sent => {
                self.submission_sent = true;
                Some(ScrobbleKind::Submission)
            }
            _ => None,
        }
    }

    /// Forget the current track so replaying it reports again.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Send a report without blocking the caller.
pub fn send(service: Arc<dyn MusicService>, track_id: String, kind: ScrobbleKind) {
    tokio::spawn(async move {
        let submission = kind == ScrobbleKind::Submission;
        match service.scrobble(&track_id, submission).await {
            Ok(()) => debug!(track_id = %track_id, submission, "Scrobbled"),
            Err(e) => warn!(track_id = %track_id, submission, error = %e, "Scrobble failed"),
        }
    });
}
