//! # Playback Error Types
//!
//! Error types for queue control, backend dispatch and state-machine checks.

use bridge_traits::BridgeError;
use core_download::DownloadError;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// A host bridge (player, jukebox, streaming SDK, settings) failed.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Track acquisition failed.
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    /// The requested backend or service was not configured.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    // ========================================================================
    // State Errors
    // ========================================================================
    /// A player state machine was asked to make a transition it does not allow.
    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    /// Attempted operation when no track is current.
    #[error("No track loaded")]
    NoTrackLoaded,

    /// Invalid volume value (must be in range [0.0, 1.0]).
    #[error("Invalid volume: {0} (must be between 0.0 and 1.0)")]
    InvalidVolume(f32),

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    /// Saved queue could not be encoded or decoded.
    #[error("Queue serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::Bridge(e) => e.is_transient(),
            PlaybackError::Download(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns `true` if the error came out of a playback backend call.
    pub fn is_backend_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::Bridge(_) | PlaybackError::BackendUnavailable(_)
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
