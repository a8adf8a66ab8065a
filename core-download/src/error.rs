//! Error types for track acquisition and queue bookkeeping.

use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Track storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Downloaded file for track {track_id} is empty")]
    EmptyFile { track_id: String },

    #[error("Size mismatch for track {track_id}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        track_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DownloadError {
    /// Whether a later scan may succeed without intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            DownloadError::Bridge(e) => e.is_transient(),
            DownloadError::Io(_) | DownloadError::Cancelled | DownloadError::StorageUnavailable(_) => {
                true
            }
            DownloadError::SizeMismatch { .. } => true,
            DownloadError::EmptyFile { .. } | DownloadError::InvalidConfig(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
