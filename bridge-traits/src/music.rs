//! Music Service Abstractions
//!
//! Contracts for the remote music server the client talks to. The core does
//! not speak the server protocol; hosts wrap their REST client in these traits.
//!
//! - [`MusicService`] - annotations, bookmarks, playlists, user capabilities, scrobbling
//! - [`ShuffleSource`] - the shuffle buffer feeding the endless shuffle queue
//! - [`JukeboxClient`] - transport commands for server-side playback

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Reference to one playable track as described by the music server.
///
/// Equality and hashing cover every field; lookups that only care about
/// identity should compare [`Track::id`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    /// Track length in milliseconds, when the server knows it.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Stream bitrate in kbit/s.
    #[serde(default)]
    pub bitrate_kbps: Option<u32>,
    /// Expected size of the transferred file in bytes.
    #[serde(default)]
    pub size_bytes: Option<u64>,
    /// File extension of the transferred file (`mp3`, `flac`, ...).
    #[serde(default)]
    pub suffix: Option<String>,
    /// Server-side content path, used to lay out the local cache.
    #[serde(default)]
    pub path: Option<String>,
    /// URI the audio is fetched or played from.
    pub stream_uri: String,
    /// Saved resume position, if the user bookmarked this track.
    #[serde(default)]
    pub bookmark_position_ms: Option<u64>,
}

impl Track {
    /// Create a track with only the identifying fields set.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        stream_uri: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: None,
            album: None,
            duration_ms: None,
            bitrate_kbps: None,
            size_bytes: None,
            suffix: None,
            path: None,
            stream_uri: stream_uri.into(),
            bookmark_position_ms: None,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_bitrate_kbps(mut self, bitrate: u32) -> Self {
        self.bitrate_kbps = Some(bitrate);
        self
    }

    pub fn with_size_bytes(mut self, size: u64) -> Self {
        self.size_bytes = Some(size);
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_bookmark_ms(mut self, position_ms: u64) -> Self {
        self.bookmark_position_ms = Some(position_ms);
        self
    }

    /// Whether a positive bookmark is attached.
    pub fn has_bookmark(&self) -> bool {
        self.bookmark_position_ms.is_some_and(|p| p > 0)
    }

    /// Whether the stream URI can be fetched over HTTP.
    pub fn is_fetchable(&self) -> bool {
        let uri = self.stream_uri.trim_start();
        uri.starts_with("http://") || uri.starts_with("https://")
    }
}

/// Capabilities granted to the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    pub jukebox_role: bool,
    pub share_role: bool,
}

/// Remote music server operations the playback core relies on.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::music::MusicService;
///
/// async fn can_use_jukebox(service: &dyn MusicService) -> bool {
///     service.get_user().await.map(|u| u.jukebox_role).unwrap_or(false)
/// }
/// ```
#[async_trait]
pub trait MusicService: Send + Sync {
    async fn star(&self, track_id: &str) -> Result<()>;

    async fn unstar(&self, track_id: &str) -> Result<()>;

    async fn create_bookmark(&self, track_id: &str, position_ms: u64) -> Result<()>;

    async fn delete_bookmark(&self, track_id: &str) -> Result<()>;

    /// Create (or overwrite) a server playlist with the given tracks.
    async fn create_playlist(&self, name: &str, track_ids: &[String]) -> Result<()>;

    /// Fetch the current user and their roles.
    async fn get_user(&self) -> Result<UserInfo>;

    /// Report a play. `submission == false` announces "now playing",
    /// `true` records a finished listen.
    async fn scrobble(&self, track_id: &str, submission: bool) -> Result<()>;
}

/// Supplies randomly chosen tracks for the endless shuffle queue.
#[async_trait]
pub trait ShuffleSource: Send + Sync {
    /// Return up to `count` tracks. Fewer may be returned while the buffer refills.
    async fn next_tracks(&self, count: usize) -> Result<Vec<Track>>;
}

/// Snapshot of the server-side player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JukeboxStatus {
    pub current_index: Option<usize>,
    pub playing: bool,
    pub position_secs: u64,
    pub gain: f32,
}

/// Transport control for a jukebox (server-side player).
#[async_trait]
pub trait JukeboxClient: Send + Sync {
    /// Replace the server playlist with `track_ids`.
    async fn update_playlist(&self, track_ids: &[String]) -> Result<JukeboxStatus>;

    /// Jump to `index` in the server playlist at `offset_secs`.
    async fn skip(&self, index: usize, offset_secs: u64) -> Result<JukeboxStatus>;

    async fn start(&self) -> Result<JukeboxStatus>;

    async fn stop(&self) -> Result<JukeboxStatus>;

    /// Set output gain in `[0.0, 1.0]`.
    async fn set_gain(&self, gain: f32) -> Result<JukeboxStatus>;

    async fn status(&self) -> Result<JukeboxStatus>;
}
