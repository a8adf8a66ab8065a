//! # Host Bridge Traits
//!
//! Collaborator contracts the playback core depends on but does not implement.
//!
//! ## Overview
//!
//! The playback/download core decides what to fetch and what to play. Everything
//! that touches a platform or a remote protocol is reached through the traits in
//! this crate, and each host ships adapters for them (`bridge-desktop` for
//! desktop targets, platform code on mobile).
//!
//! ## Traits
//!
//! ### Storage & Transfer
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Track cache files
//! - [`SettingsStore`](storage::SettingsStore) - Preferences and the persisted queue
//! - [`HttpClient`](http::HttpClient) - Resumable byte-stream downloads
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity gating
//!
//! ### Remote Services
//! - [`MusicService`](music::MusicService) - Stars, bookmarks, playlists, roles, scrobbles
//! - [`ShuffleSource`](music::ShuffleSource) - Shuffle buffer for endless shuffle
//! - [`JukeboxClient`](music::JukeboxClient) - Server-side playback transport
//! - [`StreamingSdk`](streaming::StreamingSdk) - Black-box external streaming service
//!
//! ### Playback Primitive
//! - [`Player`](playback::Player) / [`PlayerFactory`](playback::PlayerFactory) -
//!   Opaque local decoder with completion and error events
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits return [`BridgeError`](error::BridgeError). Adapters convert
//! platform errors into it and keep messages actionable (paths, status codes).
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync`; the core shares adapters across tasks
//! behind `Arc`.

pub mod error;
pub mod http;
pub mod music;
pub mod network;
pub mod playback;
pub mod storage;
pub mod streaming;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{ByteStream, HttpClient, RetryPolicy};
pub use music::{JukeboxClient, JukeboxStatus, MusicService, ShuffleSource, Track, UserInfo};
pub use network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use playback::{Player, PlayerEvent, PlayerEventSender, PlayerFactory, PlayerId};
pub use storage::{FileMetadata, FileSystemAccess, SettingsStore, WriteStream};
pub use streaming::{StreamingEvent, StreamingEventSender, StreamingSdk};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
