//! # Desktop Bridge Implementations
//!
//! Default implementations of the storage, transfer and connectivity bridges
//! for desktop platforms (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` with `Range` resume
//! - `FileSystemAccess` using `tokio::fs` below the user cache directory
//! - `SettingsStore` using a SQLite-backed key-value table
//! - `NetworkMonitor` using a TCP reachability probe
//!
//! Players, the music server client, the jukebox and the streaming SDK are
//! host-specific and have no desktop default.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, TokioFileSystem};
//!
//! let http = ReqwestHttpClient::new()?;
//! let fs = TokioFileSystem::with_cache_dir("/var/cache/player".into());
//! ```

mod filesystem;
mod http;
mod network;
mod settings;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use network::DesktopNetworkMonitor;
pub use settings::SqliteSettingsStore;
