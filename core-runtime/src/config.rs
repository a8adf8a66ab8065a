//! # Core Configuration Module
//!
//! Builder for the collaborators and feature switches of the playback core.
//!
//! ## Overview
//!
//! [`CoreConfig::builder`] collects the host bridges, applies desktop defaults
//! where the `desktop-shims` feature provides them, and validates that every
//! enabled feature has the bridge it needs before anything starts.
//!
//! ## Required Dependencies
//!
//! - `PlayerFactory` - local decoder instances (no default on any platform)
//! - `HttpClient` - track transfers (desktop default: reqwest)
//! - `FileSystemAccess` - track cache (desktop default: tokio fs under `cache_dir`)
//! - `SettingsStore` - preferences and the saved queue (desktop default: SQLite)
//!
//! ## Optional Dependencies
//!
//! - `MusicService` - stars, bookmarks, playlists, user roles, scrobbling
//! - `ShuffleSource` - endless shuffle
//! - `JukeboxClient` - server-side playback
//! - `StreamingSdk` - external streaming backend
//! - `NetworkMonitor` - gates transfers on connectivity
//! - `Clock` - defaults to the system clock
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/player/settings.db")
//!     .cache_dir("/data/player/cache")
//!     .player_factory(Arc::new(MyPlayerFactory))
//!     .music_service(Arc::new(MyServerClient))
//!     .enable_scrobbling(true)
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! Missing bridges produce [`Error::CapabilityMissing`] with a message naming
//! the trait and how to provide it; inconsistent feature flags produce
//! [`Error::Config`].

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, FileSystemAccess, HttpClient, JukeboxClient, MusicService, NetworkMonitor,
    PlayerFactory, SettingsStore, ShuffleSource, StreamingSdk, SystemClock,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolved collaborators and settings for the playback core.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite settings database (desktop default store)
    pub database_path: PathBuf,

    /// Root of the track cache
    pub cache_dir: PathBuf,

    pub player_factory: Arc<dyn PlayerFactory>,
    pub http_client: Arc<dyn HttpClient>,
    pub file_system: Arc<dyn FileSystemAccess>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub music_service: Option<Arc<dyn MusicService>>,
    pub shuffle_source: Option<Arc<dyn ShuffleSource>>,
    pub jukebox_client: Option<Arc<dyn JukeboxClient>>,
    pub streaming_sdk: Option<Arc<dyn StreamingSdk>>,
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,
    pub clock: Arc<dyn Clock>,

    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("cache_dir", &self.cache_dir)
            .field("music_service", &self.music_service.is_some())
            .field("shuffle_source", &self.shuffle_source.is_some())
            .field("jukebox_client", &self.jukebox_client.is_some())
            .field("streaming_sdk", &self.streaming_sdk.is_some())
            .field("network_monitor", &self.network_monitor.is_some())
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

/// Feature flags control optional functionality.
///
/// Each flag needs the matching bridge; [`CoreConfig::validate`] rejects a
/// flag without its bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    /// Allow switching playback to the server jukebox (needs `JukeboxClient` and `MusicService`)
    pub enable_jukebox: bool,

    /// Route `spotify:` URIs to the external streaming backend (needs `StreamingSdk`)
    pub enable_streaming_backend: bool,

    /// Report now-playing and finished listens (needs `MusicService`)
    pub enable_scrobbling: bool,

    /// Keep the queue topped up from the shuffle buffer (needs `ShuffleSource`)
    pub enable_endless_shuffle: bool,

    /// Only transfer while connected (needs `NetworkMonitor`)
    pub enable_network_awareness: bool,
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Check paths and feature/bridge consistency.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        let checks: [(bool, bool, &str); 5] = [
            (
                self.features.enable_jukebox,
                self.jukebox_client.is_some() && self.music_service.is_some(),
                "Jukebox enabled but JukeboxClient or MusicService missing",
            ),
            (
                self.features.enable_streaming_backend,
                self.streaming_sdk.is_some(),
                "Streaming backend enabled but no StreamingSdk provided",
            ),
            (
                self.features.enable_scrobbling,
                self.music_service.is_some(),
                "Scrobbling enabled but no MusicService provided",
            ),
            (
                self.features.enable_endless_shuffle,
                self.shuffle_source.is_some(),
                "Endless shuffle enabled but no ShuffleSource provided",
            ),
            (
                self.features.enable_network_awareness,
                self.network_monitor.is_some(),
                "Network awareness enabled but no NetworkMonitor provided",
            ),
        ];

        for (enabled, satisfied, message) in checks {
            if enabled && !satisfied {
                return Err(Error::Config(format!(
                    "{}. Disable the feature or inject the implementation.",
                    message
                )));
            }
        }

        Ok(())
    }
}

fn player_factory_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "PlayerFactory".to_string(),
        message: "A PlayerFactory is required to create local decoders. \
                 Desktop: wrap the audio output library of the host application. \
                 Mobile: wrap the platform media player."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn desktop_default_missing_error(capability: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required. \
             Desktop: enable the 'desktop-shims' feature to use the bundled default. \
             Mobile: inject the platform adapter.",
            capability
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::new()
        .map_err(|source| Error::DefaultAdapter {
            adapter: "HttpClient",
            source,
        })?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(desktop_default_missing_error("HttpClient"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system(cache_dir: &Path) -> Result<Arc<dyn FileSystemAccess>> {
    Ok(Arc::new(bridge_desktop::TokioFileSystem::with_cache_dir(
        cache_dir.to_path_buf(),
    )))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system(_cache_dir: &Path) -> Result<Arc<dyn FileSystemAccess>> {
    Err(desktop_default_missing_error("FileSystemAccess"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(database_path: &Path) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use tokio::runtime::{Builder, Handle};

    let init_store = |path: PathBuf| -> Result<SqliteSettingsStore> {
        let runtime = Builder::new_current_thread().enable_all().build().map_err(|e| {
            Error::Internal(format!(
                "Failed to create Tokio runtime for default settings store: {}",
                e
            ))
        })?;

        runtime
            .block_on(SqliteSettingsStore::new(path))
            .map_err(|source| Error::DefaultAdapter {
                adapter: "SettingsStore",
                source,
            })
    };

    let path = database_path.to_path_buf();
    let store = match Handle::try_current() {
        // Cannot block_on inside a runtime; build on a scratch thread.
        Ok(_) => thread::spawn(move || init_store(path)).join().map_err(|_| {
            Error::Internal("Thread panicked while creating default SettingsStore".to_string())
        })??,
        Err(_) => init_store(path)?,
    };

    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(_database_path: &Path) -> Result<Arc<dyn SettingsStore>> {
    Err(desktop_default_missing_error("SettingsStore"))
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    player_factory: Option<Arc<dyn PlayerFactory>>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    music_service: Option<Arc<dyn MusicService>>,
    shuffle_source: Option<Arc<dyn ShuffleSource>>,
    jukebox_client: Option<Arc<dyn JukeboxClient>>,
    streaming_sdk: Option<Arc<dyn StreamingSdk>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Option<Arc<dyn Clock>>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    pub fn player_factory(mut self, factory: Arc<dyn PlayerFactory>) -> Self {
        self.player_factory = Some(factory);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn music_service(mut self, service: Arc<dyn MusicService>) -> Self {
        self.music_service = Some(service);
        self
    }

    pub fn shuffle_source(mut self, source: Arc<dyn ShuffleSource>) -> Self {
        self.shuffle_source = Some(source);
        self
    }

    pub fn jukebox_client(mut self, client: Arc<dyn JukeboxClient>) -> Self {
        self.jukebox_client = Some(client);
        self
    }

    pub fn streaming_sdk(mut self, sdk: Arc<dyn StreamingSdk>) -> Self {
        self.streaming_sdk = Some(sdk);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn enable_jukebox(mut self, enabled: bool) -> Self {
        self.features.enable_jukebox = enabled;
        self
    }

    pub fn enable_streaming_backend(mut self, enabled: bool) -> Self {
        self.features.enable_streaming_backend = enabled;
        self
    }

    pub fn enable_scrobbling(mut self, enabled: bool) -> Self {
        self.features.enable_scrobbling = enabled;
        self
    }

    pub fn enable_endless_shuffle(mut self, enabled: bool) -> Self {
        self.features.enable_endless_shuffle = enabled;
        self
    }

    pub fn enable_network_awareness(mut self, enabled: bool) -> Self {
        self.features.enable_network_awareness = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Resolve defaults and validate.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when a path is missing or a feature lacks its bridge
    /// - [`Error::CapabilityMissing`] when a required bridge has no default
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let cache_dir = self.cache_dir.ok_or_else(|| {
            Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
        })?;

        let player_factory = self.player_factory.ok_or_else(player_factory_missing_error)?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system(&cache_dir)?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(&database_path)?,
        };

        let config = CoreConfig {
            database_path,
            cache_dir,
            player_factory,
            http_client,
            file_system,
            settings_store,
            music_service: self.music_service,
            shuffle_source: self.shuffle_source,
            jukebox_client: self.jukebox_client,
            streaming_sdk: self.streaming_sdk,
            network_monitor: self.network_monitor,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}
