//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (player factory,
//! HTTP, filesystem, settings, music server clients) into the download and
//! playback cores. Desktop apps typically enable the `desktop-shims` feature
//! (which depends on `bridge-desktop`) and call [`bootstrap_desktop`]; other
//! hosts build a [`CoreConfig`] themselves and hand it to
//! [`CoreService::start`].
//!
//! Feature flags on the config decide which optional bridges reach the
//! playback coordinator: a jukebox client given while `enable_jukebox` is off
//! is not used, and so on for streaming, endless shuffle and network
//! awareness. `enable_scrobbling` switches scrobble reports on.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use core_download::{DownloadConfig, FetchContext};
use core_playback::{PlaybackConfig, PlaybackCoordinator, PlaybackDependencies};
use core_runtime::config::{CoreConfig, FeatureFlags};
use core_runtime::events::{EventBus, EventStream};
use tracing::{info, instrument};

#[cfg(feature = "desktop-shims")]
use bridge_traits::PlayerFactory;
#[cfg(feature = "desktop-shims")]
use std::path::PathBuf;

/// Buffered events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 512;

/// Aggregated handle to the bridges and tunables the core requires.
pub struct CoreDependencies {
    pub config: CoreConfig,
    pub download: DownloadConfig,
    pub playback: PlaybackConfig,
}

impl CoreDependencies {
    /// Bundle `config` with default download and playback settings.
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            download: DownloadConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }

    pub fn with_download_config(mut self, download: DownloadConfig) -> Self {
        self.download = download;
        self
    }

    pub fn with_playback_config(mut self, playback: PlaybackConfig) -> Self {
        self.playback = playback;
        self
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    events: EventBus,
    playback: PlaybackCoordinator,
    features: FeatureFlags,
}

impl CoreService {
    /// Validate the dependencies and start the playback coordinator.
    #[instrument(skip(deps))]
    pub async fn start(deps: CoreDependencies) -> Result<Self> {
        let CoreDependencies {
            config,
            download,
            playback,
        } = deps;
        config.validate()?;

        let features = config.features;
        let events = EventBus::new(EVENT_CAPACITY);
        let (fetch, fetch_notices) = FetchContext::new(
            Arc::clone(&config.file_system),
            Arc::clone(&config.http_client),
            Arc::clone(&config.clock),
            events.clone(),
            download,
        )?;

        let playback_deps = PlaybackDependencies {
            player_factory: Arc::clone(&config.player_factory),
            fetch,
            fetch_notices,
            settings: Arc::clone(&config.settings_store),
            music_service: config.music_service.clone(),
            shuffle_source: config
                .shuffle_source
                .clone()
                .filter(|_| features.enable_endless_shuffle),
            jukebox: config.jukebox_client.clone().filter(|_| features.enable_jukebox),
            streaming: config
                .streaming_sdk
                .clone()
                .filter(|_| features.enable_streaming_backend),
            network: config
                .network_monitor
                .clone()
                .filter(|_| features.enable_network_awareness),
        };
        let playback_config = playback.with_scrobbling(features.enable_scrobbling);
        let playback = PlaybackCoordinator::new(playback_deps, playback_config).await?;

        info!(?features, "Core service started");
        Ok(Self {
            events,
            playback,
            features,
        })
    }

    pub fn playback(&self) -> &PlaybackCoordinator {
        &self.playback
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// New receiver for every core event.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    pub fn features(&self) -> FeatureFlags {
        self.features
    }

    /// Reload the queue saved by a previous session without starting it.
    pub async fn restore_session(&self) -> Result<bool> {
        Ok(self.playback.restore_saved(false).await?)
    }

    /// Persist the queue and stop playback and transfers.
    pub async fn shutdown(&self) -> Result<()> {
        self.playback.shutdown().await?;
        info!("Core service stopped");
        Ok(())
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("features", &self.features)
            .field("playback", &self.playback)
            .finish_non_exhaustive()
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Keeps the settings database and track cache under `data_dir`, gates
/// transfers on connectivity and restores the previous queue (paused).
///
/// ```ignore
/// use core_service::bootstrap_desktop;
///
/// let core = bootstrap_desktop("/home/me/.local/share/player", Arc::new(MyPlayers)).await?;
/// core.playback().start().await?;
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(
    data_dir: impl Into<PathBuf>,
    player_factory: Arc<dyn PlayerFactory>,
) -> Result<CoreService> {
    let data_dir = data_dir.into();
    let config = CoreConfig::builder()
        .database_path(data_dir.join("settings.db"))
        .cache_dir(data_dir.join("cache"))
        .player_factory(player_factory)
        .network_monitor(Arc::new(bridge_desktop::DesktopNetworkMonitor::new()))
        .enable_network_awareness(true)
        .build()?;

    let service = CoreService::start(CoreDependencies::new(config)).await?;
    service.restore_session().await?;
    Ok(service)
}
