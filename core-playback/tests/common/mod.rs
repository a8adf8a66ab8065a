//! Shared fakes and mocks for playback integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    ByteStream, FileMetadata, FileSystemAccess, HttpClient, JukeboxClient, JukeboxStatus,
    MusicService, NetworkInfo, NetworkMonitor, NetworkType, Player, PlayerEvent,
    PlayerEventSender, PlayerFactory, PlayerId, RetryPolicy, SettingsStore, ShuffleSource,
    StreamingEvent, StreamingEventSender, StreamingSdk, SystemClock, Track, UserInfo, WriteStream,
};
use core_download::{DownloadConfig, FetchContext};
use core_playback::{
    NextPlayerState, PlaybackConfig, PlaybackCoordinator, PlaybackDependencies, PlayerState,
};
use core_runtime::events::{CoreEvent, EventBus, EventStream, PlaybackEvent};
use tokio::sync::broadcast::error::RecvError;
use mockall::mock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};

// ============================================================================
// File system
// ============================================================================

type Files = Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>;

#[derive(Clone, Default)]
pub struct MemoryFs {
    files: Files,
    unmounted: Arc<AtomicBool>,
}

impl MemoryFs {
    /// Simulate the cache volume going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.unmounted.store(!available, Ordering::SeqCst);
    }
}

struct MemoryWriter {
    files: Files,
    path: PathBuf,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.files
            .lock()
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl FileSystemAccess for MemoryFs {
    async fn get_cache_directory(&self) -> BridgeResult<PathBuf> {
        Ok(PathBuf::from("/cache"))
    }

    async fn is_available(&self) -> bool {
        !self.unmounted.load(Ordering::SeqCst)
    }

    async fn exists(&self, path: &Path) -> BridgeResult<bool> {
        Ok(self.files.lock().contains_key(path))
    }

    async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata> {
        self.files
            .lock()
            .get(path)
            .map(|data| FileMetadata {
                size: data.len() as u64,
                modified_at: None,
                is_directory: false,
            })
            .ok_or_else(|| BridgeError::Storage(format!("{} not found", path.display())))
    }

    async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> BridgeResult<()> {
        let mut files = self.files.lock();
        let data = files
            .remove(from)
            .ok_or_else(|| BridgeError::Storage(format!("{} not found", from.display())))?;
        files.insert(to.to_path_buf(), data);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> BridgeResult<()> {
        self.files.lock().remove(path);
        Ok(())
    }

    async fn open_append_stream(&self, path: &Path) -> BridgeResult<WriteStream> {
        self.files.lock().entry(path.to_path_buf()).or_default();
        Ok(Box::new(MemoryWriter {
            files: Arc::clone(&self.files),
            path: path.to_path_buf(),
        }))
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Serves registered bodies. A held URL delivers its first `prefix` bytes
/// and keeps the stream open until released.
#[derive(Clone, Default)]
pub struct ScriptedHttp {
    bodies: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    held: Arc<Mutex<HashMap<String, usize>>>,
    pending: Arc<Mutex<HashMap<String, (DuplexStream, Vec<u8>)>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl ScriptedHttp {
    pub fn serve(&self, url: &str, body: Vec<u8>) {
        self.bodies.lock().insert(url.to_string(), body);
    }

    pub fn hold(&self, url: &str, prefix: usize) {
        self.held.lock().insert(url.to_string(), prefix);
    }

    pub fn release(&self, url: &str) {
        self.held.lock().remove(url);
        if let Some((mut writer, rest)) = self.pending.lock().remove(url) {
            tokio::spawn(async move {
                let _ = writer.write_all(&rest).await;
            });
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn download_stream(&self, url: &str, offset: u64, _policy: RetryPolicy) -> BridgeResult<ByteStream> {
        self.requests.lock().push(url.to_string());
        let body = self.bodies.lock().get(url).cloned().ok_or_else(|| BridgeError::Remote {
            code: 404,
            message: "not found".to_string(),
        })?;
        let remaining = body.get(offset as usize..).unwrap_or_default().to_vec();

        let held = self.held.lock().get(url).copied();
        match held {
            Some(prefix) => {
                let prefix = prefix.min(remaining.len());
                let (reader, mut writer) = tokio::io::duplex(4 * 1024 * 1024);
                writer
                    .write_all(&remaining[..prefix])
                    .await
                    .map_err(BridgeError::Io)?;
                self.pending
                    .lock()
                    .insert(url.to_string(), (writer, remaining[prefix..].to_vec()));
                Ok(Box::new(reader))
            }
            None => Ok(Box::new(io::Cursor::new(remaining))),
        }
    }
}

// ============================================================================
// Player
// ============================================================================

pub struct FakePlayer {
    id: PlayerId,
    events: PlayerEventSender,
    calls: Mutex<Vec<String>>,
    source: Mutex<Option<PathBuf>>,
    position: AtomicU64,
    duration: AtomicU64,
    has_next: AtomicBool,
    released: AtomicBool,
}

impl FakePlayer {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn source(&self) -> Option<PathBuf> {
        self.source.lock().clone()
    }

    pub fn source_name(&self) -> String {
        self.source()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default()
    }

    pub fn set_position(&self, position_ms: u64) {
        self.position.store(position_ms, Ordering::SeqCst);
    }

    pub fn set_duration(&self, duration_ms: u64) {
        self.duration.store(duration_ms, Ordering::SeqCst);
    }

    pub fn has_next(&self) -> bool {
        self.has_next.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn complete(&self) {
        let _ = self.events.send(PlayerEvent::Completed { player: self.id });
    }

    pub fn fail(&self, message: &str) {
        let _ = self.events.send(PlayerEvent::Error {
            player: self.id,
            code: -38,
            message: message.to_string(),
        });
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

#[async_trait]
impl Player for FakePlayer {
    fn id(&self) -> PlayerId {
        self.id
    }

    async fn set_source(&self, path: &Path) -> BridgeResult<()> {
        self.record("set_source");
        *self.source.lock() = Some(path.to_path_buf());
        Ok(())
    }

    async fn prepare(&self) -> BridgeResult<()> {
        self.record("prepare");
        Ok(())
    }

    async fn start(&self) -> BridgeResult<()> {
        self.record("start");
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        self.record("pause");
        Ok(())
    }

    async fn stop(&self) -> BridgeResult<()> {
        self.record("stop");
        Ok(())
    }

    async fn reset(&self) -> BridgeResult<()> {
        self.record("reset");
        self.position.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self) -> BridgeResult<()> {
        self.record("release");
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn seek_to(&self, position_ms: u64) -> BridgeResult<()> {
        self.record(format!("seek:{position_ms}"));
        self.position.store(position_ms, Ordering::SeqCst);
        Ok(())
    }

    async fn position_ms(&self) -> BridgeResult<u64> {
        Ok(self.position.load(Ordering::SeqCst))
    }

    async fn duration_ms(&self) -> BridgeResult<u64> {
        Ok(self.duration.load(Ordering::SeqCst))
    }

    async fn set_volume(&self, volume: f32) -> BridgeResult<()> {
        self.record(format!("volume:{volume}"));
        Ok(())
    }

    async fn set_next_player(&self, next: Option<Arc<dyn Player>>) -> BridgeResult<()> {
        self.has_next.store(next.is_some(), Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakePlayerFactory {
    players: Arc<Mutex<Vec<Arc<FakePlayer>>>>,
}

impl FakePlayerFactory {
    pub fn players(&self) -> Vec<Arc<FakePlayer>> {
        self.players.lock().clone()
    }

    pub fn created(&self) -> usize {
        self.players.lock().len()
    }

    /// Player whose source points at `name`, most recent first.
    pub fn playing(&self, name: &str) -> Option<Arc<FakePlayer>> {
        self.players
            .lock()
            .iter()
            .rev()
            .find(|p| !p.is_released() && p.source_name().contains(name))
            .cloned()
    }
}

impl PlayerFactory for FakePlayerFactory {
    fn create(&self, events: PlayerEventSender) -> BridgeResult<Arc<dyn Player>> {
        let player = Arc::new(FakePlayer {
            id: PlayerId::new(),
            events,
            calls: Mutex::new(Vec::new()),
            source: Mutex::new(None),
            position: AtomicU64::new(0),
            duration: AtomicU64::new(0),
            has_next: AtomicBool::new(false),
            released: AtomicBool::new(false),
        });
        self.players.lock().push(Arc::clone(&player));
        Ok(player)
    }
}

// ============================================================================
// Settings, network, shuffle, streaming
// ============================================================================

#[derive(Clone, Default)]
pub struct MemorySettings {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySettings {
    pub fn raw(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.raw(key))
    }

    async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
        self.set_string(key, &value.to_string()).await
    }

    async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
        Ok(self.raw(key).and_then(|v| v.parse().ok()))
    }

    async fn set_i64(&self, key: &str, value: i64) -> BridgeResult<()> {
        self.set_string(key, &value.to_string()).await
    }

    async fn get_i64(&self, key: &str) -> BridgeResult<Option<i64>> {
        Ok(self.raw(key).and_then(|v| v.parse().ok()))
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

#[derive(Clone)]
pub struct FakeNetwork {
    connected: Arc<AtomicBool>,
}

impl FakeNetwork {
    pub fn online() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl NetworkMonitor for FakeNetwork {
    async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(NetworkInfo::connected(NetworkType::WiFi))
        } else {
            Ok(NetworkInfo::disconnected())
        }
    }
}

/// Hands out served tracks `s0`, `s1`, ...
#[derive(Clone)]
pub struct FakeShuffle {
    http: ScriptedHttp,
    counter: Arc<AtomicUsize>,
}

#[async_trait]
impl ShuffleSource for FakeShuffle {
    async fn next_tracks(&self, count: usize) -> BridgeResult<Vec<Track>> {
        Ok((0..count)
            .map(|_| {
                let n = self.counter.fetch_add(1, Ordering::SeqCst);
                let track = track(&format!("s{n}"), SMALL);
                self.http.serve(&track.stream_uri, body(SMALL));
                track
            })
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct FakeStreaming {
    events: Arc<Mutex<Option<StreamingEventSender>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeStreaming {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn emit(&self, event: StreamingEvent) {
        if let Some(sender) = self.events.lock().as_ref() {
            let _ = sender.send(event);
        }
    }
}

#[async_trait]
impl StreamingSdk for FakeStreaming {
    async fn connect(&self, events: StreamingEventSender) -> BridgeResult<()> {
        self.calls.lock().push("connect".to_string());
        *self.events.lock() = Some(events);
        Ok(())
    }

    async fn play_uri(&self, uri: &str, position_ms: u64) -> BridgeResult<()> {
        self.calls.lock().push(format!("play:{uri}@{position_ms}"));
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        self.calls.lock().push("pause".to_string());
        Ok(())
    }

    async fn resume(&self) -> BridgeResult<()> {
        self.calls.lock().push("resume".to_string());
        Ok(())
    }

    async fn seek(&self, position_ms: u64) -> BridgeResult<()> {
        self.calls.lock().push(format!("seek:{position_ms}"));
        Ok(())
    }

    async fn position_ms(&self) -> BridgeResult<u64> {
        Ok(0)
    }

    async fn disconnect(&self) -> BridgeResult<()> {
        self.calls.lock().push("disconnect".to_string());
        Ok(())
    }
}

// ============================================================================
// Mocks
// ============================================================================

mock! {
    pub Music {}

    #[async_trait]
    impl MusicService for Music {
        async fn star(&self, track_id: &str) -> BridgeResult<()>;
        async fn unstar(&self, track_id: &str) -> BridgeResult<()>;
        async fn create_bookmark(&self, track_id: &str, position_ms: u64) -> BridgeResult<()>;
        async fn delete_bookmark(&self, track_id: &str) -> BridgeResult<()>;
        async fn create_playlist(&self, name: &str, track_ids: &[String]) -> BridgeResult<()>;
        async fn get_user(&self) -> BridgeResult<UserInfo>;
        async fn scrobble(&self, track_id: &str, submission: bool) -> BridgeResult<()>;
    }
}

mock! {
    pub Jukebox {}

    #[async_trait]
    impl JukeboxClient for Jukebox {
        async fn update_playlist(&self, track_ids: &[String]) -> BridgeResult<JukeboxStatus>;
        async fn skip(&self, index: usize, offset_secs: u64) -> BridgeResult<JukeboxStatus>;
        async fn start(&self) -> BridgeResult<JukeboxStatus>;
        async fn stop(&self) -> BridgeResult<JukeboxStatus>;
        async fn set_gain(&self, gain: f32) -> BridgeResult<JukeboxStatus>;
        async fn status(&self) -> BridgeResult<JukeboxStatus>;
    }
}

/// Jukebox mock that records every command.
pub fn recording_jukebox(log: Arc<Mutex<Vec<String>>>) -> MockJukebox {
    let mut jukebox = MockJukebox::new();
    let l = Arc::clone(&log);
    jukebox.expect_update_playlist().returning(move |ids| {
        l.lock().push(format!("playlist:{}", ids.join(",")));
        Ok(JukeboxStatus::default())
    });
    let l = Arc::clone(&log);
    jukebox.expect_skip().returning(move |index, offset| {
        l.lock().push(format!("skip:{index}@{offset}"));
        Ok(JukeboxStatus {
            current_index: Some(index),
            position_secs: offset,
            ..JukeboxStatus::default()
        })
    });
    let l = Arc::clone(&log);
    jukebox.expect_start().returning(move || {
        l.lock().push("start".to_string());
        Ok(JukeboxStatus {
            playing: true,
            ..JukeboxStatus::default()
        })
    });
    let l = Arc::clone(&log);
    jukebox.expect_stop().returning(move || {
        l.lock().push("stop".to_string());
        Ok(JukeboxStatus::default())
    });
    let l = Arc::clone(&log);
    jukebox.expect_set_gain().returning(move |gain| {
        l.lock().push(format!("gain:{gain:.2}"));
        Ok(JukeboxStatus {
            gain,
            ..JukeboxStatus::default()
        })
    });
    jukebox.expect_status().returning(|| {
        Ok(JukeboxStatus {
            position_secs: 42,
            playing: true,
            ..JukeboxStatus::default()
        })
    });
    jukebox
}

// ============================================================================
// Harness
// ============================================================================

pub const SMALL: usize = 4_000;

pub fn track(id: &str, size: usize) -> Track {
    Track::new(id, format!("Song {id}"), format!("http://music.test/stream/{id}"))
        .with_artist("Artist")
        .with_album("Album")
        .with_size_bytes(size as u64)
}

pub fn body(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

#[derive(Default)]
pub struct HarnessBuilder {
    config: Option<PlaybackConfig>,
    download_config: Option<DownloadConfig>,
    settings: Option<MemorySettings>,
    music: Option<Arc<dyn MusicService>>,
    jukebox: Option<Arc<dyn JukeboxClient>>,
    shuffle: bool,
    streaming: Option<FakeStreaming>,
    network: Option<FakeNetwork>,
}

impl HarnessBuilder {
    pub fn config(mut self, config: PlaybackConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn download_config(mut self, config: DownloadConfig) -> Self {
        self.download_config = Some(config);
        self
    }

    pub fn settings(mut self, settings: MemorySettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn music(mut self, music: MockMusic) -> Self {
        self.music = Some(Arc::new(music));
        self
    }

    pub fn jukebox(mut self, jukebox: MockJukebox) -> Self {
        self.jukebox = Some(Arc::new(jukebox));
        self
    }

    pub fn shuffle(mut self) -> Self {
        self.shuffle = true;
        self
    }

    pub fn streaming(mut self, sdk: FakeStreaming) -> Self {
        self.streaming = Some(sdk);
        self
    }

    pub fn network(mut self, network: FakeNetwork) -> Self {
        self.network = Some(network);
        self
    }

    pub async fn build(self) -> Harness {
        let fs = MemoryFs::default();
        let http = ScriptedHttp::default();
        let players = FakePlayerFactory::default();
        let settings = self.settings.unwrap_or_default();
        let events = EventBus::new(4096);
        let (fetch, fetch_notices) = FetchContext::new(
            Arc::new(fs.clone()),
            Arc::new(http.clone()),
            Arc::new(SystemClock),
            events.clone(),
            self.download_config.unwrap_or_default(),
        )
        .expect("valid download config");

        let shuffle_source = self.shuffle.then(|| {
            Arc::new(FakeShuffle {
                http: http.clone(),
                counter: Arc::new(AtomicUsize::new(0)),
            }) as Arc<dyn ShuffleSource>
        });

        let deps = PlaybackDependencies {
            player_factory: Arc::new(players.clone()),
            fetch,
            fetch_notices,
            settings: Arc::new(settings.clone()),
            music_service: self.music,
            shuffle_source,
            jukebox: self.jukebox,
            streaming: self
                .streaming
                .map(|sdk| Arc::new(sdk) as Arc<dyn StreamingSdk>),
            network: self
                .network
                .map(|network| Arc::new(network) as Arc<dyn NetworkMonitor>),
        };

        let coordinator = PlaybackCoordinator::new(deps, self.config.unwrap_or_default())
            .await
            .expect("coordinator");

        Harness {
            fs,
            http,
            players,
            settings,
            events,
            coordinator,
        }
    }
}

pub struct Harness {
    pub fs: MemoryFs,
    pub http: ScriptedHttp,
    pub players: FakePlayerFactory,
    pub settings: MemorySettings,
    pub events: EventBus,
    pub coordinator: PlaybackCoordinator,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub async fn new() -> Self {
        Self::builder().build().await
    }

    /// Served tracks of `size` bytes with the given ids.
    pub fn tracks(&self, ids: &[&str], size: usize) -> Vec<Track> {
        ids.iter()
            .map(|id| {
                let track = track(id, size);
                self.http.serve(&track.stream_uri, body(size));
                track
            })
            .collect()
    }

    pub fn playback_events(&self) -> EventStream {
        EventStream::new(self.events.subscribe()).filter(|e| matches!(e, CoreEvent::Playback(_)))
    }

    /// Player currently holding track `id`.
    pub fn player_for(&self, id: &str) -> Arc<FakePlayer> {
        self.players
            .playing(&format!("Song {id}"))
            .unwrap_or_else(|| panic!("no player for {id}"))
    }

    pub async fn wait_for_state(&self, state: PlayerState) {
        let waited = tokio::time::timeout(Duration::from_secs(30), async {
            while self.coordinator.player_state().await != state {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if waited.is_err() {
            panic!(
                "timed out waiting for {state}, still {}",
                self.coordinator.player_state().await
            );
        }
    }

    pub async fn wait_for_next_state(&self, state: NextPlayerState) {
        let waited = tokio::time::timeout(Duration::from_secs(30), async {
            while self.coordinator.next_player_state().await != state {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "timed out waiting for successor {state}");
    }

    pub async fn wait_for_index(&self, index: Option<usize>) {
        let waited = tokio::time::timeout(Duration::from_secs(30), async {
            while self.coordinator.current_index().await != index {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "timed out waiting for index {index:?}");
    }

    /// Let spawned tasks and short timers run.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Poll `check` until it holds, failing after 30s of (virtual) time.
pub async fn eventually<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(30), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

pub fn count_calls(player: &FakePlayer, call: &str) -> usize {
    player.calls().iter().filter(|c| c.as_str() == call).count()
}

/// Drain `stream` and keep the playback errors.
pub fn drain_errors(stream: &mut EventStream) -> Vec<(String, bool)> {
    let mut errors = Vec::new();
    loop {
        match stream.try_recv() {
            Some(Ok(CoreEvent::Playback(PlaybackEvent::Error {
                message,
                recoverable,
                ..
            }))) => errors.push((message, recoverable)),
            Some(Ok(_)) | Some(Err(RecvError::Lagged(_))) => {}
            Some(Err(_)) | None => break,
        }
    }
    errors
}

/// Drain `stream` and keep the successor player states in order.
pub fn drain_next_states(stream: &mut EventStream) -> Vec<String> {
    let mut states = Vec::new();
    loop {
        match stream.try_recv() {
            Some(Ok(CoreEvent::Playback(PlaybackEvent::NextStateChanged { state }))) => {
                states.push(state)
            }
            Some(Ok(_)) | Some(Err(RecvError::Lagged(_))) => {}
            Some(Err(_)) | None => break,
        }
    }
    states
}
