//! # Playback Coordinator
//!
//! Owns the play queue, the current and successor tracks, both player state
//! machines and the download scheduler, and drives the playback backends.
//!
//! ## Overview
//!
//! Every state-mutating operation runs under one session lock, so download
//! target selection, queue edits and index changes never interleave. Work
//! that has to wait (buffering, successor staging, position sampling) runs on
//! background workers that re-enter through the same lock; player, streaming
//! and download notifications arrive on channels drained by an event pump.
//!
//! ```text
//!             ┌──────────────── session lock ────────────────┐
//!  UI ───────>│ play / next / enqueue / seek ...             │
//!  workers ──>│ buffer_tick / successor_tick                 │──> backends
//!  pump ─────>│ on_player_event / on_fetch_notice            │──> DownloadCoordinator
//!             └──────────────────────────────────────────────┘
//! ```
//!
//! Backend failures never escape: they route through a single recovery path
//! that resets the backend, returns to `Idle` and retries once from the last
//! known position.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let coordinator = PlaybackCoordinator::new(deps, PlaybackConfig::default()).await?;
//! coordinator.enqueue(tracks, EnqueueOptions::default().autoplay()).await?;
//! coordinator.next().await?;
//! ```

use crate::backend::{
    BackendKind, BackendSelector, JukeboxBackend, LocalBackend, PlayOutcome, PlayRequest,
    PlaybackBackend, PlayerRole, StreamingBackend,
};
use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use crate::persistence::{QueueStorage, SavedQueue};
use crate::scrobble::{self, ScrobbleTracker};
use crate::state::{MediaKey, NextPlayerState, PlayerState, RepeatMode};
use crate::workers::{self, EventChannels};
use bridge_traits::{
    BridgeError, JukeboxClient, MusicService, NetworkMonitor, PlayerEvent, PlayerFactory,
    SettingsStore, ShuffleSource, StreamingEvent, StreamingSdk, Track,
};
use core_download::{
    DownloadCoordinator, DownloadGate, FetchContext, FetchNotice, FetchProgress, TrackFetchEntry,
};
use core_runtime::events::{EventBus, PlaybackEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// The endless shuffle window shifts once the current index passes this.
const SHUFFLE_SHIFT_AFTER: usize = 4;

// ============================================================================
// Construction inputs
// ============================================================================

/// Collaborators of a [`PlaybackCoordinator`].
pub struct PlaybackDependencies {
    pub player_factory: Arc<dyn PlayerFactory>,
    /// Shared download context; its event bus is used for playback events too.
    pub fetch: Arc<FetchContext>,
    pub fetch_notices: mpsc::UnboundedReceiver<FetchNotice>,
    pub settings: Arc<dyn SettingsStore>,
    pub music_service: Option<Arc<dyn MusicService>>,
    pub shuffle_source: Option<Arc<dyn ShuffleSource>>,
    pub jukebox: Option<Arc<dyn JukeboxClient>>,
    pub streaming: Option<Arc<dyn StreamingSdk>>,
    /// When set, downloads are suppressed while it reports no connectivity.
    pub network: Option<Arc<dyn NetworkMonitor>>,
}

/// How [`PlaybackCoordinator::enqueue`] places new tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Pin the downloaded files.
    pub save: bool,
    /// Start playing once queued.
    pub autoplay: bool,
    /// Insert right after the current track instead of appending.
    pub play_next: bool,
    /// Shuffle the queue afterwards.
    pub shuffle: bool,
    /// Replace the queue instead of extending it.
    pub new_playlist: bool,
}

impl EnqueueOptions {
    pub fn save(mut self) -> Self {
        self.save = true;
        self
    }

    pub fn autoplay(mut self) -> Self {
        self.autoplay = true;
        self
    }

    pub fn play_next(mut self) -> Self {
        self.play_next = true;
        self
    }

    pub fn shuffle(mut self) -> Self {
        self.shuffle = true;
        self
    }

    pub fn new_playlist(mut self) -> Self {
        self.new_playlist = true;
        self
    }
}

// ============================================================================
// Session state
// ============================================================================

/// Where to start the current track once it is buffered.
#[derive(Debug, Clone, Copy)]
struct PendingStart {
    position_ms: u64,
    auto_start: bool,
}

/// Parameters of one track start.
#[derive(Debug, Clone, Copy)]
struct Cue {
    index: usize,
    position_ms: u64,
    auto_start: bool,
    restoring: bool,
}

impl Cue {
    fn play(index: usize) -> Self {
        Self {
            index,
            position_ms: 0,
            auto_start: true,
            restoring: false,
        }
    }

    fn request(&self) -> PlayRequest {
        let request = PlayRequest::new(self.index).at(self.position_ms);
        if self.auto_start {
            request
        } else {
            request.paused()
        }
    }
}

pub(crate) struct Session {
    downloads: DownloadCoordinator,
    current: Option<Arc<TrackFetchEntry>>,
    next: Option<Arc<TrackFetchEntry>>,
    player_state: PlayerState,
    next_state: NextPlayerState,
    repeat: RepeatMode,
    shuffle_play: bool,
    jukebox_enabled: bool,
    active_backend: Option<Arc<dyn PlaybackBackend>>,
    volume: f32,
    pending: Option<PendingStart>,
    buffer_task: Option<CancellationToken>,
    successor_task: Option<CancellationToken>,
    sampler_task: Option<CancellationToken>,
    scrobbles: ScrobbleTracker,
    recovery_attempted_for: Option<String>,
}

impl Session {
    fn current_index(&self) -> Option<usize> {
        self.current
            .as_ref()
            .and_then(|c| self.downloads.queue().index_of(c))
    }

    fn current_id(&self) -> Option<String> {
        self.current.as_ref().map(|c| c.id().to_string())
    }

    fn queue_len(&self) -> usize {
        self.downloads.queue().len()
    }

    fn track_ids(&self) -> Vec<String> {
        self.downloads
            .queue()
            .entries()
            .iter()
            .map(|e| e.id().to_string())
            .collect()
    }
}

fn same_entry(a: Option<&Arc<TrackFetchEntry>>, b: Option<&Arc<TrackFetchEntry>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

fn cancel(task: &mut Option<CancellationToken>) {
    if let Some(token) = task.take() {
        token.cancel();
    }
}

// ============================================================================
// Shared core
// ============================================================================

pub(crate) struct Inner {
    pub(crate) config: PlaybackConfig,
    session: Mutex<Session>,
    selector: BackendSelector,
    local: Arc<LocalBackend>,
    jukebox: Option<Arc<JukeboxBackend>>,
    streaming: Option<Arc<StreamingBackend>>,
    position_ms: AtomicU64,
    events: EventBus,
    settings: Arc<dyn SettingsStore>,
    music_service: Option<Arc<dyn MusicService>>,
    shuffle_source: Option<Arc<dyn ShuffleSource>>,
    network: Option<Arc<dyn NetworkMonitor>>,
    shutdown: CancellationToken,
}

impl Inner {
    fn storage(&self) -> QueueStorage<'_> {
        QueueStorage::new(self.settings.as_ref())
    }

    // ------------------------------------------------------------------------
    // State machines
    // ------------------------------------------------------------------------

    fn set_state(self: &Arc<Self>, s: &mut Session, state: PlayerState) -> Result<()> {
        let next = s.player_state.transition(state)?;
        self.apply_state(s, next);
        Ok(())
    }

    fn enter_idle(self: &Arc<Self>, s: &mut Session) {
        self.apply_state(s, PlayerState::Idle);
    }

    fn apply_state(self: &Arc<Self>, s: &mut Session, next: PlayerState) {
        if next == s.player_state {
            return;
        }
        debug!(from = %s.player_state, to = %next, track_id = ?s.current_id(), "Player state");
        s.player_state = next;

        if let Some(backend) = &s.active_backend {
            backend.notify_state_change(next);
        }

        if next == PlayerState::Started {
            let sampled = s.active_backend.as_ref().is_some_and(|b| b.kind() == BackendKind::Local);
            if sampled && s.sampler_task.is_none() {
                s.sampler_task = Some(workers::spawn_position_sampler(self));
            }
        } else {
            cancel(&mut s.sampler_task);
        }

        self.scrobble(s, next);

        self.events.emit_playback(PlaybackEvent::StateChanged {
            state: next.to_string(),
            track_id: s.current_id(),
        });
    }

    fn set_next_state(&self, s: &mut Session, state: NextPlayerState) {
        match s.next_state.transition(state) {
            Ok(next) if next != s.next_state => {
                debug!(from = %s.next_state, to = %next, "Next player state");
                s.next_state = next;
                self.events.emit_playback(PlaybackEvent::NextStateChanged {
                    state: next.to_string(),
                });
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Ignoring next player transition"),
        }
    }

    fn scrobble(&self, s: &mut Session, state: PlayerState) {
        if !self.config.scrobble_enabled {
            return;
        }
        let (Some(service), Some(track_id)) = (&self.music_service, s.current_id()) else {
            return;
        };
        if let Some(kind) = s.scrobbles.observe(&track_id, state) {
            scrobble::send(Arc::clone(service), track_id, kind);
        }
    }

    // ------------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------------

    fn announce_track(&self, s: &Session) {
        let track = s.current.as_ref().map(|c| c.track());
        self.events.emit_playback(PlaybackEvent::TrackChanged {
            track_id: track.map(|t| t.id.clone()),
            title: track.map(|t| t.title.clone()),
            index: s.current_index(),
        });
    }

    async fn queue_changed(&self, s: &mut Session) {
        self.events.emit_playback(PlaybackEvent::QueueChanged {
            revision: s.downloads.queue().revision(),
            length: s.queue_len(),
        });
        self.sync_jukebox_playlist(s).await;
        self.serialize(s).await;
    }

    async fn sync_jukebox_playlist(&self, s: &Session) {
        let Some(jukebox) = self.jukebox.as_ref().filter(|_| s.jukebox_enabled) else {
            return;
        };
        if let Err(e) = jukebox.update_playlist(&s.track_ids()).await {
            warn!(error = %e, "Failed to push queue to jukebox");
        }
    }

    /// Persist the queue; failures are logged.
    async fn serialize(&self, s: &Session) {
        let saved = self.snapshot(s);
        if let Err(e) = self.storage().save(&saved).await {
            warn!(error = %e, "Failed to save play queue");
        }
    }

    fn snapshot(&self, s: &Session) -> SavedQueue {
        let tracks = s
            .downloads
            .queue()
            .entries()
            .iter()
            .map(|e| e.track().clone())
            .collect();
        SavedQueue::new(tracks, s.current_index(), self.position_ms.load(Ordering::Acquire))
    }

    // ------------------------------------------------------------------------
    // Workers
    // ------------------------------------------------------------------------

    fn start_buffering(self: &Arc<Self>, s: &mut Session, pending: PendingStart) {
        s.pending = Some(pending);
        cancel(&mut s.buffer_task);
        s.buffer_task = Some(workers::spawn_buffer_wait(self));
    }

    fn stop_buffering(&self, s: &mut Session) {
        s.pending = None;
        cancel(&mut s.buffer_task);
    }

    fn stop_workers(&self, s: &mut Session) {
        self.stop_buffering(s);
        cancel(&mut s.successor_task);
        cancel(&mut s.sampler_task);
    }

    /// One buffering poll. Returns `true` once waiting is over.
    pub(crate) async fn buffer_tick(self: &Arc<Self>, token: &CancellationToken) -> bool {
        let mut s = self.session.lock().await;
        if token.is_cancelled() || s.player_state != PlayerState::Downloading {
            return true;
        }
        let (Some(entry), Some(pending)) = (s.current.clone(), s.pending) else {
            return true;
        };

        if self.local.is_buffered(&entry, pending.position_ms) {
            debug!(track_id = entry.id(), bytes = entry.bytes_downloaded(), "Buffer filled");
            self.resume_current(&mut s).await;
            return true;
        }

        if let Some(monitor) = &self.network {
            if !monitor.is_connected().await {
                warn!(track_id = entry.id(), "Offline while buffering, giving up");
                self.stop_buffering(&mut s);
                self.enter_idle(&mut s);
                self.events.emit_playback(PlaybackEvent::Error {
                    track_id: Some(entry.id().to_string()),
                    message: "network unavailable while buffering".to_string(),
                    recoverable: true,
                });
                return true;
            }
        }

        if entry.is_failed() {
            self.refresh_downloads(&mut s).await;
        }
        false
    }

    /// One successor poll. Returns `true` once nothing is left to stage.
    pub(crate) async fn successor_tick(self: &Arc<Self>, token: &CancellationToken) -> bool {
        let mut s = self.session.lock().await;
        if token.is_cancelled() {
            return true;
        }
        let (Some(next), Some(backend)) = (s.next.clone(), s.active_backend.clone()) else {
            return true;
        };
        if matches!(s.next_state, NextPlayerState::Preparing | NextPlayerState::Prepared) {
            return true;
        }

        let playing = matches!(s.player_state, PlayerState::Started | PlayerState::Paused);
        if !playing || !next.is_complete_file_available() {
            return false;
        }

        self.set_next_state(&mut s, NextPlayerState::Preparing);
        match backend.setup_next(&next).await {
            Ok(true) => {
                info!(track_id = next.id(), "Successor prepared");
                self.set_next_state(&mut s, NextPlayerState::Prepared);
                true
            }
            Ok(false) => {
                self.set_next_state(&mut s, NextPlayerState::Idle);
                true
            }
            Err(e) => {
                warn!(track_id = next.id(), error = %e, "Failed to prepare successor");
                self.set_next_state(&mut s, NextPlayerState::Idle);
                false
            }
        }
    }

    pub(crate) async fn sample_position(&self) {
        match self.local.position_ms().await {
            Ok(position) => self.position_ms.store(position, Ordering::Release),
            Err(e) => debug!(error = %e, "Position sample failed"),
        }
    }

    // ------------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------------

    pub(crate) async fn on_player_event(self: &Arc<Self>, event: PlayerEvent) {
        let mut s = self.session.lock().await;
        let local_active = s
            .active_backend
            .as_ref()
            .is_some_and(|b| b.kind() == BackendKind::Local);

        match (self.local.role_of(event.player()), event) {
            (Some(PlayerRole::Active), PlayerEvent::Completed { .. }) if local_active => {
                self.on_completion(&mut s).await;
            }
            (Some(PlayerRole::Active), PlayerEvent::Error { code, message, .. }) if local_active => {
                let err = BridgeError::OperationFailed(format!("player error {code}: {message}"));
                self.handle_error(&mut s, err.into()).await;
            }
            (Some(PlayerRole::Next), PlayerEvent::Error { code, message, .. }) => {
                warn!(code, %message, "Successor player failed");
                if let Err(e) = self.local.clear_next().await {
                    warn!(error = %e, "Failed to drop successor player");
                }
                self.set_next_state(&mut s, NextPlayerState::Idle);
            }
            (role, event) => debug!(?role, ?event, "Ignoring player event"),
        }
    }

    pub(crate) async fn on_streaming_event(self: &Arc<Self>, event: StreamingEvent) {
        let mut s = self.session.lock().await;
        let Some(streaming) = self.streaming.as_ref() else {
            return;
        };
        let streaming_active = s
            .active_backend
            .as_ref()
            .is_some_and(|b| b.kind() == BackendKind::Streaming);
        if !streaming_active {
            debug!(?event, "Streaming event while inactive");
            return;
        }
        let is_current = |uri: &str| streaming.current_uri().as_deref() == Some(uri);

        match event {
            StreamingEvent::TrackEnded { uri } if is_current(&uri) => {
                self.on_completion(&mut s).await;
            }
            StreamingEvent::Playing { uri } if is_current(&uri) => {
                if s.player_state == PlayerState::Paused {
                    self.apply_state(&mut s, PlayerState::Started);
                }
            }
            StreamingEvent::Paused { uri } if is_current(&uri) => {
                if s.player_state == PlayerState::Started {
                    self.apply_state(&mut s, PlayerState::Paused);
                }
            }
            StreamingEvent::Error { message } => {
                let err = BridgeError::OperationFailed(format!("streaming: {message}"));
                self.handle_error(&mut s, err.into()).await;
            }
            other => debug!(event = ?other, "Ignoring stale streaming event"),
        }
    }

    pub(crate) async fn on_fetch_notice(self: &Arc<Self>, notice: FetchNotice) {
        let mut s = self.session.lock().await;
        match notice {
            FetchNotice::Completed { track_id } => {
                let waiting = s.player_state == PlayerState::Downloading
                    && s.current.as_ref().is_some_and(|c| c.id() == track_id);
                if waiting {
                    self.resume_current(&mut s).await;
                }
                self.refresh_downloads(&mut s).await;
            }
            FetchNotice::Failed { track_id, message } => {
                // Retried by the next scan, not here.
                if s.current.as_ref().is_some_and(|c| c.id() == track_id) {
                    self.events.emit_playback(PlaybackEvent::Error {
                        track_id: Some(track_id),
                        message,
                        recoverable: true,
                    });
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Downloads
    // ------------------------------------------------------------------------

    async fn download_gate(&self, s: &Session) -> DownloadGate {
        let network_connected = match &self.network {
            Some(monitor) => monitor.is_connected().await,
            None => true,
        };
        DownloadGate {
            jukebox_enabled: s.jukebox_enabled,
            network_connected,
        }
    }

    /// Top up endless shuffle and run a download scan.
    async fn refresh_downloads(self: &Arc<Self>, s: &mut Session) {
        if !s.downloads.context().fs.is_available().await {
            debug!("Storage unavailable, skipping download pass");
            return;
        }
        if s.shuffle_play {
            self.top_up_shuffle(s).await;
        }

        let gate = self.download_gate(s).await;
        let current = s.current.clone();
        let outcome = s.downloads.check_downloads(current.as_ref(), gate).await;

        // The current track being fetched is never the successor, even when
        // repeat-one makes them the same entry.
        let successor_fetching = outcome.queue_index.is_some()
            && outcome.queue_index != s.current_index()
            && same_entry(outcome.target.as_ref(), s.next.as_ref());
        if self.config.gapless_enabled
            && successor_fetching
            && s.next_state == NextPlayerState::Idle
        {
            self.set_next_state(s, NextPlayerState::Downloading);
        }
    }

    /// Shift the shuffle window and refill it to its target length.
    ///
    /// Returns the number of tracks added.
    async fn top_up_shuffle(self: &Arc<Self>, s: &mut Session) -> usize {
        let Some(source) = self.shuffle_source.clone() else {
            return 0;
        };

        if let Some(index) = s.current_index() {
            if index > SHUFFLE_SHIFT_AFTER && index > self.config.shuffle_lookback {
                let stale: Vec<_> = s.downloads.queue().entries()[..index - self.config.shuffle_lookback].to_vec();
                for entry in &stale {
                    s.downloads.remove_entry(entry).await;
                }
                debug!(removed = stale.len(), "Shifted shuffle window");
            }
        }

        let missing = self.config.shuffle_queue_length.saturating_sub(s.queue_len());
        if missing == 0 {
            return 0;
        }

        let tracks = match source.next_tracks(missing).await {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!(error = %e, "Shuffle source failed");
                return 0;
            }
        };

        let mut added = 0;
        for track in tracks.iter().take(missing) {
            match s.downloads.acquire_entry(track, false).await {
                Ok(entry) => {
                    s.downloads.queue_mut().push(entry);
                    added += 1;
                }
                Err(e) => warn!(track_id = %track.id, error = %e, "Skipping shuffle track"),
            }
        }

        if added > 0 {
            self.update_next(s).await;
            self.queue_changed(s).await;
        }
        added
    }

    // ------------------------------------------------------------------------
    // Successor
    // ------------------------------------------------------------------------

    /// Recompute the successor and (re)arm the staging worker.
    async fn update_next(self: &Arc<Self>, s: &mut Session) {
        let next = s
            .current_index()
            .and_then(|i| s.repeat.next_index(i, s.queue_len()))
            .and_then(|i| s.downloads.queue().get(i).cloned());

        if !same_entry(s.next.as_ref(), next.as_ref()) {
            cancel(&mut s.successor_task);
            if s.next_state != NextPlayerState::Idle {
                if let Some(backend) = &s.active_backend {
                    if let Err(e) = backend.clear_next().await {
                        warn!(error = %e, "Failed to drop staged successor");
                    }
                }
                self.set_next_state(s, NextPlayerState::Idle);
            }
            s.next = next;
        }

        let stages = s.active_backend.as_ref().is_some_and(|b| b.can_download());
        let armed = s.successor_task.as_ref().is_some_and(|t| !t.is_cancelled());
        if self.config.gapless_enabled && stages && s.next.is_some() && !armed {
            s.successor_task = Some(workers::spawn_successor_check(self));
        }
    }

    // ------------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------------

    /// Stop everything and return to `Idle`, keeping the current track.
    async fn reset_playback(self: &Arc<Self>, s: &mut Session) {
        self.stop_workers(s);
        if let Some(backend) = &s.active_backend {
            if let Err(e) = backend.reset().await {
                warn!(backend = %backend.kind(), error = %e, "Backend reset failed");
            }
        }
        self.set_next_state(s, NextPlayerState::Idle);
        self.enter_idle(s);
    }

    /// Reset playback and forget the current and successor tracks.
    async fn clear_current(self: &Arc<Self>, s: &mut Session) {
        self.reset_playback(s).await;
        s.current = None;
        s.next = None;
        self.position_ms.store(0, Ordering::Release);
        self.announce_track(s);
    }

    /// Make the track at `cue.index` current and start it.
    ///
    /// An index outside the queue stops playback and clears the current track.
    async fn play_at(self: &Arc<Self>, s: &mut Session, cue: Cue) -> Result<()> {
        let Some(entry) = s.downloads.queue().get(cue.index).cloned() else {
            debug!(index = cue.index, len = s.queue_len(), "Play index out of range");
            self.clear_current(s).await;
            return Ok(());
        };

        self.stop_workers(s);
        if let Some(previous) = &s.active_backend {
            previous.clear_next().await?;
        }
        self.set_next_state(s, NextPlayerState::Idle);

        let backend = self.selector.select(&entry);
        if let Some(previous) = s.active_backend.as_ref().filter(|p| p.kind() != backend.kind()) {
            info!(from = %previous.kind(), to = %backend.kind(), "Switching backend");
            previous.reset().await?;
        }
        s.active_backend = Some(Arc::clone(&backend));

        s.current = Some(Arc::clone(&entry));
        entry.touch();
        self.position_ms.store(cue.position_ms, Ordering::Release);
        self.enter_idle(s);
        self.set_state(s, PlayerState::Preparing)?;
        self.announce_track(s);

        self.start_backend(s, &backend, &entry, cue).await?;

        self.update_next(s).await;
        self.refresh_downloads(s).await;
        self.serialize(s).await;
        Ok(())
    }

    async fn start_backend(
        self: &Arc<Self>,
        s: &mut Session,
        backend: &Arc<dyn PlaybackBackend>,
        entry: &Arc<TrackFetchEntry>,
        cue: Cue,
    ) -> Result<()> {
        let request = cue.request();
        let outcome = if cue.restoring {
            backend.restore(entry, request).await?
        } else {
            backend.play(entry, request).await?
        };

        match outcome {
            PlayOutcome::Started => self.set_state(s, PlayerState::Started),
            PlayOutcome::Paused => self.set_state(s, PlayerState::Paused),
            PlayOutcome::Buffering => {
                self.set_state(s, PlayerState::Downloading)?;
                self.start_buffering(
                    s,
                    PendingStart {
                        position_ms: cue.position_ms,
                        auto_start: cue.auto_start,
                    },
                );
                Ok(())
            }
        }
    }

    /// Start the current track from its pending position once buffered.
    async fn resume_current(self: &Arc<Self>, s: &mut Session) {
        let pending = s.pending.take().unwrap_or(PendingStart {
            position_ms: self.position_ms.load(Ordering::Acquire),
            auto_start: true,
        });
        cancel(&mut s.buffer_task);

        let (Some(entry), Some(index), Some(backend)) =
            (s.current.clone(), s.current_index(), s.active_backend.clone())
        else {
            return;
        };

        let cue = Cue {
            index,
            position_ms: pending.position_ms,
            auto_start: pending.auto_start,
            restoring: false,
        };
        if let Err(e) = self.start_backend(s, &backend, &entry, cue).await {
            self.handle_error(s, e).await;
        }
    }

    /// The active backend reported the end of the current track.
    async fn on_completion(self: &Arc<Self>, s: &mut Session) {
        let (Some(entry), Some(backend)) = (s.current.clone(), s.active_backend.clone()) else {
            return;
        };

        if backend.playing_partial() && self.is_early_completion(&entry, &backend).await {
            self.recover_early_completion(s, &entry).await;
            return;
        }

        if let Err(e) = self.set_state(s, PlayerState::Completed) {
            warn!(error = %e, "Completion in unexpected state");
            self.apply_state(s, PlayerState::Completed);
        }
        s.recovery_attempted_for = None;
        self.clear_bookmark(&entry);

        if s.next_state == NextPlayerState::Prepared {
            if let Some(next) = s.next.clone() {
                match backend.advance_to_next().await {
                    Ok(true) => {
                        self.finish_gapless_handoff(s, next).await;
                        return;
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "Gapless handoff failed"),
                }
            }
            self.set_next_state(s, NextPlayerState::Idle);
        }

        let len = s.queue_len();
        match s.current_index().and_then(|i| s.repeat.next_index(i, len)) {
            Some(next) => {
                if let Err(e) = self.play_at(s, Cue::play(next)).await {
                    self.handle_error(s, e).await;
                }
            }
            None => {
                info!("Reached end of queue");
                if self.config.clear_playlist_on_end {
                    s.downloads.clear_queue().await;
                    self.clear_current(s).await;
                    self.queue_changed(s).await;
                } else {
                    self.reset_playback(s).await;
                }
            }
        }
    }

    /// Decide whether a player reading the partial file stopped short.
    ///
    /// Without a finished copy it simply ran out of data; once the transfer
    /// has finished, only a position well before the duration counts.
    async fn is_early_completion(&self, entry: &TrackFetchEntry, backend: &Arc<dyn PlaybackBackend>) -> bool {
        if !entry.is_complete_file_available() {
            return true;
        }
        let duration = match entry.track().duration_ms {
            Some(duration) => Some(duration),
            None => backend.duration_ms().await.ok().flatten(),
        };
        let position = self.position_ms.load(Ordering::Acquire);
        match duration {
            Some(duration) => position + self.config.early_completion_tolerance_ms < duration,
            None => false,
        }
    }

    async fn recover_early_completion(self: &Arc<Self>, s: &mut Session, entry: &Arc<TrackFetchEntry>) {
        let position_ms = self.position_ms.load(Ordering::Acquire);
        info!(track_id = entry.id(), position_ms, "Early completion, buffer ran dry");

        if entry.is_complete_file_available() {
            s.pending = Some(PendingStart {
                position_ms,
                auto_start: true,
            });
            self.resume_current(s).await;
            return;
        }

        if let Err(e) = self.set_state(s, PlayerState::Downloading) {
            warn!(error = %e, "Cannot wait for buffer");
            return;
        }
        self.start_buffering(
            s,
            PendingStart {
                position_ms,
                auto_start: true,
            },
        );
        self.refresh_downloads(s).await;
    }

    async fn finish_gapless_handoff(self: &Arc<Self>, s: &mut Session, next: Arc<TrackFetchEntry>) {
        info!(track_id = next.id(), "Gapless handoff");
        s.current = Some(next);
        s.next = None;
        cancel(&mut s.successor_task);
        self.position_ms.store(0, Ordering::Release);
        self.set_next_state(s, NextPlayerState::Idle);
        self.apply_state(s, PlayerState::Started);
        self.announce_track(s);

        self.update_next(s).await;
        self.refresh_downloads(s).await;
        self.serialize(s).await;
    }

    fn clear_bookmark(&self, entry: &TrackFetchEntry) {
        if !self.config.clear_bookmark_on_completion || !entry.track().has_bookmark() {
            return;
        }
        let Some(service) = self.music_service.clone() else {
            return;
        };
        let track_id = entry.id().to_string();
        tokio::spawn(async move {
            if let Err(e) = service.delete_bookmark(&track_id).await {
                warn!(track_id = %track_id, error = %e, "Failed to clear bookmark");
            }
        });
    }

    /// Single recovery path for backend failures.
    ///
    /// Resets the backend, returns to `Idle` and replays the current track
    /// from the last known position once per track.
    async fn handle_error(self: &Arc<Self>, s: &mut Session, err: PlaybackError) {
        let track_id = s.current_id();
        let position_ms = self.position_ms.load(Ordering::Acquire);
        error!(track_id = ?track_id, position_ms, error = %err, "Playback failed");

        self.reset_playback(s).await;

        let retry = err.is_backend_error()
            && track_id.is_some()
            && s.recovery_attempted_for != track_id;
        self.events.emit_playback(PlaybackEvent::Error {
            track_id: track_id.clone(),
            message: err.to_string(),
            recoverable: retry,
        });
        if !retry {
            return;
        }

        s.recovery_attempted_for = track_id;
        let Some(index) = s.current_index() else {
            return;
        };
        let cue = Cue {
            position_ms,
            ..Cue::play(index)
        };
        if let Err(e) = self.play_at(s, cue).await {
            error!(error = %e, "Recovery failed");
            self.reset_playback(s).await;
            self.events.emit_playback(PlaybackEvent::Error {
                track_id: s.current_id(),
                message: e.to_string(),
                recoverable: false,
            });
        }
    }

    /// `play_at` with failures routed through recovery.
    async fn play_guarded(self: &Arc<Self>, s: &mut Session, cue: Cue) {
        if let Err(e) = self.play_at(s, cue).await {
            self.handle_error(s, e).await;
        }
    }

    async fn position(&self, s: &Session) -> u64 {
        if s.player_state.hides_position() {
            return 0;
        }
        let cached = self.position_ms.load(Ordering::Acquire);
        match &s.active_backend {
            Some(backend) if backend.kind() != BackendKind::Local => {
                backend.position_ms().await.unwrap_or(cached)
            }
            _ => cached,
        }
    }
}

// ============================================================================
// Public facade
// ============================================================================

/// Playback and download coordination for one play queue.
///
/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct PlaybackCoordinator {
    inner: Arc<Inner>,
}

impl PlaybackCoordinator {
    /// Build the coordinator, load persisted preferences and start the
    /// event pump. Must be called inside a tokio runtime.
    pub async fn new(deps: PlaybackDependencies, config: PlaybackConfig) -> Result<Self> {
        config.validate().map_err(PlaybackError::Internal)?;

        let events = deps.fetch.events.clone();
        let (player_tx, player_rx) = mpsc::unbounded_channel();
        let (streaming_tx, streaming_rx) = mpsc::unbounded_channel();

        let local = Arc::new(LocalBackend::new(deps.player_factory, player_tx, config.clone()));
        let jukebox = deps.jukebox.map(|client| Arc::new(JukeboxBackend::new(client)));
        let streaming = deps.streaming.map(|sdk| {
            Arc::new(StreamingBackend::new(
                sdk,
                streaming_tx,
                config.streaming_uri_scheme.clone(),
            ))
        });

        let mut selector = BackendSelector::new(Arc::clone(&local) as Arc<dyn PlaybackBackend>);
        if let Some(jukebox) = &jukebox {
            selector = selector.with_backend(Arc::clone(jukebox) as Arc<dyn PlaybackBackend>);
        }
        if let Some(streaming) = &streaming {
            selector = selector.with_backend(Arc::clone(streaming) as Arc<dyn PlaybackBackend>);
        }
        debug!(?selector, "Backend chain");

        let storage = QueueStorage::new(deps.settings.as_ref());
        let repeat = storage.load_repeat_mode().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load repeat mode");
            RepeatMode::Off
        });
        let shuffle_play = deps.shuffle_source.is_some()
            && storage.load_shuffle_play().await.unwrap_or_else(|e| {
                warn!(error = %e, "Failed to load shuffle preference");
                false
            });

        let session = Session {
            downloads: DownloadCoordinator::new(deps.fetch),
            current: None,
            next: None,
            player_state: PlayerState::Idle,
            next_state: NextPlayerState::Idle,
            repeat,
            shuffle_play,
            jukebox_enabled: false,
            active_backend: None,
            volume: 1.0,
            pending: None,
            buffer_task: None,
            successor_task: None,
            sampler_task: None,
            scrobbles: ScrobbleTracker::new(),
            recovery_attempted_for: None,
        };

        let inner = Arc::new(Inner {
            config,
            session: Mutex::new(session),
            selector,
            local,
            jukebox,
            streaming,
            position_ms: AtomicU64::new(0),
            events,
            settings: deps.settings,
            music_service: deps.music_service,
            shuffle_source: deps.shuffle_source,
            network: deps.network,
            shutdown: CancellationToken::new(),
        });

        workers::spawn_event_pump(
            &inner,
            EventChannels {
                player: player_rx,
                streaming: streaming_rx,
                fetch: deps.fetch_notices,
            },
            inner.shutdown.clone(),
        );

        info!(?repeat, shuffle_play, "Playback coordinator ready");
        Ok(Self { inner })
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.inner.config
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Play the track at `index`; an index outside the queue stops playback.
    #[instrument(skip(self))]
    pub async fn play(&self, index: usize) -> Result<()> {
        let mut s = self.inner.session.lock().await;
        s.recovery_attempted_for = None;
        self.inner.play_guarded(&mut s, Cue::play(index)).await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn pause(&self) -> Result<()> {
        let mut s = self.inner.session.lock().await;
        if s.player_state != PlayerState::Started {
            return Ok(());
        }
        let Some(backend) = s.active_backend.clone() else {
            return Ok(());
        };
        match backend.pause().await {
            Ok(()) => self.inner.set_state(&mut s, PlayerState::Paused)?,
            Err(e) => self.inner.handle_error(&mut s, e).await,
        }
        self.inner.serialize(&s).await;
        Ok(())
    }

    /// Resume from `Paused`, `Completed`, `Stopped` or `Prepared`.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let mut s = self.inner.session.lock().await;
        if !s.player_state.is_resumable() {
            return Ok(());
        }
        let Some(backend) = s.active_backend.clone() else {
            return Ok(());
        };
        match backend.start().await {
            Ok(()) => self.inner.set_state(&mut s, PlayerState::Started)?,
            Err(e) => self.inner.handle_error(&mut s, e).await,
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let mut s = self.inner.session.lock().await;
        match s.player_state {
            PlayerState::Started => {
                let Some(backend) = s.active_backend.clone() else {
                    return Ok(());
                };
                match backend.stop().await {
                    Ok(()) => self.inner.set_state(&mut s, PlayerState::Stopped)?,
                    Err(e) => self.inner.handle_error(&mut s, e).await,
                }
            }
            PlayerState::Paused => self.inner.set_state(&mut s, PlayerState::Stopped)?,
            _ => {}
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn toggle_play_pause(&self) -> Result<()> {
        let state = self.player_state().await;
        match state {
            PlayerState::Paused | PlayerState::Completed | PlayerState::Stopped => self.start().await,
            PlayerState::Started => self.pause().await,
            PlayerState::Idle => {
                let index = {
                    let s = self.inner.session.lock().await;
                    if s.queue_len() == 0 {
                        return Ok(());
                    }
                    s.current_index().unwrap_or(0)
                };
                self.play(index).await
            }
            _ => Ok(()),
        }
    }

    /// Skip forward. No-op at the end of the queue unless repeating all.
    #[instrument(skip(self))]
    pub async fn next(&self) -> Result<()> {
        let mut s = self.inner.session.lock().await;
        let Some(index) = s.current_index() else {
            return Ok(());
        };
        let len = s.queue_len();
        let target = match s.repeat {
            RepeatMode::All => Some((index + 1) % len),
            RepeatMode::Off | RepeatMode::Single => (index + 1 < len).then_some(index + 1),
        };
        if let Some(target) = target {
            self.inner.play_guarded(&mut s, Cue::play(target)).await;
        }
        Ok(())
    }

    /// Skip back, or restart the current track when past the restart
    /// threshold or at the head of the queue.
    #[instrument(skip(self))]
    pub async fn previous(&self) -> Result<()> {
        let mut s = self.inner.session.lock().await;
        let Some(index) = s.current_index() else {
            return Ok(());
        };
        let position = self.inner.position(&s).await;
        let target = if index == 0 || position > self.inner.config.restart_threshold_ms {
            index
        } else {
            index - 1
        };
        self.inner.play_guarded(&mut s, Cue::play(target)).await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn seek_to(&self, position_ms: u64) -> Result<()> {
        let mut s = self.inner.session.lock().await;
        let (Some(index), Some(backend)) = (s.current_index(), s.active_backend.clone()) else {
            return Ok(());
        };

        match s.player_state {
            PlayerState::Idle | PlayerState::Preparing => return Ok(()),
            PlayerState::Downloading => {
                if let Some(pending) = s.pending.as_mut() {
                    pending.position_ms = position_ms;
                }
            }
            _ => {
                if let Err(e) = backend.seek(index, position_ms).await {
                    self.inner.handle_error(&mut s, e).await;
                    return Ok(());
                }
            }
        }

        self.inner.position_ms.store(position_ms, Ordering::Release);
        if let Some(track_id) = s.current_id() {
            self.inner.events.emit_playback(PlaybackEvent::PositionChanged {
                track_id,
                position_ms,
                duration_ms: s.current.as_ref().and_then(|c| c.track().duration_ms),
            });
        }
        Ok(())
    }

    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(PlaybackError::InvalidVolume(volume));
        }
        let mut s = self.inner.session.lock().await;
        s.volume = volume;
        if let Some(backend) = s.active_backend.clone() {
            backend.set_volume(volume).await?;
        }
        Ok(())
    }

    pub async fn volume(&self) -> f32 {
        self.inner.session.lock().await.volume
    }

    pub async fn handle_media_key(&self, key: MediaKey) -> Result<()> {
        debug!(?key, "Media key");
        match key {
            MediaKey::PlayPause | MediaKey::HeadsetHook => self.toggle_play_pause().await,
            MediaKey::Previous => self.previous().await,
            MediaKey::Next => {
                let at_end = {
                    let s = self.inner.session.lock().await;
                    s.current_index().map_or(true, |i| i + 1 >= s.queue_len())
                };
                if at_end {
                    Ok(())
                } else {
                    self.next().await
                }
            }
            MediaKey::Stop => self.stop().await,
            MediaKey::Play => self.start().await,
            MediaKey::Pause => self.pause().await,
        }
    }

    // ========================================================================
    // Queue
    // ========================================================================

    #[instrument(skip(self, tracks), fields(count = tracks.len()))]
    pub async fn enqueue(&self, tracks: Vec<Track>, options: EnqueueOptions) -> Result<()> {
        let inner = &self.inner;
        let mut s = inner.session.lock().await;

        if options.new_playlist {
            s.downloads.clear_queue().await;
            inner.clear_current(&mut s).await;
        }
        if s.shuffle_play {
            s.shuffle_play = false;
            if let Err(e) = inner.storage().save_shuffle_play(false).await {
                warn!(error = %e, "Failed to persist shuffle preference");
            }
        }

        let mut entries = Vec::with_capacity(tracks.len());
        for track in &tracks {
            entries.push(s.downloads.acquire_entry(track, options.save).await?);
        }

        let insert_at = if options.play_next {
            let position = match s.current_index() {
                Some(index) if options.autoplay => index,
                Some(index) => index + 1,
                None => 0,
            };
            s.downloads.queue_mut().insert(entries, position);
            position
        } else {
            let position = s.queue_len();
            for entry in entries {
                s.downloads.queue_mut().push(entry);
            }
            position
        };

        if options.shuffle {
            let current = s.current.clone();
            s.downloads.queue_mut().shuffle(current.as_ref());
        }
        inner.queue_changed(&mut s).await;

        if options.autoplay {
            let start = if options.play_next && !options.shuffle { insert_at } else { 0 };
            s.recovery_attempted_for = None;
            inner.play_guarded(&mut s, Cue::play(start)).await;
        } else {
            if s.current.is_none() {
                s.current = s.downloads.queue().get(0).cloned();
                if s.current.is_some() {
                    inner.announce_track(&s);
                }
            }
            inner.refresh_downloads(&mut s).await;
            inner.update_next(&mut s).await;
            inner.serialize(&s).await;
        }
        Ok(())
    }

    /// Remove the entry at `index`; removing the current track stops it.
    #[instrument(skip(self))]
    pub async fn remove(&self, index: usize) -> Result<bool> {
        let inner = &self.inner;
        let mut s = inner.session.lock().await;
        let Some(entry) = s.downloads.queue().get(index).cloned() else {
            return Ok(false);
        };

        if same_entry(s.current.as_ref(), Some(&entry)) {
            inner.clear_current(&mut s).await;
        }
        let removed = s.downloads.remove_entry(&entry).await;
        inner.update_next(&mut s).await;
        inner.queue_changed(&mut s).await;
        inner.refresh_downloads(&mut s).await;
        Ok(removed)
    }

    #[instrument(skip(self))]
    pub async fn reorder(&self, from: usize, to: usize) -> Result<bool> {
        let inner = &self.inner;
        let mut s = inner.session.lock().await;
        if !s.downloads.queue_mut().reorder(from, to) {
            return Ok(false);
        }
        inner.update_next(&mut s).await;
        inner.queue_changed(&mut s).await;
        inner.refresh_downloads(&mut s).await;
        Ok(true)
    }

    /// Shuffle the queue, moving the current track to the front.
    #[instrument(skip(self))]
    pub async fn shuffle(&self) -> Result<()> {
        let inner = &self.inner;
        let mut s = inner.session.lock().await;
        let current = s.current.clone();
        s.downloads.queue_mut().shuffle(current.as_ref());
        inner.update_next(&mut s).await;
        inner.queue_changed(&mut s).await;
        inner.refresh_downloads(&mut s).await;
        Ok(())
    }

    /// Empty the queue and stop playback.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        let inner = &self.inner;
        let mut s = inner.session.lock().await;
        s.downloads.clear_queue().await;
        inner.clear_current(&mut s).await;
        inner.queue_changed(&mut s).await;
        Ok(())
    }

    /// Stop playback and drop queue entries without a finished file.
    #[instrument(skip(self))]
    pub async fn clear_incomplete(&self) -> Result<()> {
        let inner = &self.inner;
        let mut s = inner.session.lock().await;
        inner.reset_playback(&mut s).await;

        let incomplete: Vec<_> = s
            .downloads
            .queue()
            .entries()
            .iter()
            .filter(|e| !e.is_complete_file_available())
            .cloned()
            .collect();
        for entry in &incomplete {
            if same_entry(s.current.as_ref(), Some(entry)) {
                s.current = None;
                inner.announce_track(&s);
            }
            s.downloads.remove_entry(entry).await;
        }

        debug!(removed = incomplete.len(), "Cleared incomplete entries");
        inner.update_next(&mut s).await;
        inner.queue_changed(&mut s).await;
        Ok(())
    }

    // ========================================================================
    // Downloads
    // ========================================================================

    pub async fn download_background(&self, tracks: Vec<Track>, save: bool) -> Result<()> {
        let mut s = self.inner.session.lock().await;
        s.downloads.download_background(&tracks, save).await?;
        self.inner.refresh_downloads(&mut s).await;
        Ok(())
    }

    pub async fn clear_background(&self) -> Result<()> {
        let mut s = self.inner.session.lock().await;
        s.downloads.clear_background().await;
        self.inner.refresh_downloads(&mut s).await;
        Ok(())
    }

    /// Delete every local copy of `tracks`.
    pub async fn delete(&self, tracks: Vec<Track>) -> Result<()> {
        let mut s = self.inner.session.lock().await;
        s.downloads.delete(&tracks).await?;
        self.inner.refresh_downloads(&mut s).await;
        Ok(())
    }

    /// Demote pinned copies of `tracks` to evictable cache copies.
    pub async fn unpin(&self, tracks: Vec<Track>) -> Result<()> {
        let mut s = self.inner.session.lock().await;
        s.downloads.unpin(&tracks).await?;
        Ok(())
    }

    /// Fetch entry currently representing `track`.
    pub async fn entry_for(&self, track: &Track) -> Result<Arc<TrackFetchEntry>> {
        let mut s = self.inner.session.lock().await;
        Ok(s.downloads.entry_for(track).await?)
    }

    pub async fn progress(&self, track: &Track) -> Result<FetchProgress> {
        Ok(self.entry_for(track).await?.progress())
    }

    /// Entry whose transfer currently holds the download slot.
    pub async fn current_downloading(&self) -> Option<Arc<TrackFetchEntry>> {
        let s = self.inner.session.lock().await;
        s.downloads.current_downloading().cloned()
    }

    // ========================================================================
    // Modes
    // ========================================================================

    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        let mut s = self.inner.session.lock().await;
        s.repeat = mode;
        self.inner.storage().save_repeat_mode(mode).await?;
        self.inner.update_next(&mut s).await;
        Ok(())
    }

    pub async fn repeat_mode(&self) -> RepeatMode {
        self.inner.session.lock().await.repeat
    }

    /// Switch endless shuffle. Enabling replaces the queue with tracks from
    /// the shuffle source and starts playing.
    #[instrument(skip(self))]
    pub async fn set_shuffle_play_enabled(&self, enabled: bool) -> Result<()> {
        let inner = &self.inner;
        if enabled && inner.shuffle_source.is_none() {
            return Err(PlaybackError::BackendUnavailable("shuffle source".to_string()));
        }

        let mut s = inner.session.lock().await;
        s.shuffle_play = enabled;
        inner.storage().save_shuffle_play(enabled).await?;
        if !enabled {
            return Ok(());
        }

        s.downloads.clear_queue().await;
        inner.clear_current(&mut s).await;
        inner.queue_changed(&mut s).await;
        if inner.top_up_shuffle(&mut s).await > 0 {
            s.recovery_attempted_for = None;
            inner.play_guarded(&mut s, Cue::play(0)).await;
        }
        Ok(())
    }

    pub async fn is_shuffle_play_enabled(&self) -> bool {
        self.inner.session.lock().await.shuffle_play
    }

    /// Route playback to the server-side jukebox, or back to this device.
    #[instrument(skip(self))]
    pub async fn set_jukebox_enabled(&self, enabled: bool) -> Result<()> {
        let inner = &self.inner;
        let Some(jukebox) = inner.jukebox.clone() else {
            return Err(PlaybackError::BackendUnavailable("jukebox".to_string()));
        };

        let mut s = inner.session.lock().await;
        if s.jukebox_enabled == enabled {
            return Ok(());
        }

        inner.reset_playback(&mut s).await;
        jukebox.set_enabled(enabled);
        s.jukebox_enabled = enabled;
        if enabled {
            s.downloads.cancel_current().await;
            inner.sync_jukebox_playlist(&s).await;
        }

        info!(enabled, "Jukebox mode");
        inner.events.emit_playback(PlaybackEvent::JukeboxToggled { enabled });
        Ok(())
    }

    pub async fn is_jukebox_enabled(&self) -> bool {
        self.inner.session.lock().await.jukebox_enabled
    }

    /// Step the jukebox gain up or down; returns the new gain.
    pub async fn adjust_jukebox_volume(&self, up: bool) -> Result<f32> {
        let jukebox = self
            .inner
            .jukebox
            .as_ref()
            .ok_or_else(|| PlaybackError::BackendUnavailable("jukebox".to_string()))?;
        jukebox.adjust_volume(up).await
    }

    // ========================================================================
    // Music service
    // ========================================================================

    fn music_service(&self) -> Result<&Arc<dyn MusicService>> {
        self.inner
            .music_service
            .as_ref()
            .ok_or_else(|| PlaybackError::BackendUnavailable("music service".to_string()))
    }

    /// Whether the signed-in user may use the jukebox. Errors count as no.
    pub async fn is_jukebox_available(&self) -> bool {
        let Ok(service) = self.music_service() else {
            return false;
        };
        match service.get_user().await {
            Ok(user) => user.jukebox_role && self.inner.jukebox.is_some(),
            Err(e) => {
                warn!(error = %e, "Jukebox capability check failed");
                false
            }
        }
    }

    /// Whether the signed-in user may create shares. Errors count as no.
    pub async fn is_sharing_available(&self) -> bool {
        let Ok(service) = self.music_service() else {
            return false;
        };
        match service.get_user().await {
            Ok(user) => user.share_role,
            Err(e) => {
                warn!(error = %e, "Sharing capability check failed");
                false
            }
        }
    }

    pub async fn star(&self, track: &Track) -> Result<()> {
        self.music_service()?.star(&track.id).await?;
        Ok(())
    }

    pub async fn unstar(&self, track: &Track) -> Result<()> {
        self.music_service()?.unstar(&track.id).await?;
        Ok(())
    }

    /// Bookmark the current track at the current position.
    pub async fn create_bookmark(&self) -> Result<()> {
        let service = Arc::clone(self.music_service()?);
        let (track_id, position) = {
            let s = self.inner.session.lock().await;
            let track_id = s.current_id().ok_or(PlaybackError::NoTrackLoaded)?;
            (track_id, self.inner.position(&s).await)
        };
        service.create_bookmark(&track_id, position).await?;
        Ok(())
    }

    /// Save the queue as a server playlist.
    pub async fn save_playlist(&self, name: &str) -> Result<()> {
        let service = Arc::clone(self.music_service()?);
        let ids = self.inner.session.lock().await.track_ids();
        service.create_playlist(name, &ids).await?;
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn player_state(&self) -> PlayerState {
        self.inner.session.lock().await.player_state
    }

    pub async fn next_player_state(&self) -> NextPlayerState {
        self.inner.session.lock().await.next_state
    }

    pub async fn current_index(&self) -> Option<usize> {
        self.inner.session.lock().await.current_index()
    }

    pub async fn next_index(&self) -> Option<usize> {
        let s = self.inner.session.lock().await;
        s.next.as_ref().and_then(|n| s.downloads.queue().index_of(n))
    }

    pub async fn current_track(&self) -> Option<Track> {
        let s = self.inner.session.lock().await;
        s.current.as_ref().map(|c| c.track().clone())
    }

    pub async fn active_backend(&self) -> Option<BackendKind> {
        let s = self.inner.session.lock().await;
        s.active_backend.as_ref().map(|b| b.kind())
    }

    /// Playback position; 0 while nothing is playing yet.
    pub async fn position_ms(&self) -> u64 {
        let s = self.inner.session.lock().await;
        self.inner.position(&s).await
    }

    /// Track duration from metadata, else as reported by the backend.
    pub async fn duration_ms(&self) -> Option<u64> {
        let s = self.inner.session.lock().await;
        let current = s.current.as_ref()?;
        if let Some(duration) = current.track().duration_ms {
            return Some(duration);
        }
        let backend = s.active_backend.as_ref()?;
        backend.duration_ms().await.ok().flatten()
    }

    pub async fn queue(&self) -> Vec<Track> {
        let s = self.inner.session.lock().await;
        s.downloads
            .queue()
            .entries()
            .iter()
            .map(|e| e.track().clone())
            .collect()
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.session.lock().await.queue_len()
    }

    pub async fn queue_revision(&self) -> u64 {
        self.inner.session.lock().await.downloads.queue().revision()
    }

    /// Sum of the known durations of queued tracks.
    pub async fn queue_duration_ms(&self) -> u64 {
        let s = self.inner.session.lock().await;
        s.downloads
            .queue()
            .entries()
            .iter()
            .filter_map(|e| e.track().duration_ms)
            .sum()
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Snapshot of the queue, current index and position.
    pub async fn serialize(&self) -> SavedQueue {
        let s = self.inner.session.lock().await;
        self.inner.snapshot(&s)
    }

    pub async fn save_queue(&self) -> Result<()> {
        let saved = self.serialize().await;
        self.inner.storage().save(&saved).await
    }

    /// Replace the queue with `saved` and resume at its index and position.
    #[instrument(skip(self, saved), fields(tracks = saved.tracks.len(), index = ?saved.current_index))]
    pub async fn restore(&self, saved: SavedQueue, auto_play: bool) -> Result<()> {
        let inner = &self.inner;
        let mut s = inner.session.lock().await;

        s.downloads.clear_queue().await;
        inner.clear_current(&mut s).await;
        for track in &saved.tracks {
            let entry = s.downloads.acquire_entry(track, false).await?;
            s.downloads.queue_mut().push(entry);
        }
        inner.queue_changed(&mut s).await;

        match saved.valid_index() {
            Some(index) => {
                let cue = Cue {
                    index,
                    position_ms: saved.position_ms,
                    auto_start: auto_play,
                    restoring: true,
                };
                s.recovery_attempted_for = None;
                inner.play_guarded(&mut s, cue).await;
            }
            None => inner.refresh_downloads(&mut s).await,
        }
        Ok(())
    }

    /// Restore the queue saved in the settings store, if any.
    pub async fn restore_saved(&self, auto_play: bool) -> Result<bool> {
        match self.inner.storage().load().await? {
            Some(saved) => {
                self.restore(saved, auto_play).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Save the queue, stop every worker and release the backends.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        let inner = &self.inner;
        inner.shutdown.cancel();

        let mut s = inner.session.lock().await;
        inner.serialize(&s).await;
        inner.stop_workers(&mut s);
        s.downloads.cancel_current().await;

        for backend in inner.selector.backends() {
            if let Err(e) = backend.destroy().await {
                warn!(backend = %backend.kind(), error = %e, "Backend teardown failed");
            }
        }
        s.active_backend = None;
        inner.enter_idle(&mut s);
        info!("Playback coordinator stopped");
        Ok(())
    }
}

impl std::fmt::Debug for PlaybackCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackCoordinator")
            .field("selector", &self.inner.selector)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
