//! # Track Fetch Entry
//!
//! Per-track acquisition state: drives one track from the network into a
//! locally playable file, independently of playback.
//!
//! ## Overview
//!
//! Every entry owns three candidate locations below the cache root:
//!
//! | File | Meaning |
//! |------|---------|
//! | `Title.partial.mp3` | transfer in progress, appended to on resume |
//! | `Title.complete.mp3` | finished transient cache copy |
//! | `Title.mp3` | finished pinned ("saved") copy |
//!
//! [`TrackFetchEntry::download`] spawns at most one transfer task per entry.
//! Transfers resume from the current partial length with an HTTP range
//! request, publish progress through atomic counters, and rename the partial
//! file once it verifies. Completion and failure are reported on the
//! [`FetchNotice`] channel so the owner can schedule the next transfer.
//!
//! A player may read the partial file while it is still being written; the
//! file is only ever appended to and never truncated in place.

use crate::config::DownloadConfig;
use crate::error::{DownloadError, Result};
use bridge_traits::{Clock, FileSystemAccess, HttpClient, Track};
use core_runtime::events::{DownloadEvent, EventBus};
use core_runtime::logging::strip_path;
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Progress events are published once per this many transferred chunks.
const PROGRESS_EVERY_CHUNKS: u64 = 16;

const FORBIDDEN_PATH_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

// ============================================================================
// Status
// ============================================================================

/// Download status of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
    #[default]
    NotStarted,
    Downloading,
    /// Cancelled mid-transfer; the partial file is kept for resuming.
    Paused,
    Complete,
    Failed,
}

impl FetchStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, FetchStatus::Downloading)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchStatus::Complete | FetchStatus::Failed)
    }
}

/// Which finished copy exists on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedCopy {
    /// `*.complete.*`, evictable
    Transient,
    /// Pinned copy without infix
    Saved,
}

#[derive(Debug, Default)]
struct FetchState {
    status: FetchStatus,
    copy: Option<CachedCopy>,
}

/// Snapshot of transfer progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    pub bytes_downloaded: u64,
    pub expected_bytes: Option<u64>,
}

impl FetchProgress {
    /// Fraction in `[0, 1]` when the expected size is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.expected_bytes {
            Some(0) | None => None,
            Some(expected) => Some((self.bytes_downloaded as f64 / expected as f64).min(1.0)),
        }
    }
}

/// Posted to the owner of the entries when a transfer ends on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchNotice {
    Completed { track_id: String },
    Failed { track_id: String, message: String },
}

// ============================================================================
// Shared context
// ============================================================================

/// Collaborators shared by every entry of one download coordinator.
pub struct FetchContext {
    pub fs: Arc<dyn FileSystemAccess>,
    pub http: Arc<dyn HttpClient>,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
    pub config: DownloadConfig,
    notices: mpsc::UnboundedSender<FetchNotice>,
    cache_root: Mutex<Option<PathBuf>>,
}

impl FetchContext {
    /// Build a context and the receiver for its [`FetchNotice`]s.
    pub fn new(
        fs: Arc<dyn FileSystemAccess>,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        config: DownloadConfig,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<FetchNotice>)> {
        config.validate().map_err(DownloadError::InvalidConfig)?;

        let (notices, receiver) = mpsc::unbounded_channel();
        let ctx = Arc::new(Self {
            fs,
            http,
            clock,
            events,
            config,
            notices,
            cache_root: Mutex::new(None),
        });
        Ok((ctx, receiver))
    }

    /// Track cache root, resolved on first use.
    pub async fn cache_root(&self) -> Result<PathBuf> {
        if let Some(root) = self.cache_root.lock().clone() {
            return Ok(root);
        }

        let root = self
            .fs
            .get_cache_directory()
            .await
            .map_err(|e| DownloadError::StorageUnavailable(e.to_string()))?
            .join(&self.config.cache_directory);
        self.fs.create_dir_all(&root).await?;

        *self.cache_root.lock() = Some(root.clone());
        Ok(root)
    }

    fn notify(&self, notice: FetchNotice) {
        if self.notices.send(notice).is_err() {
            debug!("Fetch notice dropped, receiver closed");
        }
    }
}

impl fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchContext")
            .field("config", &self.config)
            .field("cache_root", &*self.cache_root.lock())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Paths
// ============================================================================

/// On-disk locations of one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPaths {
    pub partial: PathBuf,
    pub complete: PathBuf,
    pub saved: PathBuf,
}

impl FetchPaths {
    /// Lay out a track below `root`, mirroring the server path when known and
    /// `Artist/Album/Title` otherwise.
    pub fn for_track(root: &Path, track: &Track, config: &DownloadConfig) -> Self {
        let server_path: Vec<String> = track
            .path
            .as_deref()
            .map(|p| {
                p.split(['/', '\\'])
                    .filter(|c| !c.is_empty() && *c != "." && *c != "..")
                    .map(sanitize_component)
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let (mut components, stem, path_ext) = match server_path.split_last() {
            Some((file, dirs)) => {
                let (stem, ext) = split_extension(file);
                (dirs.to_vec(), stem, ext)
            }
            None => {
                let artist = track.artist.as_deref().unwrap_or("Unknown Artist");
                let album = track.album.as_deref().unwrap_or("Unknown Album");
                let title = if track.title.trim().is_empty() {
                    track.id.as_str()
                } else {
                    track.title.as_str()
                };
                (
                    vec![sanitize_component(artist), sanitize_component(album)],
                    sanitize_component(title),
                    None,
                )
            }
        };
        components.retain(|c| !c.is_empty());

        let ext = track
            .suffix
            .clone()
            .or(path_ext)
            .unwrap_or_else(|| "mp3".to_string());
        let stem = if stem.is_empty() {
            sanitize_component(&track.id)
        } else {
            stem
        };

        let dir = components.iter().fold(root.to_path_buf(), |dir, c| dir.join(c));
        Self {
            partial: dir.join(format!("{}.{}.{}", stem, config.partial_suffix, ext)),
            complete: dir.join(format!("{}.{}.{}", stem, config.complete_suffix, ext)),
            saved: dir.join(format!("{}.{}", stem, ext)),
        }
    }

    pub fn for_copy(&self, copy: CachedCopy) -> &Path {
        match copy {
            CachedCopy::Transient => &self.complete,
            CachedCopy::Saved => &self.saved,
        }
    }
}

fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if FORBIDDEN_PATH_CHARS.contains(&c) || c.is_control() {
                '-'
            } else {
                c
            }
        })
        .collect::<String>()
        .trim()
        .trim_end_matches('.')
        .to_string()
}

fn split_extension(file: &str) -> (String, Option<String>) {
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            (stem.to_string(), Some(ext.to_lowercase()))
        }
        _ => (file.to_string(), None),
    }
}

// ============================================================================
// Entry
// ============================================================================

struct Transfer {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Acquisition state of one track.
pub struct TrackFetchEntry {
    track: Track,
    save: AtomicBool,
    paths: FetchPaths,
    state: Mutex<FetchState>,
    bytes_downloaded: AtomicU64,
    last_access_ms: AtomicI64,
    transfer: Mutex<Option<Transfer>>,
    ctx: Arc<FetchContext>,
}

impl TrackFetchEntry {
    /// Create an entry and pick up whatever copy of the track is already on disk.
    pub async fn open(track: Track, save: bool, ctx: Arc<FetchContext>) -> Result<Arc<Self>> {
        let root = ctx.cache_root().await?;
        let paths = FetchPaths::for_track(&root, &track, &ctx.config);

        let fs = &ctx.fs;
        let saved = fs.file_size(&paths.saved).await;
        let complete = fs.file_size(&paths.complete).await;
        let partial = fs.file_size(&paths.partial).await;

        let (state, bytes) = if saved > 0 {
            (
                FetchState {
                    status: FetchStatus::Complete,
                    copy: Some(CachedCopy::Saved),
                },
                saved,
            )
        } else if complete > 0 {
            (
                FetchState {
                    status: FetchStatus::Complete,
                    copy: Some(CachedCopy::Transient),
                },
                complete,
            )
        } else {
            (FetchState::default(), partial)
        };

        debug!(
            track_id = %track.id,
            status = ?state.status,
            bytes,
            "Opened fetch entry"
        );

        let now = ctx.clock.unix_timestamp_millis();
        Ok(Arc::new(Self {
            track,
            save: AtomicBool::new(save),
            paths,
            state: Mutex::new(state),
            bytes_downloaded: AtomicU64::new(bytes),
            last_access_ms: AtomicI64::new(now),
            transfer: Mutex::new(None),
            ctx,
        }))
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn id(&self) -> &str {
        &self.track.id
    }

    pub fn paths(&self) -> &FetchPaths {
        &self.paths
    }

    pub fn should_save(&self) -> bool {
        self.save.load(Ordering::Acquire)
    }

    /// Mark the track as pinned; the next transfer (or promotion) keeps it.
    pub fn set_save(&self, save: bool) {
        self.save.store(save, Ordering::Release);
    }

    pub fn status(&self) -> FetchStatus {
        self.state.lock().status
    }

    pub fn is_downloading(&self) -> bool {
        self.status().is_active()
    }

    pub fn is_failed(&self) -> bool {
        self.status() == FetchStatus::Failed
    }

    /// Whether a verified copy satisfying the save flag is on disk.
    pub fn is_work_done(&self) -> bool {
        let state = self.state.lock();
        state.status == FetchStatus::Complete
            && match state.copy {
                Some(CachedCopy::Saved) => true,
                Some(CachedCopy::Transient) => !self.should_save(),
                None => false,
            }
    }

    /// Whether any finished copy exists, pinned or not.
    pub fn is_complete_file_available(&self) -> bool {
        self.state.lock().copy.is_some()
    }

    pub fn cached_copy(&self) -> Option<CachedCopy> {
        self.state.lock().copy
    }

    /// File a player should open: the finished copy if any, else the partial file.
    pub fn playable_path(&self) -> PathBuf {
        match self.cached_copy() {
            Some(copy) => self.paths.for_copy(copy).to_path_buf(),
            None => self.paths.partial.clone(),
        }
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded.load(Ordering::Acquire)
    }

    pub fn progress(&self) -> FetchProgress {
        FetchProgress {
            bytes_downloaded: self.bytes_downloaded(),
            expected_bytes: self.track.size_bytes,
        }
    }

    /// Record an access for cache recency.
    pub fn touch(&self) {
        self.last_access_ms
            .store(self.ctx.clock.unix_timestamp_millis(), Ordering::Release);
    }

    pub fn last_access_ms(&self) -> i64 {
        self.last_access_ms.load(Ordering::Acquire)
    }

    fn set_status(&self, status: FetchStatus) {
        self.state.lock().status = status;
    }

    /// Start or resume the transfer.
    ///
    /// No-op when the work is already done or a transfer is still running.
    pub fn download(self: &Arc<Self>) {
        if self.is_work_done() {
            return;
        }

        let mut transfer = self.transfer.lock();
        if transfer.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return;
        }

        self.set_status(FetchStatus::Downloading);
        self.ctx.events.emit_download(DownloadEvent::Started {
            track_id: self.track.id.clone(),
        });
        debug!(track_id = %self.track.id, "Starting transfer");

        let token = CancellationToken::new();
        let cancel = token.clone();
        let entry = Arc::clone(self);
        let handle = tokio::spawn(async move { entry.run_transfer(cancel).await });

        *transfer = Some(Transfer { token, handle });
    }

    /// Abort the in-flight transfer and wait until it has stopped.
    ///
    /// The partial file is kept so a later [`download`](Self::download) resumes.
    #[instrument(skip(self), fields(track_id = %self.track.id))]
    pub async fn cancel_download(&self) {
        let transfer = self.transfer.lock().take();
        let Some(transfer) = transfer else {
            return;
        };

        transfer.token.cancel();
        if let Err(e) = transfer.handle.await {
            warn!(error = %e, "Transfer task ended abnormally");
            let mut state = self.state.lock();
            if state.status == FetchStatus::Downloading {
                state.status = FetchStatus::Paused;
            }
        }
    }

    async fn run_transfer(self: Arc<Self>, cancel: CancellationToken) {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DownloadError::Cancelled),
            result = self.transfer() => result,
        };

        let track_id = self.track.id.clone();
        match result {
            Ok(copy) => {
                {
                    let mut state = self.state.lock();
                    state.status = FetchStatus::Complete;
                    state.copy = Some(copy);
                }
                info!(
                    track_id = %track_id,
                    bytes = self.bytes_downloaded(),
                    file = %strip_path(&self.paths.for_copy(copy).to_string_lossy()),
                    "Download complete"
                );
                self.ctx.events.emit_download(DownloadEvent::Completed {
                    track_id: track_id.clone(),
                    saved: copy == CachedCopy::Saved,
                });
                self.ctx.notify(FetchNotice::Completed { track_id });
            }
            Err(DownloadError::Cancelled) => {
                {
                    let mut state = self.state.lock();
                    if state.status == FetchStatus::Downloading {
                        state.status = FetchStatus::Paused;
                    }
                }
                debug!(track_id = %track_id, bytes = self.bytes_downloaded(), "Transfer cancelled");
                self.ctx
                    .events
                    .emit_download(DownloadEvent::Cancelled { track_id });
            }
            Err(e) => {
                self.set_status(FetchStatus::Failed);
                warn!(track_id = %track_id, error = %e, transient = e.is_transient(), "Download failed");
                self.ctx.events.emit_download(DownloadEvent::Failed {
                    track_id: track_id.clone(),
                    message: e.to_string(),
                });
                self.ctx.notify(FetchNotice::Failed {
                    track_id,
                    message: e.to_string(),
                });
            }
        }
    }

    async fn transfer(&self) -> Result<CachedCopy> {
        let fs = &self.ctx.fs;
        let config = &self.ctx.config;
        let target = if self.should_save() {
            CachedCopy::Saved
        } else {
            CachedCopy::Transient
        };

        // A pinned track with a transient copy only needs promoting.
        if target == CachedCopy::Saved && self.cached_copy() == Some(CachedCopy::Transient) {
            fs.rename(&self.paths.complete, &self.paths.saved).await?;
            return Ok(CachedCopy::Saved);
        }

        let mut offset = fs.file_size(&self.paths.partial).await;
        self.bytes_downloaded.store(offset, Ordering::Release);
        let expected = self.track.size_bytes;

        if expected.map_or(true, |expected| offset < expected) {
            debug!(track_id = %self.track.id, offset, "Opening transfer stream");
            let mut stream = self
                .ctx
                .http
                .download_stream(&self.track.stream_uri, offset, config.retry_policy.clone())
                .await?;
            let mut sink = fs.open_append_stream(&self.paths.partial).await?;

            let mut buf = vec![0u8; config.transfer_chunk_bytes];
            let mut chunks = 0u64;
            loop {
                let read = stream.read(&mut buf).await?;
                if read == 0 {
                    break;
                }
                sink.write_all(&buf[..read]).await?;
                offset += read as u64;
                self.bytes_downloaded.store(offset, Ordering::Release);

                chunks += 1;
                if chunks % PROGRESS_EVERY_CHUNKS == 0 {
                    self.ctx.events.emit_download(DownloadEvent::Progress {
                        track_id: self.track.id.clone(),
                        bytes_downloaded: offset,
                        expected_bytes: expected,
                    });
                }
            }
            sink.flush().await?;
            sink.shutdown().await?;
        }

        let actual = fs.file_size(&self.paths.partial).await;
        if actual == 0 {
            return Err(DownloadError::EmptyFile {
                track_id: self.track.id.clone(),
            });
        }
        if let Some(expected) = expected {
            if actual != expected {
                if actual > expected {
                    // Overlong files cannot be resumed; start over next time.
                    fs.delete_file(&self.paths.partial).await?;
                    self.bytes_downloaded.store(0, Ordering::Release);
                }
                return Err(DownloadError::SizeMismatch {
                    track_id: self.track.id.clone(),
                    expected,
                    actual,
                });
            }
        }

        fs.rename(&self.paths.partial, self.paths.for_copy(target)).await?;
        self.bytes_downloaded.store(actual, Ordering::Release);
        Ok(target)
    }

    /// Delete leftovers superseded by a finished copy.
    ///
    /// Returns `true` when nothing stale remains, i.e. the entry no longer
    /// needs cleaning.
    #[instrument(skip(self), fields(track_id = %self.track.id))]
    pub async fn cleanup(&self) -> bool {
        if self.is_downloading() {
            return false;
        }

        let mut ok = true;
        match self.cached_copy() {
            Some(CachedCopy::Saved) => {
                ok &= self.remove_if_present(&self.paths.partial).await;
                ok &= self.remove_if_present(&self.paths.complete).await;
            }
            Some(CachedCopy::Transient) => {
                ok &= self.remove_if_present(&self.paths.partial).await;
            }
            None => {}
        }
        ok
    }

    async fn remove_if_present(&self, path: &Path) -> bool {
        let fs = &self.ctx.fs;
        match fs.exists(path).await {
            Ok(false) => true,
            Ok(true) => match fs.delete_file(path).await {
                Ok(()) => {
                    debug!(file = %strip_path(&path.to_string_lossy()), "Removed stale file");
                    true
                }
                Err(e) => {
                    warn!(file = %strip_path(&path.to_string_lossy()), error = %e, "Failed to remove stale file");
                    false
                }
            },
            Err(_) => false,
        }
    }

    /// Cancel any transfer and delete every file of this track.
    #[instrument(skip(self), fields(track_id = %self.track.id))]
    pub async fn delete(&self) -> Result<()> {
        self.cancel_download().await;

        let fs = &self.ctx.fs;
        for path in [&self.paths.partial, &self.paths.complete, &self.paths.saved] {
            if fs.exists(path).await? {
                fs.delete_file(path).await?;
            }
        }

        *self.state.lock() = FetchState::default();
        self.bytes_downloaded.store(0, Ordering::Release);
        self.set_save(false);
        info!("Deleted cached track files");
        Ok(())
    }

    /// Demote a pinned copy to an evictable cache copy.
    #[instrument(skip(self), fields(track_id = %self.track.id))]
    pub async fn unpin(&self) -> Result<()> {
        self.set_save(false);
        if self.cached_copy() == Some(CachedCopy::Saved) {
            self.ctx
                .fs
                .rename(&self.paths.saved, &self.paths.complete)
                .await?;
            self.state.lock().copy = Some(CachedCopy::Transient);
            debug!("Unpinned track");
        }
        Ok(())
    }
}

impl fmt::Debug for TrackFetchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackFetchEntry")
            .field("track_id", &self.track.id)
            .field("save", &self.should_save())
            .field("status", &self.status())
            .field("bytes_downloaded", &self.bytes_downloaded())
            .finish()
    }
}
