//! # Download Coordinator
//!
//! Decides which single track is being transferred at any moment.
//!
//! ## Overview
//!
//! The coordinator owns the fetch entries of the main play queue, the
//! background (pin-only) queue and a bounded lookup cache for entries that are
//! in neither. [`DownloadCoordinator::check_downloads`] is the scheduling
//! pass: it keeps at most one entry downloading, prefers the entry that is
//! playing, preloads the next `preload_count` queue entries and drains the
//! background queue when nothing else needs the network.
//!
//! The coordinator is not internally synchronized. It is owned by the
//! playback coordinator and mutated from its serialized command loop.

use crate::error::Result;
use crate::fetch::{CachedCopy, FetchContext, TrackFetchEntry};
use crate::queue::QueueStore;
use bridge_traits::Track;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// External conditions that suppress downloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadGate {
    /// Server-side playback needs no local files.
    pub jukebox_enabled: bool,
    pub network_connected: bool,
}

impl DownloadGate {
    pub fn open() -> Self {
        Self {
            jukebox_enabled: false,
            network_connected: true,
        }
    }

    pub fn allows_downloads(&self) -> bool {
        !self.jukebox_enabled && self.network_connected
    }
}

impl Default for DownloadGate {
    fn default() -> Self {
        Self::open()
    }
}

/// Result of one scheduling pass.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Entry chosen (or kept) as the single active transfer.
    pub target: Option<Arc<TrackFetchEntry>>,
    /// Main-queue position of `target`, after wrapping; `None` for
    /// background entries or when nothing runs.
    pub queue_index: Option<usize>,
}

fn same_entry(a: Option<&Arc<TrackFetchEntry>>, b: &Arc<TrackFetchEntry>) -> bool {
    a.is_some_and(|a| Arc::ptr_eq(a, b))
}

/// Schedules fetch entries so that at most one transfer runs at a time.
pub struct DownloadCoordinator {
    ctx: Arc<FetchContext>,
    queue: QueueStore<TrackFetchEntry>,
    current_downloading: Option<Arc<TrackFetchEntry>>,
    cleanup_candidates: Vec<Arc<TrackFetchEntry>>,
    lookup: LruCache<String, Arc<TrackFetchEntry>>,
}

impl DownloadCoordinator {
    pub fn new(ctx: Arc<FetchContext>) -> Self {
        let capacity = NonZeroUsize::new(ctx.config.lru_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ctx,
            queue: QueueStore::new(),
            current_downloading: None,
            cleanup_candidates: Vec::new(),
            lookup: LruCache::new(capacity),
        }
    }

    pub fn context(&self) -> &Arc<FetchContext> {
        &self.ctx
    }

    pub fn queue(&self) -> &QueueStore<TrackFetchEntry> {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut QueueStore<TrackFetchEntry> {
        &mut self.queue
    }

    pub fn current_downloading(&self) -> Option<&Arc<TrackFetchEntry>> {
        self.current_downloading.as_ref()
    }

    pub fn cleanup_candidates(&self) -> &[Arc<TrackFetchEntry>] {
        &self.cleanup_candidates
    }

    pub fn cached_entry_count(&self) -> usize {
        self.lookup.len()
    }

    // ========================================================================
    // Entry acquisition
    // ========================================================================

    /// Entry for a track about to be placed in one of the queues.
    ///
    /// An entry already held by the lookup cache is moved out of it so a
    /// single entry is never tracked in both places.
    pub async fn acquire_entry(&mut self, track: &Track, save: bool) -> Result<Arc<TrackFetchEntry>> {
        if let Some(entry) = self.lookup.pop(&track.id) {
            if save {
                entry.set_save(true);
            }
            entry.touch();
            return Ok(entry);
        }
        TrackFetchEntry::open(track.clone(), save, Arc::clone(&self.ctx)).await
    }

    /// Best entry for a track outside of queue mutation (e.g. for display).
    ///
    /// Looks in the main queue for an entry that is downloading with data on
    /// disk or already done, then in the background queue, then in the lookup
    /// cache. A miss creates a fresh entry and caches it.
    pub async fn entry_for(&mut self, track: &Track) -> Result<Arc<TrackFetchEntry>> {
        let queued = self.queue.entries().iter().find(|e| {
            e.id() == track.id
                && ((e.is_downloading() && e.bytes_downloaded() > 0) || e.is_work_done())
        });
        if let Some(entry) = queued {
            return Ok(Arc::clone(entry));
        }

        if let Some(entry) = self.queue.background().iter().find(|e| e.id() == track.id) {
            return Ok(Arc::clone(entry));
        }

        if let Some(entry) = self.lookup.get(&track.id) {
            entry.touch();
            return Ok(Arc::clone(entry));
        }

        let entry = TrackFetchEntry::open(track.clone(), false, Arc::clone(&self.ctx)).await?;
        if let Some((evicted, _)) = self.lookup.push(track.id.clone(), Arc::clone(&entry)) {
            if evicted != track.id {
                debug!(track_id = %evicted, "Evicted fetch entry from lookup cache");
            }
        }
        Ok(entry)
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Run one scheduling pass.
    ///
    /// `current` is the entry that is playing (or about to play). With the
    /// gate closed nothing changes.
    #[instrument(skip(self, current), fields(current = current.map(|c| c.id())))]
    pub async fn check_downloads(
        &mut self,
        current: Option<&Arc<TrackFetchEntry>>,
        gate: DownloadGate,
    ) -> ScanOutcome {
        if !gate.allows_downloads() {
            debug!(?gate, "Downloads suppressed");
            return ScanOutcome {
                target: self.current_downloading.clone(),
                queue_index: None,
            };
        }

        if !self.ctx.fs.is_available().await {
            debug!("Storage unavailable, skipping download pass");
            return ScanOutcome {
                target: self.current_downloading.clone(),
                queue_index: None,
            };
        }

        let mut outcome = ScanOutcome::default();

        if let Some(current) = current.filter(|c| !c.is_work_done() && c.track().is_fetchable()) {
            // The playing track always wins the single transfer slot.
            if !same_entry(self.current_downloading.as_ref(), current) {
                self.switch_to(Arc::clone(current)).await;
            }
            current.download();
            outcome.queue_index = self.queue.index_of(current);
            outcome.target = Some(Arc::clone(current));
        } else {
            let needs_target = self
                .current_downloading
                .as_ref()
                .map_or(true, |e| !e.is_downloading());

            if needs_target {
                self.pick_queue_target(current, &mut outcome).await;
                if outcome.target.is_none() {
                    self.drain_background().await;
                }
            }
            if outcome.target.is_none() {
                outcome.target = self.current_downloading.clone();
            }
        }

        self.cleanup(current).await;
        outcome
    }

    async fn pick_queue_target(
        &mut self,
        current: Option<&Arc<TrackFetchEntry>>,
        outcome: &mut ScanOutcome,
    ) {
        if self.queue.is_empty() {
            return;
        }

        let len = self.queue.len();
        let start = current.and_then(|c| self.queue.index_of(c)).unwrap_or(0);
        let preload_count = self.ctx.config.preload_count;

        let mut preloaded = 0usize;
        let mut chosen: Option<(usize, Arc<TrackFetchEntry>)> = None;
        for i in start..start + len {
            let entry = Arc::clone(&self.queue.entries()[i % len]);
            if same_entry(current, &entry) || !entry.track().is_fetchable() {
                continue;
            }

            if entry.is_work_done() {
                preloaded += 1;
                continue;
            }

            if entry.should_save() || preloaded < preload_count {
                chosen = Some((i, entry));
                break;
            }
        }

        if let Some((i, entry)) = chosen {
            outcome.queue_index = Some(i % len);
            if !same_entry(self.current_downloading.as_ref(), &entry) {
                self.switch_to(Arc::clone(&entry)).await;
            }
            entry.download();
            outcome.target = Some(entry);
        }
    }

    async fn switch_to(&mut self, next: Arc<TrackFetchEntry>) {
        if let Some(previous) = self.current_downloading.take() {
            if previous.is_downloading() {
                debug!(from = previous.id(), to = next.id(), "Pausing transfer for higher priority track");
                previous.cancel_download().await;
            }
            self.remember_for_cleanup(previous);
        }
        self.current_downloading = Some(next);
    }

    fn remember_for_cleanup(&mut self, entry: Arc<TrackFetchEntry>) {
        if !self.cleanup_candidates.iter().any(|e| Arc::ptr_eq(e, &entry)) {
            self.cleanup_candidates.push(entry);
        }
    }

    async fn drain_background(&mut self) {
        let mut index = 0;
        while index < self.queue.background().len() {
            let entry = Arc::clone(&self.queue.background()[index]);

            let evict = !entry.track().is_fetchable()
                || (entry.is_work_done()
                    && (!entry.should_save() || entry.cached_copy() == Some(CachedCopy::Saved)));
            if evict {
                self.queue.remove_background(index);
                self.remember_for_cleanup(entry);
                continue;
            }

            debug!(track_id = entry.id(), "Fetching background track");
            self.switch_to(Arc::clone(&entry)).await;
            entry.download();
            return;
        }
    }

    async fn cleanup(&mut self, current: Option<&Arc<TrackFetchEntry>>) {
        let candidates = std::mem::take(&mut self.cleanup_candidates);
        for entry in candidates {
            let busy = same_entry(current, &entry)
                || same_entry(self.current_downloading.as_ref(), &entry);
            if busy || !entry.cleanup().await {
                self.cleanup_candidates.push(entry);
            }
        }
    }

    // ========================================================================
    // Queue maintenance
    // ========================================================================

    /// Cancel the active transfer, if any.
    pub async fn cancel_current(&mut self) {
        if let Some(entry) = self.current_downloading.take() {
            entry.cancel_download().await;
            self.remember_for_cleanup(entry);
        }
    }

    /// Remove `entry` from both queues, cancelling it if it is transferring.
    pub async fn remove_entry(&mut self, entry: &Arc<TrackFetchEntry>) -> bool {
        if same_entry(self.current_downloading.as_ref(), entry) {
            self.cancel_current().await;
        }
        self.queue.remove_entry(entry)
    }

    /// Empty the main queue and stop the active transfer.
    pub async fn clear_queue(&mut self) {
        self.cancel_current().await;
        self.queue.clear();
    }

    /// Drop all pending background work.
    pub async fn clear_background(&mut self) {
        let active_in_background = self
            .current_downloading
            .as_ref()
            .is_some_and(|e| self.queue.contains_background(e));
        if active_in_background {
            self.cancel_current().await;
        }
        self.queue.clear_background();
    }

    /// Queue tracks for fetching without playing them.
    pub async fn download_background(&mut self, tracks: &[Track], save: bool) -> Result<()> {
        for track in tracks {
            let existing = self
                .queue
                .background()
                .iter()
                .find(|e| e.id() == track.id)
                .cloned();
            match existing {
                Some(entry) => {
                    if save {
                        entry.set_save(true);
                    }
                }
                None => {
                    let entry = self.acquire_entry(track, save).await?;
                    self.queue.push_background(entry);
                }
            }
        }
        info!(count = tracks.len(), save, "Queued background downloads");
        Ok(())
    }

    /// Delete every local copy of `tracks`.
    pub async fn delete(&mut self, tracks: &[Track]) -> Result<()> {
        for track in tracks {
            let entry = self.entry_for(track).await?;
            if same_entry(self.current_downloading.as_ref(), &entry) {
                self.current_downloading = None;
            }
            entry.delete().await?;
        }
        Ok(())
    }

    /// Demote pinned copies of `tracks` to evictable cache copies.
    pub async fn unpin(&mut self, tracks: &[Track]) -> Result<()> {
        for track in tracks {
            let entry = self.entry_for(track).await?;
            entry.unpin().await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("queue_len", &self.queue.len())
            .field("background_len", &self.queue.background().len())
            .field("current_downloading", &self.current_downloading)
            .field("cached_entries", &self.lookup.len())
            .finish()
    }
}
