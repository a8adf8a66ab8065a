//! # Download Module
//!
//! Track acquisition for the playback core: the play queue, per-track fetch
//! state and the scheduler deciding what to transfer next.
//!
//! ## Overview
//!
//! This module handles:
//! - Queue storage with revision tracking ([`QueueStore`])
//! - Resumable per-track transfers into a local cache ([`TrackFetchEntry`])
//! - Preload window, pinning and background downloads ([`DownloadCoordinator`])
//!
//! ## Usage
//!
//! ```ignore
//! use core_download::{DownloadConfig, DownloadCoordinator, DownloadGate, FetchContext};
//!
//! let (ctx, mut notices) = FetchContext::new(fs, http, clock, events, DownloadConfig::default())?;
//! let mut downloads = DownloadCoordinator::new(ctx);
//!
//! let entry = downloads.acquire_entry(&track, false).await?;
//! downloads.queue_mut().push(entry.clone());
//! downloads.check_downloads(Some(&entry), DownloadGate::open()).await;
//!
//! // Re-run the scan whenever a transfer finishes.
//! while let Some(notice) = notices.recv().await {
//!     downloads.check_downloads(Some(&entry), DownloadGate::open()).await;
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetch;
pub mod queue;

pub use config::DownloadConfig;
pub use coordinator::{DownloadCoordinator, DownloadGate, ScanOutcome};
pub use error::{DownloadError, Result};
pub use fetch::{
    CachedCopy, FetchContext, FetchNotice, FetchPaths, FetchProgress, FetchStatus,
    TrackFetchEntry,
};
pub use queue::QueueStore;
