//! # Playback Module
//!
//! Queue-driven playback on top of the download scheduler.
//!
//! ## Overview
//!
//! This module handles:
//! - The player and next-player state machines and repeat mode ([`state`])
//! - Local, jukebox and streaming backends chosen per track ([`backend`])
//! - The playback coordinator with its buffering, gapless staging and
//!   position workers ([`PlaybackCoordinator`])
//! - Queue persistence across restarts ([`persistence`])
//! - Now-playing and submission scrobbles ([`scrobble`])
//!
//! ## Usage
//!
//! ```ignore
//! use core_playback::{EnqueueOptions, PlaybackConfig, PlaybackCoordinator, PlaybackDependencies};
//!
//! let coordinator = PlaybackCoordinator::new(deps, PlaybackConfig::default()).await?;
//! coordinator.restore_saved(false).await?;
//! coordinator.enqueue(tracks, EnqueueOptions::default().autoplay()).await?;
//! ```

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod persistence;
pub mod scrobble;
pub mod state;
mod workers;

pub use backend::{BackendKind, BackendSelector, PlayOutcome, PlayRequest, PlaybackBackend};
pub use config::PlaybackConfig;
pub use coordinator::{EnqueueOptions, PlaybackCoordinator, PlaybackDependencies};
pub use error::{PlaybackError, Result};
pub use persistence::SavedQueue;
pub use state::{MediaKey, NextPlayerState, PlayerState, RepeatMode};
