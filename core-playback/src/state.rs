//! # Player State Machines
//!
//! The two small state machines of the playback session and the repeat-mode
//! successor rule.
//!
//! ## Overview
//!
//! [`PlayerState`] tracks the current track's player, [`NextPlayerState`] the
//! player pre-staged for the successor. Both only move along their tables of
//! legal transitions; anything else is rejected with
//! [`PlaybackError::IllegalTransition`]. A transition to `Idle` is always
//! legal and a self-transition is a no-op.

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Player State
// ============================================================================

/// State of the player for the current track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    #[default]
    Idle,
    /// Waiting for enough of the file to be on disk.
    Downloading,
    Preparing,
    Prepared,
    Started,
    Paused,
    Stopped,
    Completed,
}

impl PlayerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerState::Idle => "idle",
            PlayerState::Downloading => "downloading",
            PlayerState::Preparing => "preparing",
            PlayerState::Prepared => "prepared",
            PlayerState::Started => "started",
            PlayerState::Paused => "paused",
            PlayerState::Stopped => "stopped",
            PlayerState::Completed => "completed",
        }
    }

    /// Whether `self → next` is in the transition table.
    pub fn can_transition_to(self, next: PlayerState) -> bool {
        use PlayerState::*;

        if next == Idle || next == self {
            return true;
        }

        match self {
            Idle => matches!(next, Preparing | Downloading),
            Downloading => matches!(next, Preparing | Prepared | Started | Paused),
            Preparing => matches!(next, Downloading | Prepared | Started | Paused),
            Prepared => matches!(next, Started | Paused | Stopped | Completed),
            Started => matches!(next, Paused | Stopped | Completed | Downloading),
            Paused => matches!(next, Started | Stopped | Preparing | Downloading | Completed),
            Stopped => matches!(next, Started | Preparing | Downloading),
            Completed => matches!(next, Started | Preparing | Downloading | Paused),
        }
    }

    /// Validate and return the next state.
    pub fn transition(self, next: PlayerState) -> Result<PlayerState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(PlaybackError::IllegalTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// States in which `start()` resumes playback.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            PlayerState::Paused
                | PlayerState::Completed
                | PlayerState::Stopped
                | PlayerState::Prepared
        )
    }

    /// States in which the backend position is meaningless.
    pub fn hides_position(&self) -> bool {
        matches!(
            self,
            PlayerState::Idle | PlayerState::Downloading | PlayerState::Preparing
        )
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Next Player State
// ============================================================================

/// State of the player pre-staged for the successor track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextPlayerState {
    #[default]
    Idle,
    Downloading,
    Preparing,
    Prepared,
}

impl NextPlayerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NextPlayerState::Idle => "idle",
            NextPlayerState::Downloading => "downloading",
            NextPlayerState::Preparing => "preparing",
            NextPlayerState::Prepared => "prepared",
        }
    }

    pub fn can_transition_to(self, next: NextPlayerState) -> bool {
        use NextPlayerState::*;

        if next == Idle || next == self {
            return true;
        }

        matches!(
            (self, next),
            (Idle, Downloading) | (Idle, Preparing) | (Downloading, Preparing) | (Preparing, Prepared)
        )
    }

    pub fn transition(self, next: NextPlayerState) -> Result<NextPlayerState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(PlaybackError::IllegalTransition {
                from: format!("next:{}", self.as_str()),
                to: format!("next:{}", next.as_str()),
            })
        }
    }
}

impl fmt::Display for NextPlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Repeat Mode
// ============================================================================

/// What follows the last (or current) track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    Single,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::All => "all",
            RepeatMode::Single => "single",
        }
    }

    /// Successor of `current` in a queue of `len` entries.
    ///
    /// `None` when playback should stop after the current track.
    pub fn next_index(&self, current: usize, len: usize) -> Option<usize> {
        if current >= len {
            return None;
        }
        match self {
            RepeatMode::Off => (current + 1 < len).then_some(current + 1),
            RepeatMode::All => Some((current + 1) % len),
            RepeatMode::Single => Some(current),
        }
    }

    /// Cycle Off → All → Single → Off.
    pub fn cycle(&self) -> RepeatMode {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::Single,
            RepeatMode::Single => RepeatMode::Off,
        }
    }
}

impl FromStr for RepeatMode {
    type Err = PlaybackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "off" => Ok(RepeatMode::Off),
            "all" => Ok(RepeatMode::All),
            "single" => Ok(RepeatMode::Single),
            other => Err(PlaybackError::Internal(format!("unknown repeat mode '{other}'"))),
        }
    }
}

// ============================================================================
// Media Keys
// ============================================================================

/// Hardware or remote-control key routed into the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKey {
    PlayPause,
    HeadsetHook,
    Previous,
    Next,
    Stop,
    Play,
    Pause,
}
