//! # Playback Configuration
//!
//! Tuning knobs for buffering, gapless handoff and queue behaviour.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Seconds treated as "the whole track" when `buffer_length_secs` is 0.
const WHOLE_TRACK_SECS: u64 = 86_400;

/// Playback coordinator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Prepare a second player for the successor and chain it.
    ///
    /// Default: true.
    #[serde(default = "default_gapless_enabled")]
    pub gapless_enabled: bool,

    /// Seconds of audio that must be on disk ahead of the play position
    /// before a partially downloaded track starts. 0 waits for the whole track.
    ///
    /// Default: 5.
    #[serde(default = "default_buffer_length_secs")]
    pub buffer_length_secs: u64,

    /// Lower bound for the buffer target, in bytes.
    ///
    /// Default: 100 000.
    #[serde(default = "default_min_buffer_bytes")]
    pub min_buffer_bytes: u64,

    /// A completion reported earlier than `duration - tolerance` is treated
    /// as a buffer underrun rather than the end of the track.
    ///
    /// Default: 1000 ms.
    #[serde(default = "default_early_completion_tolerance_ms")]
    pub early_completion_tolerance_ms: u64,

    /// `previous()` restarts the current track past this position.
    ///
    /// Default: 5000 ms.
    #[serde(default = "default_restart_threshold_ms")]
    pub restart_threshold_ms: u64,

    /// Interval of the buffering wait loop.
    #[serde(default = "default_buffer_poll_interval")]
    pub buffer_poll_interval: Duration,

    /// Delay before the first successor readiness check.
    #[serde(default = "default_successor_initial_delay")]
    pub successor_initial_delay: Duration,

    /// Interval of the successor readiness loop.
    #[serde(default = "default_successor_poll_interval")]
    pub successor_poll_interval: Duration,

    /// Interval of the position sampler while playing.
    #[serde(default = "default_position_poll_interval")]
    pub position_poll_interval: Duration,

    /// Target length of the endless shuffle queue.
    ///
    /// Default: 20.
    #[serde(default = "default_shuffle_queue_length")]
    pub shuffle_queue_length: usize,

    /// Entries kept before the current one when the shuffle window shifts.
    ///
    /// Default: 2.
    #[serde(default = "default_shuffle_lookback")]
    pub shuffle_lookback: usize,

    /// Empty the queue when playback runs off its end with repeat off.
    #[serde(default)]
    pub clear_playlist_on_end: bool,

    /// Delete a track's server bookmark once it plays to completion.
    #[serde(default = "default_clear_bookmark_on_completion")]
    pub clear_bookmark_on_completion: bool,

    /// Report now-playing and completed tracks to the music service.
    #[serde(default)]
    pub scrobble_enabled: bool,

    /// URI prefix of tracks played through the external streaming SDK.
    #[serde(default = "default_streaming_uri_scheme")]
    pub streaming_uri_scheme: String,

    /// Bitrate assumed for tracks without one, in kbit/s.
    #[serde(default = "default_fallback_bitrate_kbps")]
    pub fallback_bitrate_kbps: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            gapless_enabled: default_gapless_enabled(),
            buffer_length_secs: default_buffer_length_secs(),
            min_buffer_bytes: default_min_buffer_bytes(),
            early_completion_tolerance_ms: default_early_completion_tolerance_ms(),
            restart_threshold_ms: default_restart_threshold_ms(),
            buffer_poll_interval: default_buffer_poll_interval(),
            successor_initial_delay: default_successor_initial_delay(),
            successor_poll_interval: default_successor_poll_interval(),
            position_poll_interval: default_position_poll_interval(),
            shuffle_queue_length: default_shuffle_queue_length(),
            shuffle_lookback: default_shuffle_lookback(),
            clear_playlist_on_end: false,
            clear_bookmark_on_completion: default_clear_bookmark_on_completion(),
            scrobble_enabled: false,
            streaming_uri_scheme: default_streaming_uri_scheme(),
            fallback_bitrate_kbps: default_fallback_bitrate_kbps(),
        }
    }
}

impl PlaybackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start only once the whole track is on disk and skip the second player.
    ///
    /// - No partial-file playback
    /// - Gapless handoff disabled
    pub fn conservative() -> Self {
        Self {
            gapless_enabled: false,
            buffer_length_secs: 0,
            ..Self::default()
        }
    }

    /// Start as early as possible.
    pub fn low_latency() -> Self {
        Self {
            buffer_length_secs: 2,
            min_buffer_bytes: 32 * 1024,
            successor_initial_delay: Duration::from_secs(1),
            ..Self::default()
        }
    }

    pub fn with_gapless(mut self, enabled: bool) -> Self {
        self.gapless_enabled = enabled;
        self
    }

    pub fn with_buffer_length_secs(mut self, secs: u64) -> Self {
        self.buffer_length_secs = secs;
        self
    }

    pub fn with_clear_playlist_on_end(mut self, enabled: bool) -> Self {
        self.clear_playlist_on_end = enabled;
        self
    }

    pub fn with_clear_bookmark_on_completion(mut self, enabled: bool) -> Self {
        self.clear_bookmark_on_completion = enabled;
        self
    }

    pub fn with_scrobbling(mut self, enabled: bool) -> Self {
        self.scrobble_enabled = enabled;
        self
    }

    pub fn with_shuffle_queue_length(mut self, length: usize) -> Self {
        self.shuffle_queue_length = length;
        self
    }

    pub fn with_streaming_uri_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.streaming_uri_scheme = scheme.into();
        self
    }

    /// Buffer window in seconds, resolving 0 to the whole track.
    pub fn effective_buffer_secs(&self) -> u64 {
        if self.buffer_length_secs == 0 {
            WHOLE_TRACK_SECS
        } else {
            self.buffer_length_secs
        }
    }

    /// Bytes that must be on disk before playing a partial file from `position_ms`.
    ///
    /// The byte offset of the position plus a buffer window, both derived
    /// from the bitrate, capped at the expected file size when known.
    pub fn buffer_target_bytes(
        &self,
        bitrate_kbps: Option<u32>,
        position_ms: u64,
        expected_bytes: Option<u64>,
    ) -> u64 {
        let bitrate = u64::from(bitrate_kbps.unwrap_or(self.fallback_bitrate_kbps));
        let offset = position_ms.saturating_mul(bitrate) / 8;
        let window = (bitrate * 1024 / 8).saturating_mul(self.effective_buffer_secs());
        let target = offset.saturating_add(window.max(self.min_buffer_bytes));

        match expected_bytes {
            Some(expected) if expected > 0 => target.min(expected),
            _ => target,
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_poll_interval.is_zero()
            || self.successor_poll_interval.is_zero()
            || self.position_poll_interval.is_zero()
        {
            return Err("poll intervals must be greater than 0".to_string());
        }

        if self.shuffle_queue_length == 0 {
            return Err("shuffle_queue_length must be > 0".to_string());
        }

        if self.shuffle_lookback >= self.shuffle_queue_length {
            return Err("shuffle_lookback must be smaller than shuffle_queue_length".to_string());
        }

        if self.streaming_uri_scheme.is_empty() {
            return Err("streaming_uri_scheme cannot be empty".to_string());
        }

        if self.fallback_bitrate_kbps == 0 {
            return Err("fallback_bitrate_kbps must be > 0".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_gapless_enabled() -> bool {
    true
}

fn default_buffer_length_secs() -> u64 {
    5
}

fn default_min_buffer_bytes() -> u64 {
    100_000
}

fn default_early_completion_tolerance_ms() -> u64 {
    1000
}

fn default_restart_threshold_ms() -> u64 {
    5000
}

fn default_buffer_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_successor_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_successor_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_position_poll_interval() -> Duration {
    Duration::from_millis(25)
}

fn default_shuffle_queue_length() -> usize {
    20
}

fn default_shuffle_lookback() -> usize {
    2
}

fn default_clear_bookmark_on_completion() -> bool {
    true
}

fn default_streaming_uri_scheme() -> String {
    "spotify:".to_string()
}

fn default_fallback_bitrate_kbps() -> u32 {
    160
}
