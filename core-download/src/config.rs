//! Download scheduling configuration

use bridge_traits::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Configuration for the download coordinator and its fetch entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Upcoming tracks to fetch beyond the current one.
    #[serde(default = "default_preload_count")]
    pub preload_count: usize,

    /// Capacity of the lookup cache for entries outside both queues.
    #[serde(default = "default_lru_capacity")]
    pub lru_capacity: usize,

    /// Track cache directory, relative to the host cache directory.
    #[serde(default = "default_cache_directory")]
    pub cache_directory: String,

    /// Infix of files still being transferred (`song.partial.mp3`).
    #[serde(default = "default_partial_suffix")]
    pub partial_suffix: String,

    /// Infix of transient cache files (`song.complete.mp3`).
    #[serde(default = "default_complete_suffix")]
    pub complete_suffix: String,

    /// Read buffer size for transfers.
    #[serde(default = "default_transfer_chunk_bytes")]
    pub transfer_chunk_bytes: usize,

    /// Retry policy for opening a transfer.
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

fn default_preload_count() -> usize {
    3
}

fn default_lru_capacity() -> usize {
    100
}

fn default_cache_directory() -> String {
    "music".to_string()
}

fn default_partial_suffix() -> String {
    "partial".to_string()
}

fn default_complete_suffix() -> String {
    "complete".to_string()
}

fn default_transfer_chunk_bytes() -> usize {
    64 * 1024
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            preload_count: default_preload_count(),
            lru_capacity: default_lru_capacity(),
            cache_directory: default_cache_directory(),
            partial_suffix: default_partial_suffix(),
            complete_suffix: default_complete_suffix(),
            transfer_chunk_bytes: default_transfer_chunk_bytes(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl DownloadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metered connections: fetch only the next track ahead.
    pub fn conservative() -> Self {
        Self {
            preload_count: 1,
            ..Self::default()
        }
    }

    /// Fast, unmetered connections.
    pub fn aggressive() -> Self {
        Self {
            preload_count: 10,
            transfer_chunk_bytes: 256 * 1024,
            ..Self::default()
        }
    }

    pub fn with_preload_count(mut self, count: usize) -> Self {
        self.preload_count = count;
        self
    }

    pub fn with_lru_capacity(mut self, capacity: usize) -> Self {
        self.lru_capacity = capacity;
        self
    }

    pub fn with_cache_directory(mut self, dir: impl Into<String>) -> Self {
        self.cache_directory = dir.into();
        self
    }

    pub fn with_transfer_chunk_bytes(mut self, bytes: usize) -> Self {
        self.transfer_chunk_bytes = bytes;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.lru_capacity == 0 {
            return Err("lru_capacity must be at least 1".to_string());
        }

        if self.cache_directory.is_empty() {
            return Err("cache_directory cannot be empty".to_string());
        }

        if self.partial_suffix.is_empty()
            || self.complete_suffix.is_empty()
            || self.partial_suffix == self.complete_suffix
        {
            return Err("partial and complete suffixes must be distinct and non-empty".to_string());
        }

        if self.transfer_chunk_bytes == 0 {
            return Err("transfer_chunk_bytes must be greater than 0".to_string());
        }

        if self.retry_policy.max_attempts == 0 {
            return Err("retry_policy.max_attempts must be at least 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DownloadConfig::default();
        assert_eq!(config.preload_count, 3);
        assert_eq!(config.lru_capacity, 100);
        assert_eq!(config.cache_directory, "music");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn presets_validate() {
        assert_eq!(DownloadConfig::conservative().preload_count, 1);
        assert!(DownloadConfig::aggressive().validate().is_ok());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(DownloadConfig::default().with_lru_capacity(0).validate().is_err());
        assert!(DownloadConfig::default().with_cache_directory("").validate().is_err());

        let mut config = DownloadConfig::default();
        config.complete_suffix = config.partial_suffix.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: DownloadConfig = serde_json::from_str(r#"{"preload_count": 5}"#).unwrap();
        assert_eq!(config.preload_count, 5);
        assert_eq!(config.lru_capacity, 100);
        assert_eq!(config.transfer_chunk_bytes, 64 * 1024);
    }
}
