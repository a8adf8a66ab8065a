//! HTTP Transfer Abstraction
//!
//! Byte-stream downloads of track files with resume and retry support.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Boxed async reader yielding the body of a transfer.
pub type ByteStream = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Whether to use exponential backoff
    pub use_exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if !self.use_exponential_backoff {
            return self.base_delay;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Async HTTP client used for track transfers.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, RetryPolicy};
///
/// async fn resume(client: &dyn HttpClient, url: &str, have: u64) -> Result<ByteStream> {
///     client.download_stream(url, have, RetryPolicy::default()).await
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Open a streaming GET of `url` starting at byte `offset`.
    ///
    /// Offsets above zero are requested with an HTTP `Range` header; servers
    /// that ignore it return the whole body, which implementations must skip
    /// forward to `offset` before handing the stream out.
    ///
    /// # Errors
    ///
    /// Returns error if the connection cannot be established or the server
    /// answers with a non-success status after `policy` is exhausted.
    async fn download_stream(
        &self,
        url: &str,
        offset: u64,
        policy: RetryPolicy,
    ) -> Result<ByteStream>;
}
