//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{ByteStream, HttpClient, RetryPolicy},
};
use futures_util::TryStreamExt;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Reqwest-based track transfer client
///
/// - Connection pooling via reqwest
/// - Resume through `Range` requests
/// - Retry with exponential backoff on connection errors, 5xx and 429
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Client with a 10 s connect timeout and no overall timeout, since track
    /// bodies can take minutes to arrive.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .user_agent(concat!("playback-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn is_retryable_status(status: StatusCode) -> bool {
        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
    }

    async fn send_once(&self, url: &str, offset: u64) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(header::RANGE, format!("bytes={}-", offset));
        }

        request.send().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::OperationFailed("Request timed out".to_string())
            } else if e.is_connect() {
                BridgeError::OperationFailed(format!("Connection failed: {}", e))
            } else {
                BridgeError::OperationFailed(e.to_string())
            }
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn download_stream(
        &self,
        url: &str,
        offset: u64,
        policy: RetryPolicy,
    ) -> Result<ByteStream> {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < policy.max_attempts {
            attempt += 1;
            debug!(attempt, max_attempts = policy.max_attempts, offset, "Opening transfer");

            match self.send_once(url, offset).await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::RANGE_NOT_SATISFIABLE && offset > 0 {
                        // Nothing left past the resume point.
                        return Ok(Box::new(tokio::io::empty()));
                    }

                    if status.is_success() {
                        let body = response.bytes_stream().map_err(std::io::Error::other);
                        let mut reader = tokio_util::io::StreamReader::new(body);

                        if offset > 0 && status != StatusCode::PARTIAL_CONTENT {
                            debug!(offset, "Server ignored Range header, skipping prefix");
                            tokio::io::copy(&mut (&mut reader).take(offset), &mut tokio::io::sink())
                                .await?;
                        }
                        return Ok(Box::new(reader));
                    }

                    if !Self::is_retryable_status(status) {
                        return Err(BridgeError::Remote {
                            code: i32::from(status.as_u16()),
                            message: status
                                .canonical_reason()
                                .unwrap_or("HTTP error")
                                .to_string(),
                        });
                    }

                    warn!(status = status.as_u16(), attempt, "Transfer failed with retryable status");
                    last_error = Some(BridgeError::OperationFailed(format!("HTTP {} error", status)));
                }
                Err(e) => {
                    warn!(error = %e, attempt, "Transfer request failed");
                    last_error = Some(e);
                }
            }

            if attempt < policy.max_attempts {
                let delay = policy.delay_for(attempt);
                debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
                sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BridgeError::OperationFailed("All retry attempts exhausted".to_string())
        }))
    }
}
