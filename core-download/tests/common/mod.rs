//! Shared in-memory collaborators for download integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    ByteStream, FileMetadata, FileSystemAccess, HttpClient, RetryPolicy, SystemClock, Track,
    WriteStream,
};
use core_download::{DownloadConfig, DownloadCoordinator, FetchContext, FetchNotice};
use core_runtime::events::EventBus;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

pub const CACHE_ROOT: &str = "/cache";

// ============================================================================
// File system
// ============================================================================

type Files = Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>;

/// Flat in-memory file map; directories are implicit.
#[derive(Clone, Default)]
pub struct MemoryFs {
    files: Files,
    unavailable: Arc<AtomicBool>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: impl Into<PathBuf>, data: &[u8]) {
        self.files.lock().insert(path.into(), data.to_vec());
    }

    pub fn read(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }

    pub fn has(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }
}

struct MemoryWriter {
    files: Files,
    path: PathBuf,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.files
            .lock()
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl FileSystemAccess for MemoryFs {
    async fn get_cache_directory(&self) -> BridgeResult<PathBuf> {
        Ok(PathBuf::from(CACHE_ROOT))
    }

    async fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    async fn exists(&self, path: &Path) -> BridgeResult<bool> {
        Ok(self.has(path))
    }

    async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata> {
        self.files
            .lock()
            .get(path)
            .map(|data| FileMetadata {
                size: data.len() as u64,
                modified_at: None,
                is_directory: false,
            })
            .ok_or_else(|| BridgeError::Storage(format!("{} not found", path.display())))
    }

    async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> BridgeResult<()> {
        let mut files = self.files.lock();
        let data = files
            .remove(from)
            .ok_or_else(|| BridgeError::Storage(format!("{} not found", from.display())))?;
        files.insert(to.to_path_buf(), data);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> BridgeResult<()> {
        self.files.lock().remove(path);
        Ok(())
    }

    async fn open_append_stream(&self, path: &Path) -> BridgeResult<WriteStream> {
        self.files.lock().entry(path.to_path_buf()).or_default();
        Ok(Box::new(MemoryWriter {
            files: Arc::clone(&self.files),
            path: path.to_path_buf(),
        }))
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Serves registered bodies, honouring the resume offset.
///
/// Held URLs hand out a stream that stays open until [`ScriptedHttp::release`].
#[derive(Clone, Default)]
pub struct ScriptedHttp {
    bodies: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    held: Arc<Mutex<HashSet<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    pending: Arc<Mutex<HashMap<String, (DuplexStream, Vec<u8>)>>>,
    requests: Arc<Mutex<Vec<(String, u64)>>>,
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: Vec<u8>) {
        self.bodies.lock().insert(url.to_string(), body);
    }

    pub fn hold(&self, url: &str) {
        self.held.lock().insert(url.to_string());
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().insert(url.to_string());
    }

    pub fn heal(&self, url: &str) {
        self.failing.lock().remove(url);
    }

    /// Let a held transfer run to completion.
    pub fn release(&self, url: &str) {
        self.held.lock().remove(url);
        if let Some((mut writer, data)) = self.pending.lock().remove(url) {
            tokio::spawn(async move {
                let _ = writer.write_all(&data).await;
            });
        }
    }

    pub fn requests(&self) -> Vec<(String, u64)> {
        self.requests.lock().clone()
    }

    pub fn requested(&self, url: &str) -> bool {
        self.requests.lock().iter().any(|(u, _)| u == url)
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn download_stream(&self, url: &str, offset: u64, _policy: RetryPolicy) -> BridgeResult<ByteStream> {
        self.requests.lock().push((url.to_string(), offset));

        if self.failing.lock().contains(url) {
            return Err(BridgeError::OperationFailed(format!("connection reset: {url}")));
        }

        let body = self
            .bodies
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| BridgeError::Remote {
                code: 404,
                message: "not found".to_string(),
            })?;
        let remaining = body.get(offset as usize..).unwrap_or_default().to_vec();

        if self.held.lock().contains(url) {
            let (reader, writer) = tokio::io::duplex(1024 * 1024);
            self.pending.lock().insert(url.to_string(), (writer, remaining));
            return Ok(Box::new(reader));
        }

        Ok(Box::new(io::Cursor::new(remaining)))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub fn track(id: &str, size: usize) -> Track {
    Track::new(id, format!("Song {id}"), format!("http://music.test/stream/{id}"))
        .with_artist("Artist")
        .with_album("Album")
        .with_size_bytes(size as u64)
}

pub fn body(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

pub struct Harness {
    pub fs: MemoryFs,
    pub http: ScriptedHttp,
    pub events: EventBus,
    pub notices: mpsc::UnboundedReceiver<FetchNotice>,
    pub downloads: DownloadCoordinator,
}

impl Harness {
    pub fn new(config: DownloadConfig) -> Self {
        let fs = MemoryFs::new();
        let http = ScriptedHttp::new();
        let events = EventBus::new(64);
        let (ctx, notices) = FetchContext::new(
            Arc::new(fs.clone()),
            Arc::new(http.clone()),
            Arc::new(SystemClock),
            events.clone(),
            config,
        )
        .expect("valid config");

        Self {
            fs,
            http,
            events,
            notices,
            downloads: DownloadCoordinator::new(ctx),
        }
    }

    /// Register a track body with the HTTP fake and return the track.
    pub fn track(&self, id: &str, size: usize) -> Track {
        let track = track(id, size);
        self.http.serve(&track.stream_uri, body(size));
        track
    }

    pub async fn next_notice(&mut self) -> FetchNotice {
        tokio::time::timeout(Duration::from_secs(5), self.notices.recv())
            .await
            .expect("timed out waiting for fetch notice")
            .expect("notice channel closed")
    }
}
