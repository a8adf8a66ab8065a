//! Storage Abstractions
//!
//! File access for the track cache and key-value settings for user
//! preferences and the persisted play queue.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Boxed async writer returned by [`FileSystemAccess::open_append_stream`].
pub type WriteStream = Box<dyn tokio::io::AsyncWrite + Send + Unpin>;

/// File metadata information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// The track cache lives under [`get_cache_directory`](Self::get_cache_directory).
/// Partially downloaded files are appended to while a player may already be
/// reading them, so implementations must not hold exclusive locks.
///
/// - Desktop: `tokio::fs` below the user cache directory
/// - Android: external storage, which may be unmounted at any time
///   (reported through [`is_available`](Self::is_available))
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn cached_size(fs: &dyn FileSystemAccess, path: &Path) -> u64 {
///     fs.metadata(path).await.map(|m| m.size).unwrap_or(0)
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Root directory for cached and saved tracks.
    async fn get_cache_directory(&self) -> Result<PathBuf>;

    /// Whether the cache storage is currently mounted and writable.
    async fn is_available(&self) -> bool {
        self.get_cache_directory().await.is_ok()
    }

    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Atomically move `from` to `to`, replacing `to` if present.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Open `path` for appending, creating it (and its parents) if missing.
    async fn open_append_stream(&self, path: &Path) -> Result<WriteStream>;

    /// Size of `path` in bytes, or 0 when it does not exist.
    async fn file_size(&self, path: &Path) -> u64 {
        match self.metadata(path).await {
            Ok(meta) if !meta.is_directory => meta.size,
            _ => 0,
        }
    }
}

/// Key-value settings storage trait
///
/// Holds playback preferences (repeat mode, shuffle flags) and the
/// JSON-serialized play queue that survives process restarts.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn remember_repeat(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("playback.repeat_mode", "all").await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    struct MissingFs;

    #[async_trait]
    impl FileSystemAccess for MissingFs {
        async fn get_cache_directory(&self) -> Result<PathBuf> {
            Err(BridgeError::NotAvailable("storage unmounted".to_string()))
        }
        async fn exists(&self, _path: &Path) -> Result<bool> {
            Ok(false)
        }
        async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
            Err(BridgeError::Storage(format!("{} missing", path.display())))
        }
        async fn create_dir_all(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
        async fn rename(&self, _from: &Path, _to: &Path) -> Result<()> {
            Ok(())
        }
        async fn delete_file(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
        async fn open_append_stream(&self, _path: &Path) -> Result<WriteStream> {
            Err(BridgeError::NotAvailable("read-only".to_string()))
        }
    }

    #[tokio::test]
    async fn default_helpers_follow_required_methods() {
        let fs = MissingFs;
        assert!(!fs.is_available().await);
        assert_eq!(fs.file_size(Path::new("/cache/a.mp3")).await, 0);
    }
}
