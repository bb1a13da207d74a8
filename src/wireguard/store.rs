//! Backing storage for configuration text
//!
//! The peer manager only ever reads the whole text and writes the whole
//! text back, so a store is a two-method capability. `FileStore` is the
//! real `wg0.conf`; `MemoryStore` is handy for hosts that keep the config
//! elsewhere and for tests.

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

/// Whole-text read/write access to a configuration
#[async_trait]
pub trait PeerStore: Send + Sync {
    /// Read the full configuration text
    async fn read(&self) -> Result<String>;

    /// Replace the full configuration text
    async fn write(&self, contents: &str) -> Result<()>;

    /// Human-readable location for log messages
    fn describe(&self) -> String;
}

/// Configuration file on disk
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store for the file at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// File path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
    }

    /// Write `contents` to `temp` and flush it to disk
    ///
    /// The file carries the interface private key, so it is created
    /// owner-only. When the target already exists its permissions are
    /// copied over instead.
    async fn write_temp(&self, temp: &Path, contents: &str) -> std::io::Result<()> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(temp).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        if let Ok(existing) = tokio::fs::metadata(&self.path).await {
            tokio::fs::set_permissions(temp, existing.permissions()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PeerStore for FileStore {
    async fn read(&self) -> Result<String> {
        debug!("Reading config from {:?}", self.path);
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }

    async fn write(&self, contents: &str) -> Result<()> {
        debug!("Writing {} bytes to {:?}", contents.len(), self.path);

        // Write a sibling file and rename it over the target, so readers
        // see either the old or the new config, never a partial one.
        let temp = self.temp_path();
        let result = match self.write_temp(&temp, contents).await {
            Ok(()) => tokio::fs::rename(&temp, &self.path).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            if let Err(cleanup) = tokio::fs::remove_file(&temp).await {
                debug!("Failed to remove {:?}: {}", temp, cleanup);
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Configuration held in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    contents: RwLock<String>,
}

impl MemoryStore {
    /// Create a store holding `contents`
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: RwLock::new(contents.into()),
        }
    }

    /// Current contents
    pub async fn contents(&self) -> String {
        self.contents.read().await.clone()
    }
}

#[async_trait]
impl PeerStore for MemoryStore {
    async fn read(&self) -> Result<String> {
        Ok(self.contents.read().await.clone())
    }

    async fn write(&self, contents: &str) -> Result<()> {
        *self.contents.write().await = contents.to_string();
        Ok(())
    }

    fn describe(&self) -> String {
        "<memory>".to_string()
    }
}
