//! Transient staging files.
//!
//! A [`StagingFile`] owns a path in the staging directory. Callers remove it
//! with [`StagingFile::remove`]; if the guard is dropped without that (an
//! internal error or a panic) the file is removed synchronously on drop.

use chrono::Local;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Extensions accepted from provider file names
const MAX_EXTENSION_LEN: usize = 8;

/// Scoped owner of one staging path
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
}

impl StagingFile {
    /// Reserve a unique path for file `index` of a request.
    ///
    /// The name combines a timestamp, the per-file index and a random suffix,
    /// so concurrently active jobs never collide. The file itself is created
    /// by the download.
    ///
    /// # Errors
    ///
    /// Returns an error if the staging directory cannot be created.
    pub async fn reserve(
        dir: &Path,
        prefix: &str,
        index: usize,
        extension: &str,
    ) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S_%6f");
        let suffix = Uuid::new_v4().as_simple().to_string();
        let file_name = format!(
            "{prefix}_{timestamp}_{index}_{}.{extension}",
            &suffix[..8]
        );
        let path = dir.join(file_name);
        debug!(path = %path.display(), "Reserved staging path");

        Ok(Self { path })
    }

    /// Staged path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the staged file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing.
    pub async fn size(&self) -> std::io::Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }

    /// Remove the file now and surface the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn remove(mut self) -> std::io::Result<()> {
        // An empty path disarms the Drop fallback
        let path = std::mem::take(&mut self.path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed staging file on drop"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove staging file"),
        }
    }
}

/// File extension to stage a download under.
///
/// Uses the extension of `name` when it looks sane, otherwise `fallback`.
#[must_use]
pub fn staging_extension(name: &str, fallback: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map_or_else(|| fallback.to_string(), str::to_lowercase)
}
