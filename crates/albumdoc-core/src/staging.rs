//! Per-user staging directories
//!
//! Downloaded media and rendered documents live under `<root>/<user_id>/`
//! until the session reaches a terminal transition, at which point the whole
//! directory is removed.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Root of all per-user staging directories
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Staging rooted at `root`; nothing is created until [`Self::prepare`]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory owned by `user_id`
    #[must_use]
    pub fn user_dir(&self, user_id: i64) -> PathBuf {
        self.root.join(user_id.to_string())
    }

    /// Create the user's directory if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn prepare(&self, user_id: i64) -> io::Result<PathBuf> {
        let dir = self.user_dir(user_id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Fresh, collision-free path for a staged file
    #[must_use]
    pub fn allocate(&self, user_id: i64, extension: &str) -> PathBuf {
        let name = Uuid::new_v4().as_simple().to_string();
        let extension = extension.trim_start_matches('.');
        if extension.is_empty() {
            self.user_dir(user_id).join(name)
        } else {
            self.user_dir(user_id).join(format!("{name}.{extension}"))
        }
    }

    /// Remove the user's directory and everything in it. Missing is fine.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub async fn purge(&self, user_id: i64) -> io::Result<()> {
        let dir = self.user_dir(user_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(user_id, dir = %dir.display(), "Staging directory removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Remove per-user directories left behind by a previous process
    ///
    /// Only entries named like a user id are touched; anything else under
    /// the root is left alone. Returns the number of directories removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be listed or an entry cannot be removed.
    pub async fn purge_stale(&self) -> io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let Some(user_id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<i64>().ok())
            else {
                continue;
            };
            if entry.file_type().await?.is_dir() {
                self.purge(user_id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Guard that removes the user's directory when dropped
    #[must_use]
    pub fn guard(&self, user_id: i64) -> StagingGuard {
        StagingGuard {
            dir: self.user_dir(user_id),
            armed: true,
        }
    }
}

/// Removes a staging directory on every exit path, including errors and panics
///
/// The removal in `Drop` is blocking. Callers on the async path purge with
/// [`StagingArea::purge`] first and then [`StagingGuard::disarm`] the guard.
#[derive(Debug)]
pub struct StagingGuard {
    dir: PathBuf,
    armed: bool,
}

impl StagingGuard {
    /// Directory released by this guard
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The directory has been released already; do nothing on drop
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(dir = %self.dir.display(), "Staging directory released"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(dir = %self.dir.display(), "Failed to release staging directory: {e}");
            }
        }
    }
}
