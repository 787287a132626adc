//! Validation and staging of inbound media
//!
//! [`PhotoIntake`] is the core of the per-batch handler: it decides whether a
//! piece of media is an acceptable image, then downloads a whole batch into
//! the sender's staging directory and appends it to their session in one step.

use crate::aggregator::Batch;
use crate::config::AlbumSettings;
use crate::error::ConversionError;
use crate::session::SessionStore;
use crate::staging::StagingArea;
use crate::transport::{MediaKind, MediaRef, MediaSource};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extension given to compressed photos, which carry no file name
const PHOTO_EXTENSION: &str = "jpg";

/// Outcome of staging one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    /// Files added by this batch
    pub added: usize,
    /// Files staged for the user after this batch
    pub total: usize,
}

/// Validates media and stages batches for their senders
pub struct PhotoIntake {
    source: Arc<dyn MediaSource>,
    staging: StagingArea,
    sessions: Arc<SessionStore>,
    allowed_extensions: HashSet<String>,
}

impl PhotoIntake {
    /// Create an intake with an explicit extension allow-list
    pub fn new(
        source: Arc<dyn MediaSource>,
        staging: StagingArea,
        sessions: Arc<SessionStore>,
        allowed_extensions: HashSet<String>,
    ) -> Self {
        Self {
            source,
            staging,
            sessions,
            allowed_extensions,
        }
    }

    /// Create an intake configured from `settings`
    pub fn from_settings(
        source: Arc<dyn MediaSource>,
        sessions: Arc<SessionStore>,
        settings: &AlbumSettings,
    ) -> Self {
        Self::new(
            source,
            StagingArea::new(&settings.media_dir),
            sessions,
            settings.allowed_extensions(),
        )
    }

    /// Accept photos, and documents whose extension is allow-listed
    ///
    /// # Errors
    ///
    /// Returns `ConversionError::UnsupportedInput` for anything else.
    pub fn check(&self, media: &MediaRef) -> Result<(), ConversionError> {
        match media.kind {
            MediaKind::Photo => Ok(()),
            MediaKind::Document => match media.extension() {
                Some(ext) if self.allowed_extensions.contains(&ext) => Ok(()),
                Some(ext) => Err(ConversionError::UnsupportedInput(format!(
                    ".{ext} files are not supported"
                ))),
                None => Err(ConversionError::UnsupportedInput(
                    "files without an extension are not supported".to_string(),
                )),
            },
        }
    }

    fn extension_for(media: &MediaRef) -> String {
        match media.kind {
            MediaKind::Photo => PHOTO_EXTENSION.to_string(),
            MediaKind::Document => media
                .extension()
                .unwrap_or_else(|| PHOTO_EXTENSION.to_string()),
        }
    }

    /// Download every item of `batch` and append them to the sender's session
    ///
    /// Items are downloaded one by one in batch order while holding the
    /// sender's lock. The session is only touched once all downloads succeed.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedInput` if an item fails [`Self::check`] and
    /// `Storage` if the staging directory or a download fails. In both cases
    /// nothing from this batch remains staged.
    pub async fn stage_batch(
        &self,
        batch: &Batch<MediaRef>,
    ) -> Result<StageReport, ConversionError> {
        let user_id = batch.sender_id;
        for media in &batch.items {
            self.check(media)?;
        }

        let _lock = self.sessions.lock_user(user_id).await;
        self.staging.prepare(user_id).await.map_err(|e| {
            ConversionError::Storage(format!("cannot create staging directory: {e}"))
        })?;

        let mut staged: Vec<PathBuf> = Vec::with_capacity(batch.len());
        for media in &batch.items {
            let destination = self.staging.allocate(user_id, &Self::extension_for(media));
            if let Err(e) = self.source.download(&media.file_ref, &destination).await {
                warn!(user_id, file_ref = %media.file_ref, "Download failed: {e:#}");
                staged.push(destination);
                self.discard(&staged).await;
                return Err(ConversionError::Storage(format!("download failed: {e}")));
            }
            debug!(user_id, path = %destination.display(), "Media staged");
            staged.push(destination);
        }

        let added = staged.len();
        let total = self.sessions.update(user_id, |session| {
            session.files.extend(staged);
            session.files.len()
        });
        info!(
            user_id,
            added,
            total,
            group_id = batch.group_id.as_deref().unwrap_or("-"),
            "Batch staged"
        );
        Ok(StageReport { added, total })
    }

    async fn discard(&self, paths: &[PathBuf]) {
        for path in paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "Failed to discard staged file: {e}"),
            }
        }
    }
}
