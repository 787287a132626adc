//! Conversion trigger and cancellation
//!
//! Turns a user's staged files into one document, delivers it and releases
//! the staging area. Once a conversion has started the staged files are
//! removed whatever happens next. The directory is purged once rendering and
//! delivery return, and [`ConversionGuard`] resets the session (and, after a
//! panic, removes the directory) when it goes out of scope.

use crate::config::AlbumSettings;
use crate::error::ConversionError;
use crate::output::{output_file_name, OutputKind};
use crate::render::Renderer;
use crate::session::SessionStore;
use crate::staging::{StagingArea, StagingGuard};
use crate::transport::DocumentSink;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What to convert and where to send it
#[derive(Debug, Clone)]
pub struct ConversionTarget {
    /// Owner of the staged files
    pub user_id: i64,
    /// Chat that receives the document
    pub chat_id: i64,
    /// Kind requested with the command, overriding the session preference
    pub kind: Option<OutputKind>,
    /// Name used when the user has not chosen one (e.g. their display name)
    pub fallback_name: Option<String>,
}

/// Result of a delivered conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    /// Kind produced
    pub kind: OutputKind,
    /// File name the document was delivered under
    pub file_name: String,
    /// Number of images in the document
    pub pages: usize,
}

/// Releases a user's staging directory and resets their session on drop
struct ConversionGuard {
    user_id: i64,
    keep_preferences: bool,
    sessions: Arc<SessionStore>,
    staging: StagingGuard,
}

impl Drop for ConversionGuard {
    fn drop(&mut self) {
        self.sessions.reset(self.user_id, self.keep_preferences);
    }
}

/// Runs conversions and cancellations for all users
pub struct ConversionTrigger {
    sessions: Arc<SessionStore>,
    staging: StagingArea,
    renderer: Arc<dyn Renderer>,
    sink: Arc<dyn DocumentSink>,
    settings: Arc<AlbumSettings>,
}

impl ConversionTrigger {
    /// Create a trigger
    pub fn new(
        sessions: Arc<SessionStore>,
        staging: StagingArea,
        renderer: Arc<dyn Renderer>,
        sink: Arc<dyn DocumentSink>,
        settings: Arc<AlbumSettings>,
    ) -> Self {
        Self {
            sessions,
            staging,
            renderer,
            sink,
            settings,
        }
    }

    /// Resolve the output kind: command argument, then session preference, then default
    fn resolve_kind(
        &self,
        requested: Option<OutputKind>,
        preferred: Option<OutputKind>,
    ) -> Result<OutputKind, ConversionError> {
        let kind = requested
            .or(preferred)
            .unwrap_or(self.settings.default_output_kind);
        if self.settings.supported_output_kinds().contains(&kind) {
            Ok(kind)
        } else {
            Err(ConversionError::UnsupportedInput(format!(
                "{kind} output is not enabled"
            )))
        }
    }

    /// Convert the user's staged files and deliver the document
    ///
    /// # Errors
    ///
    /// - `Busy` if a conversion is already running for the user
    /// - `EmptyStaging` if nothing is staged
    /// - `UnsupportedInput` if the resolved kind is not enabled
    ///
    /// None of the above touch the session. `Render` and `Delivery` are
    /// returned after the staged files have been removed.
    pub async fn convert(
        &self,
        target: ConversionTarget,
    ) -> Result<ConversionReport, ConversionError> {
        let user_id = target.user_id;

        // Check and claim in one read-modify-write so two convert commands cannot both pass
        let claimed = self.sessions.update(user_id, |session| {
            if session.busy {
                return Err(ConversionError::Busy);
            }
            if session.files.is_empty() {
                return Err(ConversionError::EmptyStaging);
            }
            let kind = self.resolve_kind(target.kind, session.output_kind)?;
            session.busy = true;
            Ok((kind, session.output_name.clone()))
        });
        let (kind, chosen_name) = claimed?;

        let _lock = self.sessions.lock_user(user_id).await;
        let mut guard = ConversionGuard {
            user_id,
            keep_preferences: self.settings.keep_output_name,
            sessions: Arc::clone(&self.sessions),
            staging: self.staging.guard(user_id),
        };

        let result = self
            .render_and_deliver(&target, kind, chosen_name.as_deref())
            .await;

        match self.staging.purge(user_id).await {
            Ok(()) => guard.staging.disarm(),
            Err(e) => warn!(user_id, "Failed to purge staging after conversion: {e}"),
        }
        result
    }

    async fn render_and_deliver(
        &self,
        target: &ConversionTarget,
        kind: OutputKind,
        chosen_name: Option<&str>,
    ) -> Result<ConversionReport, ConversionError> {
        let user_id = target.user_id;

        // Snapshot after the lock so batches that finished staging meanwhile are included
        let files = self.sessions.get(user_id).files;
        if files.is_empty() {
            return Err(ConversionError::EmptyStaging);
        }

        let file_name = output_file_name(
            chosen_name,
            target.fallback_name.as_deref(),
            self.settings.default_output_name.as_deref(),
            kind,
        );
        let output = self
            .staging
            .user_dir(user_id)
            .join(format!("{}.{}", Uuid::new_v4().as_simple(), kind.extension()));

        info!(user_id, pages = files.len(), %kind, %file_name, "Converting");
        if let Err(e) = self.renderer.render(&files, kind, &output).await {
            warn!(user_id, %kind, "Render failed: {e}");
            return Err(e.into());
        }

        if let Err(e) = self.sink.deliver(target.chat_id, &output, &file_name).await {
            error!(user_id, %file_name, "Delivery failed: {e:#}");
            return Err(ConversionError::Delivery(e.to_string()));
        }

        info!(user_id, %file_name, "Document delivered");
        Ok(ConversionReport {
            kind,
            file_name,
            pages: files.len(),
        })
    }

    /// Discard everything the user has staged
    ///
    /// Returns the number of discarded files.
    ///
    /// # Errors
    ///
    /// Returns `Busy` while a conversion is running and `Storage` if the
    /// staging directory cannot be removed. The session is reset either way.
    pub async fn cancel(&self, user_id: i64) -> Result<usize, ConversionError> {
        if self.sessions.get(user_id).busy {
            return Err(ConversionError::Busy);
        }

        let _lock = self.sessions.lock_user(user_id).await;
        let session = self.sessions.get(user_id);
        // A convert may have claimed the session while we waited for the lock
        if session.busy {
            return Err(ConversionError::Busy);
        }
        let discarded = session.files.len();
        let purged = self.staging.purge(user_id).await;
        self.sessions.reset(user_id, self.settings.keep_output_name);

        purged.map_err(|e| ConversionError::Storage(format!("cannot remove staged files: {e}")))?;
        info!(user_id, discarded, "Staged files discarded");
        Ok(discarded)
    }

    /// Remember the file name for the user's next document
    pub fn set_output_name(&self, user_id: i64, name: Option<String>) {
        let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        self.sessions.update(user_id, |session| session.output_name = name);
    }

    /// Remember the output kind for the user's next document
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedInput` if `kind` is not enabled.
    pub fn set_output_kind(&self, user_id: i64, kind: OutputKind) -> Result<(), ConversionError> {
        let kind = self.resolve_kind(Some(kind), None)?;
        self.sessions.update(user_id, |session| session.output_kind = Some(kind));
        Ok(())
    }

    /// Whether a conversion is running for the user
    #[must_use]
    pub fn is_busy(&self, user_id: i64) -> bool {
        self.sessions.get(user_id).busy
    }
}
