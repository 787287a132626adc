//! Ports implemented by the messaging transport
//!
//! The core never talks to a messaging API directly. A transport provides a
//! [`MediaSource`] to fetch what users sent and a [`DocumentSink`] to hand the
//! finished document back.

use async_trait::async_trait;
use std::path::Path;

/// Kind of media a message carried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Compressed photo, always an image
    Photo,
    /// File upload; must pass the extension allow-list
    Document,
}

/// Reference to downloadable media, as carried by an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// Transport-specific file reference
    pub file_ref: String,
    /// Original file name, if the client sent one
    pub file_name: Option<String>,
    /// Photo or document
    pub kind: MediaKind,
    /// Size in bytes, if known
    pub size: Option<u64>,
}

impl MediaRef {
    /// A compressed photo
    pub fn photo(file_ref: impl Into<String>) -> Self {
        Self {
            file_ref: file_ref.into(),
            file_name: None,
            kind: MediaKind::Photo,
            size: None,
        }
    }

    /// A file upload
    pub fn document(file_ref: impl Into<String>, file_name: Option<String>) -> Self {
        Self {
            file_ref: file_ref.into(),
            file_name,
            kind: MediaKind::Document,
            size: None,
        }
    }

    /// Lowercase extension of the original file name
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|ext| !ext.is_empty())
    }
}

/// Download capability of the message source
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Download `file_ref` into `destination`
    async fn download(&self, file_ref: &str, destination: &Path) -> anyhow::Result<()>;
}

/// Delivery of finished documents
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Send `document` to `chat_id` under `file_name`
    async fn deliver(&self, chat_id: i64, document: &Path, file_name: &str) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension() {
        let doc = MediaRef::document("f1", Some("Scan.JPEG".to_string()));
        assert_eq!(doc.extension().as_deref(), Some("jpeg"));

        let no_ext = MediaRef::document("f2", Some("README".to_string()));
        assert_eq!(no_ext.extension(), None);

        assert_eq!(MediaRef::photo("f3").extension(), None);
    }
}
