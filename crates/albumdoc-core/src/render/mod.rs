//! Image to document rendering
//!
//! A [`Renderer`] turns an ordered list of image files into one document.
//! [`DocumentRenderer`] is the production implementation: every input is
//! decoded up front (an undecodable file fails the whole render before any
//! output is written), then the document is assembled on the blocking pool.

mod docx;
mod pdf;

use crate::output::OutputKind;
use async_trait::async_trait;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors that can occur while rendering a document
#[derive(Error, Debug)]
pub enum RenderError {
    /// Render called with an empty input list
    #[error("No images to render")]
    NoInput,
    /// An input could not be decoded as an image
    #[error("Cannot decode {}: {reason}", path.display())]
    UnsupportedInput {
        /// Offending file
        path: PathBuf,
        /// Decoder message
        reason: String,
    },
    /// Document assembly or encoding failed
    #[error("Failed to encode {kind} document: {reason}")]
    Encode {
        /// Kind being produced
        kind: OutputKind,
        /// Encoder message
        reason: String,
    },
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The blocking render task panicked or was cancelled
    #[error("Render task failed: {0}")]
    Task(String),
}

/// Interface for document renderers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `inputs`, in order, into a single `kind` document at `output`
    async fn render(
        &self,
        inputs: &[PathBuf],
        kind: OutputKind,
        output: &Path,
    ) -> Result<(), RenderError>;
}

/// Renders PDF (via `lopdf`) and DOCX (via `docx-rs`) documents
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentRenderer;

impl DocumentRenderer {
    /// Create a renderer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Synchronous render, used on the blocking pool
    ///
    /// # Errors
    ///
    /// Returns an error if an input cannot be decoded or the document cannot be written.
    pub fn render_blocking(
        inputs: &[PathBuf],
        kind: OutputKind,
        output: &Path,
    ) -> Result<(), RenderError> {
        if inputs.is_empty() {
            return Err(RenderError::NoInput);
        }
        let images = inputs
            .iter()
            .map(|path| decode(path))
            .collect::<Result<Vec<_>, _>>()?;

        match kind {
            OutputKind::Pdf => pdf::write_pdf(&images, output),
            OutputKind::Docx => docx::write_docx(&images, output),
        }
    }
}

#[async_trait]
impl Renderer for DocumentRenderer {
    async fn render(
        &self,
        inputs: &[PathBuf],
        kind: OutputKind,
        output: &Path,
    ) -> Result<(), RenderError> {
        let inputs = inputs.to_vec();
        let target = output.to_path_buf();
        let pages = inputs.len();

        tokio::task::spawn_blocking(move || Self::render_blocking(&inputs, kind, &target))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))??;

        info!(pages, %kind, output = %output.display(), "Document rendered");
        Ok(())
    }
}

/// Decode an image, detecting the format from its content
fn decode(path: &Path) -> Result<DynamicImage, RenderError> {
    let bytes = std::fs::read(path)?;
    image::load_from_memory(&bytes).map_err(|e| RenderError::UnsupportedInput {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::write_test_image;

    #[tokio::test]
    async fn test_pdf_has_one_page_per_image() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let inputs = vec![
            write_test_image(tmp.path(), "a.jpg", 40, 30)?,
            write_test_image(tmp.path(), "b.png", 20, 60)?,
            write_test_image(tmp.path(), "c.jpg", 10, 10)?,
        ];
        let output = tmp.path().join("out.pdf");

        DocumentRenderer::new()
            .render(&inputs, OutputKind::Pdf, &output)
            .await?;

        let bytes = std::fs::read(&output)?;
        assert!(bytes.starts_with(b"%PDF-"));
        let document = lopdf::Document::load(&output)?;
        assert_eq!(document.get_pages().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_docx_is_a_zip_package() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let inputs = vec![
            write_test_image(tmp.path(), "a.jpg", 40, 30)?,
            write_test_image(tmp.path(), "b.png", 30, 40)?,
        ];
        let output = tmp.path().join("out.docx");

        DocumentRenderer::new()
            .render(&inputs, OutputKind::Docx, &output)
            .await?;

        let bytes = std::fs::read(&output)?;
        assert!(bytes.starts_with(b"PK"));
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_input_is_rejected_before_writing() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let good = write_test_image(tmp.path(), "good.jpg", 10, 10)?;
        let corrupt = tmp.path().join("corrupt.jpg");
        std::fs::write(&corrupt, b"definitely not a jpeg")?;
        let output = tmp.path().join("out.pdf");

        let result = DocumentRenderer::new()
            .render(&[good, corrupt.clone()], OutputKind::Pdf, &output)
            .await;

        match result {
            Err(RenderError::UnsupportedInput { path, .. }) => assert_eq!(path, corrupt),
            other => panic!("expected UnsupportedInput, got {other:?}"),
        }
        assert!(!output.exists());
        Ok(())
    }

    #[test]
    fn test_empty_input() {
        let result = DocumentRenderer::render_blocking(&[], OutputKind::Pdf, Path::new("x.pdf"));
        assert!(matches!(result, Err(RenderError::NoInput)));
    }
}
