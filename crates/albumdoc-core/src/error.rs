//! Errors surfaced by intake and conversion.

use crate::render::RenderError;
use thiserror::Error;

/// Errors that can occur while staging media or converting a session
#[derive(Error, Debug)]
pub enum ConversionError {
    /// Input is not an allow-listed image type, or an unsupported output kind was requested
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),
    /// Conversion requested with nothing staged
    #[error("Nothing to convert")]
    EmptyStaging,
    /// A conversion is already running for this session
    #[error("A conversion is already in progress")]
    Busy,
    /// The renderer could not produce the document
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    /// The document was produced but could not be sent
    #[error("Delivery error: {0}")]
    Delivery(String),
    /// Staging directory or download failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ConversionError {
    /// Whether the failure happened after files were staged and cleanup ran
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Render(_) | Self::Delivery(_))
    }
}
