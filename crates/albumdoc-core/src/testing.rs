//! Testing helpers and mock utilities.
//!
//! Provides sample images and convenient constructors for mocked transport
//! ports and renderers.

use crate::render::MockRenderer;
use crate::transport::{MockDocumentSink, MockMediaSource};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Write a small gradient image to `dir/name`.
///
/// The format follows the extension of `name` (`.jpg`, `.png`, ...).
///
/// # Errors
///
/// Returns an error if the image cannot be encoded or written.
pub fn write_test_image(
    dir: &Path,
    name: &str,
    width: u32,
    height: u32,
) -> anyhow::Result<PathBuf> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            u8::try_from(x % 256).unwrap_or(0),
            u8::try_from(y % 256).unwrap_or(0),
            128,
        ])
    });
    let path = dir.join(name);
    image.save(&path)?;
    Ok(path)
}

/// Create a mock media source that writes a valid JPEG for every download.
///
/// # Example
///
/// ```rust,ignore
/// use albumdoc_core::testing::mock_source_writing_images;
///
/// let source = mock_source_writing_images();
/// // Every download now succeeds and leaves a decodable image behind
/// ```
#[must_use]
pub fn mock_source_writing_images() -> MockMediaSource {
    let mut source = MockMediaSource::new();
    source.expect_download().returning(|_, destination| {
        let dir = destination
            .parent()
            .ok_or_else(|| anyhow::anyhow!("destination has no parent"))?;
        let name = destination
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("destination has no file name"))?;
        // Staged photos carry `.jpg`; anything else is written as PNG
        let target = if name.ends_with(".jpg") || name.ends_with(".jpeg") {
            name.to_string()
        } else {
            format!("{name}.png")
        };
        let written = write_test_image(dir, &target, 8, 8)?;
        if written != destination {
            std::fs::rename(&written, destination)?;
        }
        Ok(())
    });
    source
}

/// Create a mock renderer that writes a placeholder file and succeeds.
#[must_use]
pub fn mock_renderer_ok() -> MockRenderer {
    let mut renderer = MockRenderer::new();
    renderer.expect_render().returning(|_, _, output| {
        std::fs::write(output, b"rendered")?;
        Ok(())
    });
    renderer
}

/// Create a mock sink that accepts every delivery.
#[must_use]
pub fn mock_sink_ok() -> MockDocumentSink {
    let mut sink = MockDocumentSink::new();
    sink.expect_deliver().returning(|_, _, _| Ok(()));
    sink
}
