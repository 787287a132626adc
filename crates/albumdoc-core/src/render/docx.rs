//! DOCX assembly: A4 with narrow margins, one full-width picture per paragraph

use super::RenderError;
use crate::output::OutputKind;
use docx_rs::{Docx, PageMargin, Paragraph, Pic, Run};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// A4 in twips
const PAGE_WIDTH_TWIPS: u32 = 11_906;
const PAGE_HEIGHT_TWIPS: u32 = 16_838;
/// 0.5 cm
const MARGIN_TWIPS: i32 = 283;

const EMU_PER_CM: u64 = 360_000;
/// 19 cm, the printable width
const PICTURE_WIDTH_EMU: u64 = 19 * EMU_PER_CM;
/// Leaves room for the paragraph below a tall picture
const PICTURE_MAX_HEIGHT_EMU: u64 = 27 * EMU_PER_CM;

fn encode_error(reason: impl ToString) -> RenderError {
    RenderError::Encode {
        kind: OutputKind::Docx,
        reason: reason.to_string(),
    }
}

/// Picture extent in EMU: full printable width, height by aspect ratio,
/// scaled down when the picture would not fit on one page
fn picture_extent(width_px: u32, height_px: u32) -> (u32, u32) {
    let (w, h) = (u64::from(width_px.max(1)), u64::from(height_px.max(1)));
    let mut extent = (PICTURE_WIDTH_EMU, PICTURE_WIDTH_EMU * h / w);
    if extent.1 > PICTURE_MAX_HEIGHT_EMU {
        extent = (PICTURE_MAX_HEIGHT_EMU * w / h, PICTURE_MAX_HEIGHT_EMU);
    }
    // Both values are bounded by 27 cm in EMU, far below u32::MAX
    (
        u32::try_from(extent.0).unwrap_or(u32::MAX),
        u32::try_from(extent.1).unwrap_or(u32::MAX),
    )
}

fn picture(image: &DynamicImage) -> Result<Pic, RenderError> {
    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageFormat::Png)
        .map_err(encode_error)?;
    let (width, height) = picture_extent(image.width(), image.height());
    Ok(Pic::new(png.get_ref()).size(width, height))
}

pub(super) fn write_docx(images: &[DynamicImage], output: &Path) -> Result<(), RenderError> {
    let margins = PageMargin::new()
        .top(MARGIN_TWIPS)
        .bottom(MARGIN_TWIPS)
        .left(MARGIN_TWIPS)
        .right(MARGIN_TWIPS);

    let mut docx = Docx::new()
        .page_size(PAGE_WIDTH_TWIPS, PAGE_HEIGHT_TWIPS)
        .page_margin(margins);
    for image in images {
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_image(picture(image)?)));
    }

    let file = std::fs::File::create(output)?;
    docx.build().pack(file).map_err(encode_error)?;
    Ok(())
}
