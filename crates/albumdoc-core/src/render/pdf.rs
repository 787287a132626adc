//! PDF assembly: one page per image, the page sized to the image at 72 dpi

use super::RenderError;
use crate::output::OutputKind;
use image::{DynamicImage, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::Cursor;
use std::path::Path;

const PDF_VERSION: &str = "1.5";
const IMAGE_NAME: &str = "Im0";

fn encode_error(reason: impl ToString) -> RenderError {
    RenderError::Encode {
        kind: OutputKind::Pdf,
        reason: reason.to_string(),
    }
}

/// Re-encode as baseline RGB JPEG so the page can embed it with `DCTDecode`
fn to_jpeg(image: &DynamicImage) -> Result<Vec<u8>, RenderError> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Jpeg)
        .map_err(encode_error)?;
    Ok(buffer.into_inner())
}

fn add_page(
    document: &mut Document,
    pages_id: ObjectId,
    image: &DynamicImage,
) -> Result<ObjectId, RenderError> {
    let width = i64::from(image.width());
    let height = i64::from(image.height());

    let image_stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        to_jpeg(image)?,
    )
    .with_compression(false);
    let image_id = document.add_object(image_stream);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_NAME.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = document.add_object(Stream::new(
        dictionary! {},
        content.encode().map_err(encode_error)?,
    ));

    let resources_id = document.add_object(dictionary! {
        "XObject" => dictionary! { IMAGE_NAME => image_id },
    });

    Ok(document.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
    }))
}

pub(super) fn write_pdf(images: &[DynamicImage], output: &Path) -> Result<(), RenderError> {
    let mut document = Document::with_version(PDF_VERSION);
    let pages_id = document.new_object_id();

    let mut kids = Vec::with_capacity(images.len());
    for image in images {
        kids.push(Object::from(add_page(&mut document, pages_id, image)?));
    }

    let count = i64::try_from(kids.len()).map_err(encode_error)?;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    document.save(output).map_err(encode_error)?;
    Ok(())
}
