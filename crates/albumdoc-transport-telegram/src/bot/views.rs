//! View layer for bot UI components
//!
//! Contains keyboards and user-facing texts.

use albumdoc_core::error::ConversionError;
use albumdoc_core::intake::StageReport;
use albumdoc_core::output::OutputKind;
use teloxide::types::{KeyboardButton, KeyboardMarkup};

/// Caption attached to a delivered document
pub const DELIVERY_CAPTION: &str = "Here is your document.\nTo make a new one, send more photos.";

/// Welcome text for `/start`
#[must_use]
pub fn welcome_text(kinds: &[OutputKind]) -> String {
    format!(
        "👋 <b>Hi! I turn your photos into a single document.</b>\n\n\
         1. Send one or more photos (albums work too).\n\
         2. Send /convert to get {}.\n\n\
         Use /name to choose the file name and /cancel to start over.",
        kinds_list(kinds)
    )
}

/// "a PDF or DOCX file" style enumeration of the enabled kinds
fn kinds_list(kinds: &[OutputKind]) -> String {
    let names: Vec<String> = kinds.iter().map(|k| k.to_string().to_uppercase()).collect();
    match names.as_slice() {
        [] => "a document".to_string(),
        [only] => format!("a {only} file"),
        [rest @ .., last] => format!("a {} or {last} file", rest.join(", ")),
    }
}

/// Keyboard shown while photos are staged
///
/// # Examples
///
/// ```
/// use albumdoc_core::output::OutputKind;
/// use albumdoc_transport_telegram::bot::views::staging_keyboard;
/// let keyboard = staging_keyboard(&[OutputKind::Pdf]);
/// assert_eq!(keyboard.keyboard.len(), 2);
/// ```
#[must_use]
pub fn staging_keyboard(kinds: &[OutputKind]) -> KeyboardMarkup {
    let convert_row = if kinds.len() > 1 {
        kinds
            .iter()
            .map(|kind| KeyboardButton::new(format!("/convert {kind}")))
            .collect()
    } else {
        vec![KeyboardButton::new("/convert")]
    };
    KeyboardMarkup::new(vec![convert_row, vec![KeyboardButton::new("/cancel")]]).resize_keyboard()
}

/// Acknowledgement after a batch was staged
#[must_use]
pub fn staged_text(report: StageReport) -> String {
    let received = if report.added == 1 {
        "Got your photo.".to_string()
    } else {
        format!("Got {} photos.", report.added)
    };
    format!(
        "{received} Staged so far: {}.\nSend more, or /convert when you are ready.",
        report.total
    )
}

/// User-facing explanation of a conversion or staging error
#[must_use]
pub fn error_text(error: &ConversionError) -> String {
    match error {
        ConversionError::UnsupportedInput(reason) => {
            format!("⚠️ {}", html_escape::encode_text(reason))
        }
        ConversionError::EmptyStaging => {
            "There is nothing to convert yet. Send me some photos first.".to_string()
        }
        ConversionError::Busy => {
            "⏳ Your previous document is still being prepared, please wait.".to_string()
        }
        ConversionError::Render(_) => "❌ I could not build your document, one of the images \
             seems to be damaged.\nYour photos were discarded, please send them again."
            .to_string(),
        ConversionError::Delivery(_) => "❌ The document was created but I could not send it.\n\
             Your photos were discarded, please send them again."
            .to_string(),
        ConversionError::Storage(_) => {
            "❌ I could not save that, please try sending it again.".to_string()
        }
    }
}

/// Reply to an invalid `/convert` or `/format` argument
#[must_use]
pub fn unknown_kind_text(arg: &str, kinds: &[OutputKind]) -> String {
    let options: Vec<String> = kinds.iter().map(ToString::to_string).collect();
    format!(
        "Unknown format <b>{}</b>. Available: {}.",
        html_escape::encode_text(arg),
        options.join(", ")
    )
}
