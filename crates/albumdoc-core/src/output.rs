//! Output document kinds and the file naming policy.

// lazy_regex! uses once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Characters that are not allowed in an output file stem
static RE_UNSAFE_CHARS: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"[^\p{L}\p{N} _.\-]");

/// Runs of whitespace
static RE_WHITESPACE: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\s+");

/// Maximum length (in characters) of an output file stem
pub const MAX_STEM_CHARS: usize = 64;

/// Stem used when nothing else is available
pub const FALLBACK_STEM: &str = "document";

/// Kind of document produced by a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Portable Document Format, one page per image
    Pdf,
    /// Word document, one image per paragraph
    Docx,
}

impl OutputKind {
    /// All known output kinds
    pub const ALL: [Self; 2] = [Self::Pdf, Self::Docx];

    /// File extension without the leading dot
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Error returned when a string does not name an output kind
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown output kind: {0}")]
pub struct UnknownOutputKind(pub String);

impl FromStr for OutputKind {
    type Err = UnknownOutputKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.extension() == normalized)
            .ok_or_else(|| UnknownOutputKind(s.trim().to_string()))
    }
}

/// Builds the delivered file name for a conversion.
///
/// The stem is the first non-blank candidate among `chosen`, `fallback` and
/// `default`, sanitized for use as a file name. An extension the user typed
/// themselves (`report.pdf`) is dropped before the kind's extension is appended.
///
/// # Examples
///
/// ```
/// use albumdoc_core::output::{output_file_name, OutputKind};
///
/// let name = output_file_name(Some("Trip: day 1/2"), None, None, OutputKind::Pdf);
/// assert_eq!(name, "Trip_ day 1_2.pdf");
/// ```
#[must_use]
pub fn output_file_name(
    chosen: Option<&str>,
    fallback: Option<&str>,
    default: Option<&str>,
    kind: OutputKind,
) -> String {
    let stem = [chosen, fallback, default]
        .into_iter()
        .flatten()
        .map(sanitize_stem)
        .find(|stem| !stem.is_empty())
        .unwrap_or_else(|| FALLBACK_STEM.to_string());
    format!("{stem}.{}", kind.extension())
}

fn sanitize_stem(raw: &str) -> String {
    let collapsed = RE_WHITESPACE.replace_all(raw, " ");
    let cleaned = RE_UNSAFE_CHARS.replace_all(&collapsed, "_");
    let mut stem = cleaned.trim().trim_matches('.').to_string();

    let lowered = stem.to_ascii_lowercase();
    if let Some(kind) = OutputKind::ALL
        .into_iter()
        .find(|kind| lowered.ends_with(&format!(".{}", kind.extension())))
    {
        stem.truncate(stem.len() - kind.extension().len() - 1);
    }

    crate::utils::truncate_str(stem.trim(), MAX_STEM_CHARS)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output_kind() {
        assert_eq!("pdf".parse::<OutputKind>(), Ok(OutputKind::Pdf));
        assert_eq!(" DOCX ".parse::<OutputKind>(), Ok(OutputKind::Docx));
        assert_eq!(".pdf".parse::<OutputKind>(), Ok(OutputKind::Pdf));
        assert_eq!(
            "odt".parse::<OutputKind>(),
            Err(UnknownOutputKind("odt".to_string()))
        );
    }

    #[test]
    fn test_name_precedence() {
        let kind = OutputKind::Docx;
        assert_eq!(
            output_file_name(Some("mine"), Some("User"), Some("photos"), kind),
            "mine.docx"
        );
        assert_eq!(
            output_file_name(Some("   "), Some("User"), Some("photos"), kind),
            "User.docx"
        );
        assert_eq!(output_file_name(None, None, Some("photos"), kind), "photos.docx");
        assert_eq!(output_file_name(None, None, None, kind), "document.docx");
    }

    #[test]
    fn test_name_strips_typed_extension() {
        assert_eq!(
            output_file_name(Some("report.PDF"), None, None, OutputKind::Pdf),
            "report.pdf"
        );
        assert_eq!(
            output_file_name(Some("scan.docx"), None, None, OutputKind::Pdf),
            "scan.pdf"
        );
    }

    #[test]
    fn test_name_sanitizes_paths_and_unicode() {
        assert_eq!(
            output_file_name(Some("../../etc/passwd"), None, None, OutputKind::Pdf),
            "_.._etc_passwd.pdf"
        );
        assert_eq!(
            output_file_name(Some("Отчёт  за\tмай"), None, None, OutputKind::Pdf),
            "Отчёт за май.pdf"
        );
    }

    #[test]
    fn test_name_is_truncated() {
        let long = "x".repeat(200);
        let name = output_file_name(Some(&long), None, None, OutputKind::Pdf);
        assert_eq!(name.chars().count(), MAX_STEM_CHARS + ".pdf".len());
    }
}
