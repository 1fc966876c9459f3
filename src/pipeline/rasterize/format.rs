use std::path::Path;

use crate::pipeline::types::DocumentKind;
use crate::pipeline::PipelineError;

/// Upper bound on accepted document size.
pub const MAX_DOCUMENT_BYTES: usize = 100 * 1024 * 1024; // 100MB

/// Decide how to decode a document.
///
/// Magic bytes are checked first since upload names are often wrong; the
/// filename extension and declared content type are only consulted when the
/// header is not recognized.
pub fn detect_kind(
    filename: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<DocumentKind, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::Decode(format!("{filename} is empty")));
    }
    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(PipelineError::Decode(format!(
            "{filename} is {} bytes, limit is {MAX_DOCUMENT_BYTES}",
            bytes.len()
        )));
    }

    let sniffed = sniff_magic(bytes);
    let hinted = hint_from_content_type(content_type).or_else(|| hint_from_filename(filename));

    match (sniffed, hinted) {
        (Some(kind), Some(hint)) if kind != hint => {
            tracing::warn!(
                filename,
                sniffed = kind.as_str(),
                declared = hint.as_str(),
                "Declared document type disagrees with content, trusting content"
            );
            Ok(kind)
        }
        (Some(kind), _) => Ok(kind),
        (None, Some(hint)) => Ok(hint),
        (None, None) => Err(PipelineError::Decode(format!(
            "{filename}: unsupported document format"
        ))),
    }
}

fn sniff_magic(bytes: &[u8]) -> Option<DocumentKind> {
    match &bytes[..bytes.len().min(8)] {
        // PDF: starts with %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => Some(DocumentKind::Pdf),
        // JPEG: starts with FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some(DocumentKind::Image),
        // PNG: starts with 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some(DocumentKind::Image),
        // TIFF: little-endian (49 49 2A 00) or big-endian (4D 4D 00 2A)
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Some(DocumentKind::Image),
        _ => None,
    }
}

fn hint_from_content_type(content_type: Option<&str>) -> Option<DocumentKind> {
    let ct = content_type?.trim().to_ascii_lowercase();
    if ct == "application/pdf" {
        Some(DocumentKind::Pdf)
    } else if ct.starts_with("image/") {
        Some(DocumentKind::Image)
    } else {
        None
    }
}

fn hint_from_filename(filename: &str) -> Option<DocumentKind> {
    let ext = Path::new(filename)
        .extension()?
        .to_string_lossy()
        .to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(DocumentKind::Pdf),
        "png" | "jpg" | "jpeg" | "tif" | "tiff" => Some(DocumentKind::Image),
        _ => None,
    }
}
