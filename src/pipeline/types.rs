use serde::{Deserialize, Serialize};

/// Kind of input document, decided by [`super::rasterize::detect_kind`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Image,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
        }
    }
}

/// A document handed to the pipeline: raw bytes plus the naming hints
/// used to decide how to decode it.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl DocumentInput {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read a document from disk, keeping only the file name as hint.
    pub fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(filename, bytes))
    }
}

/// One rasterized page, PNG-encoded. `position` is 1-based.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub position: usize,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Text recognized for one page, or the marker left by a failed call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognizedPage {
    pub position: usize,
    pub text: String,
    pub error: Option<String>,
}

impl RecognizedPage {
    pub fn recognized(position: usize, text: impl Into<String>) -> Self {
        Self {
            position,
            text: text.into(),
            error: None,
        }
    }

    /// Page whose gateway call failed. The text carries an inline marker so
    /// exported raw text still shows where the gap is.
    pub fn failed(position: usize, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            position,
            text: format!("[ERROR on page {position}]: {reason}"),
            error: Some(reason),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Paragraph separator placed between page texts of one form.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Consecutive pages belonging to one patient's intake form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Form {
    /// 1-based form number within the document.
    pub index: usize,
    pub pages: Vec<RecognizedPage>,
}

impl Form {
    /// Concatenated text of the pages that were recognized, in page order.
    /// Error markers are left out so they never feed label matching.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .filter(|p| !p.is_error())
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR)
    }

    pub fn first_page(&self) -> Option<usize> {
        self.pages.first().map(|p| p.position)
    }

    pub fn last_page(&self) -> Option<usize> {
        self.pages.last().map(|p| p.position)
    }

    pub fn failed_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.is_error()).count()
    }
}
