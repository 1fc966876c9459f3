pub mod fields;
pub mod grouping;
pub mod processor;
pub mod rasterize;
pub mod recognition;
pub mod types;

use thiserror::Error;

/// Document-level failures. Page-level recognition failures never surface
/// here; they are recorded on the page (see [`types::RecognizedPage`]).
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot decode document: {0}")]
    Decode(String),

    #[error("PDF is password-protected")]
    PdfEncrypted,

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("Image processing error: {0}")]
    ImageProcessing(String),
}

impl PipelineError {
    /// Whether the input itself is unusable, as opposed to a local failure
    /// that would affect every document.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::PdfEncrypted | Self::PdfRendering { .. }
        )
    }
}
