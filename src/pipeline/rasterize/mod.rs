//! Page rasterization: one input document → ordered PNG page images.

pub mod format;
pub mod pdfium;

pub use format::*;
pub use pdfium::*;

use image::GenericImageView;

use self::pdfium::encode_png;
use crate::pipeline::types::{DocumentInput, DocumentKind, PageImage};
use crate::pipeline::PipelineError;

/// Renders the pages of a PDF to images. Abstracted so the pipeline can be
/// tested without the PDFium shared library.
pub trait PdfPageRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, PipelineError>;

    /// Render one page. `page_index` is 0-based; the returned image carries
    /// the 1-based position.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<PageImage, PipelineError>;

    /// Render every page in document order.
    fn render_all(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<PageImage>, PipelineError> {
        let count = self.page_count(pdf_bytes)?;
        (0..count)
            .map(|index| self.render_page(pdf_bytes, index, dpi))
            .collect()
    }
}

/// Turns documents into page images. Never touches the network.
pub struct Rasterizer {
    renderer: Box<dyn PdfPageRenderer + Send + Sync>,
    dpi: u32,
}

impl Rasterizer {
    pub fn new(renderer: Box<dyn PdfPageRenderer + Send + Sync>, dpi: u32) -> Self {
        Self { renderer, dpi }
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Detect the document kind and rasterize it.
    pub fn rasterize(&self, input: &DocumentInput) -> Result<Vec<PageImage>, PipelineError> {
        let kind = detect_kind(&input.filename, input.content_type.as_deref(), &input.bytes)?;
        self.rasterize_kind(kind, &input.bytes)
    }

    pub fn rasterize_kind(
        &self,
        kind: DocumentKind,
        bytes: &[u8],
    ) -> Result<Vec<PageImage>, PipelineError> {
        let pages = match kind {
            DocumentKind::Pdf => self.renderer.render_all(bytes, self.dpi)?,
            DocumentKind::Image => vec![decode_image(bytes)?],
        };

        tracing::info!(
            kind = kind.as_str(),
            pages = pages.len(),
            dpi = self.dpi,
            "Document rasterized"
        );
        Ok(pages)
    }
}

/// A bare image is a one-page document. It is decoded (so garbage fails here,
/// not at the OCR service) and normalized to PNG.
fn decode_image(bytes: &[u8]) -> Result<PageImage, PipelineError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| PipelineError::Decode(format!("Failed to decode image: {e}")))?;
    let (width, height) = (img.width(), img.height());
    let png = encode_png(&img)?;
    Ok(PageImage {
        position: 1,
        png,
        width,
        height,
    })
}

#[cfg(test)]
pub(crate) fn test_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([255u8, 255, 255]));
    encode_png(&image::DynamicImage::ImageRgb8(img)).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rasterizer(pages: usize) -> Rasterizer {
        Rasterizer::new(Box::new(MockPdfPageRenderer::new(pages)), DEFAULT_RENDER_DPI)
    }

    #[test]
    fn pdf_yields_one_image_per_page_in_order() {
        let input = DocumentInput::new("forms.pdf", b"%PDF-1.4 mock".to_vec());
        let pages = rasterizer(6).rasterize(&input).unwrap();
        assert_eq!(pages.len(), 6);
        assert!(pages.iter().enumerate().all(|(i, p)| p.position == i + 1));
    }

    #[test]
    fn image_yields_single_page() {
        let input = DocumentInput::new("scan.png", test_png(20, 30));
        let pages = rasterizer(0).rasterize(&input).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].position, 1);
        assert_eq!((pages[0].width, pages[0].height), (20, 30));
    }

    #[test]
    fn corrupt_image_is_decode_error() {
        let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(b"not really a png");
        let input = DocumentInput::new("scan.png", bytes);
        let err = rasterizer(0).rasterize(&input).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)), "got {err:?}");
    }

    #[test]
    fn empty_pdf_yields_no_pages() {
        let input = DocumentInput::new("blank.pdf", b"%PDF-1.4".to_vec());
        assert!(rasterizer(0).rasterize(&input).unwrap().is_empty());
    }
}
