//! PDF page rasterization via Google PDFium.
//!
//! Scanned intake forms arrive as image-only PDFs. Each page is rendered to a
//! PNG at a fixed DPI so the recognition service sees a consistent resolution.
//!
//! `PdfiumRenderer` is `Send + Sync`: the upstream `Pdfium` handle is `!Send`,
//! so one is bound per call. The OS caches the shared library after the first
//! load.

use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageOutputFormat};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::PdfPageRenderer;
use crate::pipeline::types::PageImage;
use crate::pipeline::PipelineError;

/// Maximum dimension (width or height) for rendered page images.
const MAX_DIMENSION_PX: u32 = 4096;

/// Default rendering DPI. OCR.space accuracy drops noticeably below 200.
pub const DEFAULT_RENDER_DPI: u32 = 200;

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Renders PDF pages to PNG images using PDFium.
pub struct PdfiumRenderer {
    library_path: Option<PathBuf>,
}

impl PdfiumRenderer {
    /// Create a renderer and check that the PDFium library can be bound.
    ///
    /// Lookup order: `library_path`, `PDFIUM_DYNAMIC_LIB_PATH`, the
    /// executable's directory (and `lib/` beside or above it), then the
    /// system library path.
    pub fn new(library_path: Option<PathBuf>) -> Result<Self, PipelineError> {
        let renderer = Self { library_path };
        let _ = renderer.bind()?;
        Ok(renderer)
    }

    fn bind(&self) -> Result<Pdfium, PipelineError> {
        let explicit = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_DYNAMIC_LIB_PATH").map(PathBuf::from));

        if let Some(path) = explicit {
            debug!(path = %path.display(), "Binding PDFium from explicit path");
            let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
                PipelineError::PdfRendering {
                    page: 0,
                    reason: format!("Failed to load PDFium from {}: {e}", path.display()),
                }
            })?;
            return Ok(Pdfium::new(bindings));
        }

        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        {
            let candidates = [
                exe_dir.clone(),
                exe_dir.join("lib"),
                exe_dir.join("..").join("lib"),
            ];
            for dir in &candidates {
                let lib_path =
                    Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
                if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                    debug!(dir = %dir.display(), "Bound PDFium next to executable");
                    return Ok(Pdfium::new(bindings));
                }
            }
        }

        let bindings =
            Pdfium::bind_to_system_library().map_err(|e| PipelineError::PdfRendering {
                page: 0,
                reason: format!(
                    "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
                ),
            })?;
        Ok(Pdfium::new(bindings))
    }
}

/// Load failures are the caller's document being unreadable, except for
/// password protection which gets its own message.
fn map_load_error(e: PdfiumError) -> PipelineError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        PipelineError::PdfEncrypted
    } else {
        PipelineError::Decode(format!("Failed to load PDF: {msg}"))
    }
}

/// Pixel dimensions for a page at `dpi`, both clamped to
/// `[1, MAX_DIMENSION_PX]` with aspect ratio kept when capping.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

fn render_one(page: &PdfPage, index: usize, dpi: u32) -> Result<PageImage, PipelineError> {
    let (target_w, target_h) =
        compute_render_dimensions(page.width().value, page.height().value, dpi);

    if target_w == MAX_DIMENSION_PX || target_h == MAX_DIMENSION_PX {
        warn!(
            page = index + 1,
            width = target_w,
            height = target_h,
            "Page dimensions capped to {MAX_DIMENSION_PX}px"
        );
    }

    let config = PdfRenderConfig::new()
        .set_target_width(target_w as i32)
        .set_maximum_height(target_h as i32);

    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| PipelineError::PdfRendering {
            page: index + 1,
            reason: format!("Rendering failed: {e}"),
        })?;

    let png = encode_png(&bitmap.as_image())?;

    debug!(
        page = index + 1,
        width = target_w,
        height = target_h,
        png_size = png.len(),
        "Rendered PDF page"
    );

    Ok(PageImage {
        position: index + 1,
        png,
        width: target_w,
        height: target_h,
    })
}

/// Encode a decoded raster as PNG, the format handed to the gateway.
pub(crate) fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, PipelineError> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| PipelineError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

impl PdfPageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, PipelineError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<PageImage, PipelineError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        let pages = document.pages();

        let index = u16::try_from(page_index).map_err(|_| PipelineError::PdfRendering {
            page: page_index + 1,
            reason: format!("Page index {page_index} exceeds u16 maximum"),
        })?;
        let page = pages.get(index).map_err(|_| PipelineError::PdfRendering {
            page: page_index + 1,
            reason: format!(
                "Page {} out of range (document has {} pages)",
                page_index + 1,
                pages.len()
            ),
        })?;

        render_one(&page, page_index, dpi)
    }

    /// Loads the document once instead of once per page.
    fn render_all(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<PageImage>, PipelineError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        document
            .pages()
            .iter()
            .enumerate()
            .map(|(index, page)| render_one(&page, index, dpi))
            .collect()
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Renders a fixed number of blank pages; stands in for PDFium in tests.
pub struct MockPdfPageRenderer {
    page_count: usize,
}

impl MockPdfPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self { page_count }
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, PipelineError> {
        Ok(self.page_count)
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_index: usize,
        _dpi: u32,
    ) -> Result<PageImage, PipelineError> {
        if page_index >= self.page_count {
            return Err(PipelineError::PdfRendering {
                page: page_index + 1,
                reason: format!(
                    "Page {} out of range (mock has {} pages)",
                    page_index + 1,
                    self.page_count
                ),
            });
        }
        Ok(PageImage {
            position: page_index + 1,
            png: minimal_png(),
            width: 1,
            height: 1,
        })
    }
}

/// 1x1 white pixel PNG.
pub(crate) fn minimal_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
        0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1
        0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, // 8-bit RGB
        0xDE, // IHDR CRC
        0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, // IDAT chunk
        0x08, 0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, // compressed
        0x00, 0x02, 0x00, 0x01, 0xE2, 0x21, 0xBC, 0x33, // IDAT CRC
        0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND chunk
        0xAE, 0x42, 0x60, 0x82, // IEND CRC
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_at_default_dpi_exceeds_ocr_minimum() {
        let (w, h) = compute_render_dimensions(595.0, 842.0, DEFAULT_RENDER_DPI);
        // 595 * 200/72 ~ 1653, 842 * 200/72 ~ 2339
        assert!(w > 1600 && w < 1700, "A4 width at 200dpi: got {w}");
        assert!(h > 2300 && h < 2400, "A4 height at 200dpi: got {h}");
    }

    #[test]
    fn letter_at_300dpi() {
        let (w, h) = compute_render_dimensions(612.0, 792.0, 300);
        assert!(w > 2500 && w < 2600, "Letter width at 300dpi: got {w}");
        assert!(h > 3250 && h < 3350, "Letter height at 300dpi: got {h}");
    }

    #[test]
    fn oversized_page_is_capped_with_aspect_ratio() {
        let (w, h) = compute_render_dimensions(5000.0, 10000.0, 200);
        assert!(w <= MAX_DIMENSION_PX && h <= MAX_DIMENSION_PX);
        let ratio = h as f32 / w as f32;
        assert!((ratio - 2.0).abs() < 0.15, "ratio {ratio}");
    }

    #[test]
    fn zero_sized_page_clamped_to_one_pixel() {
        let (w, h) = compute_render_dimensions(0.0, 0.0, 200);
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn mock_renders_positions_in_order() {
        let mock = MockPdfPageRenderer::new(3);
        let pages = mock.render_all(&[], 200).unwrap();
        let positions: Vec<usize> = pages.iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(&pages[0].png[..4], &[0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn mock_errors_for_out_of_range() {
        let mock = MockPdfPageRenderer::new(2);
        let err = mock.render_page(&[], 2, 200).unwrap_err();
        assert!(matches!(err, PipelineError::PdfRendering { page: 3, .. }));
    }

    #[test]
    fn renderer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PdfiumRenderer>();
        assert_send_sync::<MockPdfPageRenderer>();
    }
}
