//! Page rendering helpers shared by every `PdfPageRenderer`.
//!
//! Turns a renderer into the two things the orchestrator needs: the
//! concatenated text layer, and one bounded raster per page. Pages that fail
//! are skipped; the caller proceeds with whatever rendered.

use std::collections::HashSet;
use std::io::Cursor;

use base64::Engine as _;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use tracing::debug;

use super::types::{PageImage, PdfPageRenderer};
use super::ExtractionError;

/// Rendering DPI for vision extraction. Low on purpose: names and dates are
/// large print, and payload size drives cost.
pub const DEFAULT_RENDER_DPI: u32 = 100;

/// Neither dimension of an uploaded page image exceeds this.
pub const MAX_IMAGE_DIMENSION_PX: u32 = 800;

/// PDF points per inch (standard PDF unit).
pub const POINTS_PER_INCH: f32 = 72.0;

/// Zoom applied to PDF points for a target DPI.
pub fn zoom_for_dpi(dpi: u32) -> f32 {
    dpi as f32 / POINTS_PER_INCH
}

/// Concatenate the text layer of every page. Unreadable pages contribute nothing.
pub fn extract_text_layer(
    renderer: &dyn PdfPageRenderer,
    pdf_bytes: &[u8],
    page_count: usize,
) -> String {
    let mut text = String::new();
    for page_index in 0..page_count {
        match renderer.page_text(pdf_bytes, page_index) {
            Ok(page_text) => text.push_str(&page_text),
            Err(e) => debug!(page = page_index + 1, error = %e, "Skipping page text"),
        }
    }
    text
}

/// Render every page and downscale it to fit `max_dimension`.
///
/// Failed pages are skipped silently; the returned images keep their original
/// 1-based page numbers and the document's total page count.
pub fn render_page_images(
    renderer: &dyn PdfPageRenderer,
    pdf_bytes: &[u8],
    page_count: usize,
    dpi: u32,
    max_dimension: u32,
) -> Vec<PageImage> {
    let mut images = Vec::with_capacity(page_count);
    for page_index in 0..page_count {
        match renderer.render_page(pdf_bytes, page_index, dpi) {
            Ok(image) => images.push(PageImage {
                page_number: page_index + 1,
                total_pages: page_count,
                image: downscale_to_fit(image, max_dimension),
            }),
            Err(e) => debug!(page = page_index + 1, error = %e, "Skipping page that failed to render"),
        }
    }

    debug!(
        rendered = images.len(),
        total_pages = page_count,
        dpi,
        "Rendered PDF pages"
    );
    images
}

/// Shrink an image so neither side exceeds `max_dimension`, keeping aspect ratio.
/// Images already within bounds are returned untouched.
pub fn downscale_to_fit(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= max_dimension && height <= max_dimension {
        return image;
    }
    image.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

/// PNG-encode an image and return it as standard base64.
pub fn encode_png_base64(image: &DynamicImage) -> Result<String, ExtractionError> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(cursor.into_inner()))
}

// ── Mock for testing ──────────────────────────────────────

/// Mock renderer for orchestrator and processor tests.
///
/// Each page renders as a solid image whose red channel equals its 1-based
/// page number, so a test client can recover the page from the uploaded
/// payload with [`MockPdfPageRenderer::page_number_of`].
pub struct MockPdfPageRenderer {
    page_count: usize,
    page_texts: Vec<String>,
    failing_pages: HashSet<usize>,
    load_error: Option<String>,
    page_size: (u32, u32),
}

impl MockPdfPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            page_texts: Vec::new(),
            failing_pages: HashSet::new(),
            load_error: None,
            page_size: (64, 48),
        }
    }

    /// Text layer per page (missing entries are empty).
    pub fn with_page_texts(mut self, texts: &[&str]) -> Self {
        self.page_texts = texts.iter().map(|t| t.to_string()).collect();
        self
    }

    /// 1-based page numbers that fail to render.
    pub fn with_failing_pages(mut self, pages: &[usize]) -> Self {
        self.failing_pages = pages.iter().copied().collect();
        self
    }

    pub fn failing_all_pages(mut self) -> Self {
        self.failing_pages = (1..=self.page_count).collect();
        self
    }

    /// Make the document itself unreadable.
    pub fn with_load_error(mut self, reason: &str) -> Self {
        self.load_error = Some(reason.to_string());
        self
    }

    pub fn with_page_size(mut self, width: u32, height: u32) -> Self {
        self.page_size = (width, height);
        self
    }

    /// Recover the page number from a PNG payload produced by this mock.
    pub fn page_number_of(image_base64: &str) -> Option<usize> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(image_base64)
            .ok()?;
        let image = image::load_from_memory(&bytes).ok()?;
        Some(image.to_rgb8().get_pixel(0, 0)[0] as usize)
    }

    fn check_loadable(&self) -> Result<(), ExtractionError> {
        match &self.load_error {
            Some(reason) => Err(ExtractionError::PdfLoad(reason.clone())),
            None => Ok(()),
        }
    }

    fn check_page(&self, page_index: usize) -> Result<(), ExtractionError> {
        self.check_loadable()?;
        if page_index >= self.page_count {
            return Err(ExtractionError::PdfRendering {
                page: page_index + 1,
                reason: format!("Page out of range (document has {} pages)", self.page_count),
            });
        }
        Ok(())
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        self.check_loadable()?;
        Ok(self.page_count)
    }

    fn page_text(&self, _pdf_bytes: &[u8], page_index: usize) -> Result<String, ExtractionError> {
        self.check_page(page_index)?;
        Ok(self.page_texts.get(page_index).cloned().unwrap_or_default())
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_index: usize,
        _dpi: u32,
    ) -> Result<DynamicImage, ExtractionError> {
        self.check_page(page_index)?;
        let page_number = page_index + 1;
        if self.failing_pages.contains(&page_number) {
            return Err(ExtractionError::PdfRendering {
                page: page_number,
                reason: "mock render failure".into(),
            });
        }

        let (width, height) = self.page_size;
        let marker = page_number.min(255) as u8;
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([marker, 200, 200]));
        Ok(DynamicImage::ImageRgb8(img))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_for_100_dpi() {
        assert!((zoom_for_dpi(100) - 100.0 / 72.0).abs() < f32::EPSILON);
        assert!((zoom_for_dpi(72) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn downscale_caps_largest_side_and_keeps_aspect() {
        let img = DynamicImage::new_rgb8(1700, 2200);
        let scaled = downscale_to_fit(img, 800);
        let (w, h) = scaled.dimensions();
        assert_eq!(h, 800);
        assert!(w <= 800);
        // 1700/2200 * 800 ≈ 618
        assert!((617..=619).contains(&w), "width {w}");
    }

    #[test]
    fn downscale_leaves_small_images_alone() {
        let img = DynamicImage::new_rgb8(640, 480);
        assert_eq!(downscale_to_fit(img, 800).dimensions(), (640, 480));
    }

    #[test]
    fn downscale_wide_image() {
        let img = DynamicImage::new_rgb8(2000, 500);
        let (w, h) = downscale_to_fit(img, 800).dimensions();
        assert_eq!(w, 800);
        assert_eq!(h, 200);
    }

    #[test]
    fn png_base64_has_png_signature() {
        let b64 = encode_png_base64(&DynamicImage::new_rgb8(4, 4)).unwrap();
        assert!(b64.starts_with("iVBORw0KGgo"));
    }

    #[test]
    fn text_layer_concatenates_pages() {
        let renderer = MockPdfPageRenderer::new(3).with_page_texts(&["Jane ", "", "Doe"]);
        assert_eq!(extract_text_layer(&renderer, b"%PDF", 3), "Jane Doe");
    }

    #[test]
    fn text_layer_skips_unreadable_pages() {
        let renderer = MockPdfPageRenderer::new(1).with_page_texts(&["only"]);
        // Asking for more pages than exist makes the extra ones fail.
        assert_eq!(extract_text_layer(&renderer, b"%PDF", 3), "only");
    }

    #[test]
    fn render_skips_failed_pages_and_keeps_numbering() {
        let renderer = MockPdfPageRenderer::new(3).with_failing_pages(&[2]);
        let images = render_page_images(&renderer, b"%PDF", 3, 100, 800);
        let numbers: Vec<usize> = images.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert!(images.iter().all(|p| p.total_pages == 3));
    }

    #[test]
    fn render_all_failing_yields_no_images() {
        let renderer = MockPdfPageRenderer::new(2).failing_all_pages();
        assert!(render_page_images(&renderer, b"%PDF", 2, 100, 800).is_empty());
    }

    #[test]
    fn rendered_pages_are_bounded() {
        let renderer = MockPdfPageRenderer::new(1).with_page_size(1200, 900);
        let images = render_page_images(&renderer, b"%PDF", 1, 100, 800);
        let (w, h) = images[0].image.dimensions();
        assert_eq!(w, 800);
        assert_eq!(h, 600);
    }

    #[test]
    fn mock_page_marker_round_trips_through_png() {
        let renderer = MockPdfPageRenderer::new(5);
        let image = renderer.render_page(b"%PDF", 3, 100).unwrap();
        let b64 = encode_png_base64(&image).unwrap();
        assert_eq!(MockPdfPageRenderer::page_number_of(&b64), Some(4));
    }

    #[test]
    fn mock_load_error_fails_page_count() {
        let renderer = MockPdfPageRenderer::new(1).with_load_error("corrupt xref");
        let err = renderer.page_count(b"junk").unwrap_err();
        assert!(err.to_string().contains("corrupt xref"));
    }
}
