//! PDF access via Google PDFium.
//!
//! `PdfiumRenderer` is stateless (`Send + Sync`). Each call binds a fresh
//! `Pdfium` instance because the upstream type is `!Send`; the OS caches the
//! library load so repeat binds are cheap.

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::pdf_renderer::zoom_for_dpi;
use super::types::PdfPageRenderer;
use super::ExtractionError;
use crate::config;

/// Hard cap on the raw render, before the upload downscale.
const MAX_RENDER_DIMENSION_PX: u32 = 4096;

pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Create a renderer, failing fast if the PDFium library cannot be bound.
    pub fn new() -> Result<Self, ExtractionError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Bind the PDFium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` (explicit path to the library file)
/// 2. Alongside the running executable, or its `pdfium/lib` subdirectory
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var(config::ENV_PDFIUM_LIB_PATH) {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| ExtractionError::PdfLoad(format!("Failed to bind PDFium at {path}: {e}")))?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        for dir in [exe_dir.clone(), exe_dir.join("pdfium").join("lib")] {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %dir.display(), "Loaded PDFium next to executable");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        ExtractionError::PdfLoad(format!(
            "PDFium library not found. Set {} or install PDFium: {e}",
            config::ENV_PDFIUM_LIB_PATH
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn map_load_error(e: PdfiumError) -> ExtractionError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        ExtractionError::PdfEncrypted
    } else {
        ExtractionError::PdfLoad(msg)
    }
}

/// Pixel size for a page at `dpi`, each side clamped to [1, MAX_RENDER_DIMENSION_PX]
/// with aspect ratio preserved.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let zoom = zoom_for_dpi(dpi);
    let raw_w = (width_points * zoom).max(1.0);
    let raw_h = (height_points * zoom).max(1.0);

    let largest = raw_w.max(raw_h);
    if largest <= MAX_RENDER_DIMENSION_PX as f32 {
        return (raw_w as u32, raw_h as u32);
    }
    let ratio = MAX_RENDER_DIMENSION_PX as f32 / largest;
    (
        ((raw_w * ratio) as u32).clamp(1, MAX_RENDER_DIMENSION_PX),
        ((raw_h * ratio) as u32).clamp(1, MAX_RENDER_DIMENSION_PX),
    )
}

fn page_index_u16(page_index: usize) -> Result<u16, ExtractionError> {
    u16::try_from(page_index).map_err(|_| ExtractionError::PdfRendering {
        page: page_index + 1,
        reason: format!("Page index {page_index} exceeds PDFium's page range"),
    })
}

fn out_of_range(page_index: usize, total: u16) -> ExtractionError {
    ExtractionError::PdfRendering {
        page: page_index + 1,
        reason: format!("Page out of range (document has {total} pages)"),
    }
}

impl PdfPageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn page_text(&self, pdf_bytes: &[u8], page_index: usize) -> Result<String, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        let pages = document.pages();
        let page = pages
            .get(page_index_u16(page_index)?)
            .map_err(|_| out_of_range(page_index, pages.len()))?;

        let text = page.text().map_err(|e| ExtractionError::PdfRendering {
            page: page_index + 1,
            reason: format!("Text layer unavailable: {e}"),
        })?;
        Ok(text.all())
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<DynamicImage, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        let pages = document.pages();
        let page = pages
            .get(page_index_u16(page_index)?)
            .map_err(|_| out_of_range(page_index, pages.len()))?;

        let width_points = page.width().value;
        let height_points = page.height().value;
        let (target_w, target_h) = compute_render_dimensions(width_points, height_points, dpi);
        if width_points.max(height_points) * zoom_for_dpi(dpi) > MAX_RENDER_DIMENSION_PX as f32 {
            warn!(
                page = page_index + 1,
                width = target_w,
                height = target_h,
                "Page render capped to {MAX_RENDER_DIMENSION_PX}px"
            );
        }

        let render_config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| ExtractionError::PdfRendering {
                page: page_index + 1,
                reason: format!("Rendering failed: {e}"),
            })?;

        debug!(
            page = page_index + 1,
            width = target_w,
            height = target_h,
            dpi,
            "Rendered PDF page"
        );
        Ok(bitmap.as_image())
    }
}
