//! Document processing entry point.
//!
//! Dispatches an upload by type: PDFs go through the text layer or the
//! multi-page vision orchestrator, images go to the service in one call.
//! `process` is the no-error boundary; `try_process` exposes hard failures.
//!
//! Renderer and client are injected, so the processor is fully testable with
//! mock implementations.

use std::sync::{Arc, Mutex};

use base64::Engine as _;
use tracing::Instrument;
use uuid::Uuid;

use crate::pipeline::extraction::orchestrator::PageExtractionOrchestrator;
use crate::pipeline::extraction::pdf_renderer::{
    downscale_to_fit, encode_png_base64, extract_text_layer, render_page_images,
};
use crate::pipeline::extraction::{
    ExtractionClient, ExtractionError, ExtractionRecord, PdfPageRenderer,
};
use crate::pipeline::format::{detect_format, DocumentKind};
use crate::pipeline::rate_limit::ExtractionRateLimiter;
use crate::pipeline_config::PipelineConfig;

pub struct DocumentProcessor {
    renderer: Arc<dyn PdfPageRenderer>,
    orchestrator: PageExtractionOrchestrator,
    rate_limiter: Option<Mutex<ExtractionRateLimiter>>,
}

impl DocumentProcessor {
    pub fn new(
        renderer: Arc<dyn PdfPageRenderer>,
        client: Arc<dyn ExtractionClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            renderer,
            orchestrator: PageExtractionOrchestrator::new(client, config),
            rate_limiter: None,
        }
    }

    /// Throttle [`Self::process_for_caller`] with `limiter`.
    pub fn with_rate_limiter(mut self, limiter: ExtractionRateLimiter) -> Self {
        self.rate_limiter = Some(Mutex::new(limiter));
        self
    }

    fn config(&self) -> &PipelineConfig {
        self.orchestrator.config()
    }

    /// Extract patient fields from an upload. Never fails: any error becomes a
    /// record with notes `"Processing failed: <error>"`.
    pub async fn process(&self, bytes: &[u8], filename: &str) -> ExtractionRecord {
        match self.try_process(bytes, filename).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Document processing failed");
                ExtractionRecord::failed(e)
            }
        }
    }

    /// Like [`Self::process`], but hard failures are returned as errors.
    pub async fn try_process(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<ExtractionRecord, ExtractionError> {
        let format = detect_format(filename, bytes.len(), self.config().max_upload_bytes)?;

        let span = tracing::info_span!(
            "process_document",
            run_id = %Uuid::new_v4(),
            kind = format.kind.as_str(),
            size = format.file_size_bytes,
        );

        async {
            tracing::info!(mime_type = %format.mime_type, "Processing document");
            match format.kind {
                DocumentKind::Pdf => self.process_pdf(bytes).await,
                DocumentKind::Image => self.process_image(bytes).await,
            }
        }
        .instrument(span)
        .await
    }

    /// [`Self::process`] gated by the per-caller rate limiter, if one is set.
    pub async fn process_for_caller(
        &self,
        caller: &str,
        bytes: &[u8],
        filename: &str,
    ) -> Result<ExtractionRecord, ExtractionError> {
        if let Some(limiter) = &self.rate_limiter {
            let verdict = limiter
                .lock()
                .map_err(|_| ExtractionError::TaskFailed("rate limiter lock poisoned".into()))?
                .check(caller);
            if let Err(retry_after_secs) = verdict {
                tracing::info!(retry_after_secs, "Extraction request throttled");
                return Err(ExtractionError::RateLimited { retry_after_secs });
            }
        }
        Ok(self.process(bytes, filename).await)
    }

    async fn process_pdf(&self, bytes: &[u8]) -> Result<ExtractionRecord, ExtractionError> {
        let pdf: Arc<[u8]> = Arc::from(bytes);

        let (page_count, text) = {
            let renderer = Arc::clone(&self.renderer);
            let pdf = Arc::clone(&pdf);
            run_blocking(move || {
                let page_count = renderer.page_count(&pdf)?;
                let text = extract_text_layer(renderer.as_ref(), &pdf, page_count);
                Ok((page_count, text))
            })
            .await?
        };

        if page_count == 0 {
            return Err(ExtractionError::EmptyDocument);
        }

        if !text.trim().is_empty() {
            tracing::info!(page_count, "Using text layer");
            return self.orchestrator.extract_from_text(&text).await;
        }

        tracing::info!(page_count, "No text layer, rendering pages");
        let renderer = Arc::clone(&self.renderer);
        let dpi = self.config().render_dpi;
        let max_dimension = self.config().max_image_dimension;
        let pages = run_blocking(move || {
            Ok(render_page_images(
                renderer.as_ref(),
                &pdf,
                page_count,
                dpi,
                max_dimension,
            ))
        })
        .await?;

        let pages = pages.into_iter().map(Arc::new).collect();
        Ok(self.orchestrator.extract_from_pages(pages).await)
    }

    async fn process_image(&self, bytes: &[u8]) -> Result<ExtractionRecord, ExtractionError> {
        let raw = bytes.to_vec();
        let max_dimension = self.config().max_image_dimension;
        let payload = run_blocking(move || Ok(image_payload(&raw, max_dimension))).await?;
        self.orchestrator.extract_from_image(&payload).await
    }
}

/// Base64 payload for a single uploaded image: bounded and re-encoded as PNG
/// when it decodes, the raw bytes otherwise.
fn image_payload(bytes: &[u8], max_dimension: u32) -> String {
    let encoded = image::load_from_memory(bytes)
        .map_err(|e| ExtractionError::ImageProcessing(e.to_string()))
        .and_then(|image| encode_png_base64(&downscale_to_fit(image, max_dimension)));

    match encoded {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, "Sending image bytes unchanged");
            base64::engine::general_purpose::STANDARD.encode(bytes)
        }
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, ExtractionError>
where
    F: FnOnce() -> Result<T, ExtractionError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ExtractionError::TaskFailed(e.to_string()))?
}
