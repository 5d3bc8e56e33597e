use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use super::confidence::{combine_results, completeness_score, is_good_result};
use super::parser::parse_extraction_response;
use super::pdf_renderer::encode_png_base64;
use super::prompt::PATIENT_EXTRACTION_PROMPT;
use super::service::ExtractionClient;
use super::task_group::{GroupEvent, TaskGroup, TaskOutcome};
use super::types::{ExtractionRecord, PageImage};
use super::ExtractionError;
use crate::pipeline_config::PipelineConfig;

/// Notes of the record returned when not a single page produced a result.
pub const EXHAUSTED_NOTE: &str = "Failed to process any pages with Vision API";

/// Drives extraction for one document: a single text-layer call, or
/// batched concurrent page extraction with early stopping.
pub struct PageExtractionOrchestrator {
    client: Arc<dyn ExtractionClient>,
    config: PipelineConfig,
}

impl PageExtractionOrchestrator {
    pub fn new(client: Arc<dyn ExtractionClient>, config: PipelineConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract from one already-encoded image with a single service call.
    pub async fn extract_from_image(
        &self,
        image_base64: &str,
    ) -> Result<ExtractionRecord, ExtractionError> {
        tracing::info!(
            provider = self.client.name(),
            payload_len = image_base64.len(),
            "Extracting from single image"
        );
        let response = self
            .client
            .extract_from_image(PATIENT_EXTRACTION_PROMPT, image_base64)
            .await?;
        Ok(parse_extraction_response(&response))
    }

    /// Extract from a document's text layer with one service call.
    pub async fn extract_from_text(&self, text: &str) -> Result<ExtractionRecord, ExtractionError> {
        tracing::info!(
            provider = self.client.name(),
            text_len = text.len(),
            "Extracting from text layer"
        );
        let response = self
            .client
            .extract_from_text(PATIENT_EXTRACTION_PROMPT, text)
            .await?;
        Ok(parse_extraction_response(&response))
    }

    /// Extract from rendered pages.
    ///
    /// Pages run in concurrent batches; the first good result stops all work.
    /// If the concurrent pass itself breaks, its partial results are dropped
    /// and the pages are retried one at a time. Never fails: with no usable
    /// page the exhaustion record is returned.
    pub async fn extract_from_pages(&self, pages: Vec<Arc<PageImage>>) -> ExtractionRecord {
        let start = Instant::now();
        let total_pages = pages.len();

        let results = match self.run_batches(&pages).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "Parallel extraction failed, falling back to sequential");
                self.run_sequential(&pages).await
            }
        };

        tracing::info!(
            total_pages,
            results = results.len(),
            elapsed_ms = %start.elapsed().as_millis(),
            "Page extraction finished"
        );

        if results.is_empty() {
            return ExtractionRecord::not_found(EXHAUSTED_NOTE);
        }
        combine_results(results)
    }

    async fn run_batches(
        &self,
        pages: &[Arc<PageImage>],
    ) -> Result<Vec<ExtractionRecord>, ExtractionError> {
        let mut results = Vec::new();
        let batch_size = self.config.batch_size.max(1);

        for (batch_index, batch) in pages.chunks(batch_size).enumerate() {
            tracing::debug!(batch = batch_index + 1, pages = batch.len(), "Starting batch");

            let deadline = tokio::time::Instant::now() + self.config.batch_timeout();
            let mut group = TaskGroup::new(self.config.page_timeout());
            for page in batch {
                let client = Arc::clone(&self.client);
                let page = Arc::clone(page);
                group.spawn(page.page_number, async move {
                    extract_page(client.as_ref(), &page).await
                });
            }

            loop {
                match group.next_until(deadline).await? {
                    GroupEvent::Settled(settled) => {
                        let page = settled.key;
                        if let Some(record) = Self::accept(page, settled.outcome) {
                            let good = is_good_result(&record);
                            results.push(record);
                            if good {
                                tracing::info!(page, "Good result, stopping early");
                                return Ok(results);
                            }
                        }
                    }
                    GroupEvent::DeadlineElapsed { abandoned } => {
                        tracing::warn!(
                            batch = batch_index + 1,
                            abandoned,
                            timeout_secs = self.config.batch_timeout_secs,
                            "Batch deadline elapsed, abandoning pending pages"
                        );
                        break;
                    }
                    GroupEvent::Exhausted => break,
                }
            }
        }

        Ok(results)
    }

    async fn run_sequential(&self, pages: &[Arc<PageImage>]) -> Vec<ExtractionRecord> {
        let mut results = Vec::new();

        for page in pages {
            let mut group = TaskGroup::new(self.config.page_timeout());
            let client = Arc::clone(&self.client);
            let owned = Arc::clone(page);
            group.spawn(page.page_number, async move {
                extract_page(client.as_ref(), &owned).await
            });

            // The per-task timeout fires first; the deadline only bounds a runaway join.
            let deadline = tokio::time::Instant::now() + self.config.page_timeout() * 2;
            let record = match group.next_until(deadline).await {
                Ok(GroupEvent::Settled(settled)) => Self::accept(settled.key, settled.outcome),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(page = page.page_number, error = %e, "Skipping page");
                    None
                }
            };

            if let Some(record) = record {
                let good = is_good_result(&record);
                results.push(record);
                if good {
                    tracing::info!(page = page.page_number, "Good result, stopping early");
                    break;
                }
            }
        }

        results
    }

    /// Keep a completed page's record; log and drop anything else.
    fn accept(page: usize, outcome: TaskOutcome<ExtractionRecord>) -> Option<ExtractionRecord> {
        match outcome {
            TaskOutcome::Completed(record) => Some(record),
            TaskOutcome::Failed(e @ ExtractionError::Timeout { .. }) => {
                tracing::warn!(page, error = %e, "Page extraction timed out, skipping");
                None
            }
            TaskOutcome::Failed(e) => {
                tracing::warn!(page, error = %e, "Page extraction failed, skipping");
                None
            }
        }
    }
}

/// One page: PNG-encode, ask the service, parse.
async fn extract_page(
    client: &dyn ExtractionClient,
    page: &PageImage,
) -> Result<ExtractionRecord, ExtractionError> {
    let span = tracing::info_span!(
        "extract_page",
        page = page.page_number,
        total_pages = page.total_pages,
        provider = client.name(),
    );

    async {
        let start = Instant::now();
        let image_base64 = encode_png_base64(&page.image)?;
        let response = client
            .extract_from_image(PATIENT_EXTRACTION_PROMPT, &image_base64)
            .await?;
        let record = parse_extraction_response(&response);

        tracing::info!(
            confidence = %record.confidence,
            score = completeness_score(&record),
            elapsed_ms = %start.elapsed().as_millis(),
            "Page extracted"
        );
        Ok::<_, ExtractionError>(record)
    }
    .instrument(span)
    .await
}
