pub mod types;
pub mod prompt;
pub mod service;
pub mod openai;
pub mod parser;
pub mod confidence;
pub mod pdf_renderer;
pub mod pdfium;
pub mod task_group;
pub mod orchestrator;

pub use types::*;
pub use confidence::*;
pub use parser::*;
pub use orchestrator::*;
pub use service::{ExtractionClient, ServiceError};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Extraction service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Page {page} timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    #[error("Failed to load PDF: {0}")]
    PdfLoad(String),

    #[error("PDF is password-protected")]
    PdfEncrypted,

    #[error("PDF has no pages")]
    EmptyDocument,

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Unsupported file type '{mime_type}' for '{filename}'")]
    UnsupportedFormat { filename: String, mime_type: String },

    #[error("File is too large ({size} bytes, maximum is {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("Too many extraction requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Extraction task failed unexpectedly: {0}")]
    TaskFailed(String),
}
