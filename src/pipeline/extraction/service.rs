//! Boundary to the hosted AI extraction service.
//!
//! The service is a black box that takes a prompt plus either document text or
//! a base64 image and answers with free text, usually JSON-shaped. This layer
//! never retries and never interprets the answer; timeouts and fallback belong
//! to the orchestrator, shape handling belongs to the parser.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

// ──────────────────────────────────────────────
// Error taxonomy
// ──────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Extraction service is not reachable at {0}")]
    NotReachable(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Extraction service returned an error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Extraction service quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Malformed service response: {0}")]
    MalformedResponse(String),

    #[error("Extraction service returned no content")]
    EmptyResponse,

    #[error("Network error: {0}")]
    Network(String),

    #[error("No API key configured for the extraction service")]
    MissingApiKey,
}

// ──────────────────────────────────────────────
// Client trait
// ──────────────────────────────────────────────

/// Uniform interface over the AI extraction capability.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Ask the service to extract fields from a document's text layer.
    async fn extract_from_text(&self, prompt: &str, text: &str) -> Result<String, ServiceError>;

    /// Ask the service to extract fields from a base64-encoded image.
    async fn extract_from_image(
        &self,
        prompt: &str,
        image_base64: &str,
    ) -> Result<String, ServiceError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

// ──────────────────────────────────────────────
// MockExtractionClient (testing)
// ──────────────────────────────────────────────

/// Scripted reply of [`MockExtractionClient`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(String),
    Fail(ServiceError),
    /// Wait (on the tokio clock) before producing the inner reply.
    Delay(Duration, Box<MockReply>),
    /// Panic inside the calling task.
    Panic,
}

impl MockReply {
    pub fn respond(text: impl Into<String>) -> Self {
        Self::Respond(text.into())
    }

    pub fn delayed(self, by: Duration) -> Self {
        Self::Delay(by, Box::new(self))
    }
}

type ImageResponder = dyn Fn(&str) -> MockReply + Send + Sync;

/// Mock client for tests.
///
/// Text requests always get `text_reply`. Image requests are answered by a
/// responder closure that sees the base64 payload, so tests can tell pages
/// apart by their content rather than by call order.
pub struct MockExtractionClient {
    text_reply: MockReply,
    image_responder: Arc<ImageResponder>,
    text_calls: AtomicUsize,
    image_calls: AtomicUsize,
    last_text: Mutex<Option<String>>,
}

impl MockExtractionClient {
    /// Same canned response for text and image requests.
    pub fn new(response: &str) -> Self {
        let reply = MockReply::respond(response);
        let image_reply = reply.clone();
        Self {
            text_reply: reply,
            image_responder: Arc::new(move |_| image_reply.clone()),
            text_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
            last_text: Mutex::new(None),
        }
    }

    pub fn failing(error: ServiceError) -> Self {
        Self::new("").with_text_reply(MockReply::Fail(error.clone())).with_image_responder(
            move |_| MockReply::Fail(error.clone()),
        )
    }

    pub fn with_text_reply(mut self, reply: MockReply) -> Self {
        self.text_reply = reply;
        self
    }

    pub fn with_image_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str) -> MockReply + Send + Sync + 'static,
    {
        self.image_responder = Arc::new(responder);
        self
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    /// Document text received by the most recent text request.
    pub fn last_text(&self) -> Option<String> {
        self.last_text.lock().ok().and_then(|guard| guard.clone())
    }

    async fn play(reply: MockReply) -> Result<String, ServiceError> {
        let mut reply = reply;
        loop {
            match reply {
                MockReply::Respond(text) => return Ok(text),
                MockReply::Fail(err) => return Err(err),
                MockReply::Delay(by, inner) => {
                    tokio::time::sleep(by).await;
                    reply = *inner;
                }
                MockReply::Panic => panic!("mock extraction client panicked"),
            }
        }
    }
}

#[async_trait]
impl ExtractionClient for MockExtractionClient {
    async fn extract_from_text(&self, _prompt: &str, text: &str) -> Result<String, ServiceError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_text.lock() {
            *last = Some(text.to_string());
        }
        Self::play(self.text_reply.clone()).await
    }

    async fn extract_from_image(
        &self,
        _prompt: &str,
        image_base64: &str,
    ) -> Result<String, ServiceError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        let reply = (self.image_responder)(image_base64);
        Self::play(reply).await
    }

    fn name(&self) -> &str {
        "mock"
    }
}
