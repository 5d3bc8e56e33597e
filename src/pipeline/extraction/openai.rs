//! OpenAI chat-completions client for patient field extraction.
//!
//! Text requests go to the text model as a single user message. Image requests
//! go to the vision model as a text part plus an `image_url` data URL part.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::prompt::text_extraction_message;
use super::service::{ExtractionClient, ServiceError};
use crate::config;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4";

const MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f32 = 0.1;

/// Connection settings for [`OpenAiClient`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub vision_model: String,
    pub text_model: String,
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            timeout_secs: 90,
        }
    }

    /// Read settings from the environment. The API key is mandatory.
    pub fn from_env() -> Result<Self, ServiceError> {
        let api_key = std::env::var(config::ENV_OPENAI_API_KEY)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ServiceError::MissingApiKey)?;

        let mut cfg = Self::new(api_key);
        if let Ok(url) = std::env::var(config::ENV_OPENAI_BASE_URL) {
            cfg.base_url = url;
        }
        if let Ok(model) = std::env::var(config::ENV_VISION_MODEL) {
            cfg.vision_model = model;
        }
        if let Ok(model) = std::env::var(config::ENV_TEXT_MODEL) {
            cfg.text_model = model;
        }
        Ok(cfg)
    }
}

/// Hosted extraction client backed by the OpenAI chat-completions API.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    vision_model: String,
    text_model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(cfg: OpenAiConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key,
            vision_model: cfg.vision_model,
            text_model: cfg.text_model,
            client,
            timeout_secs: cfg.timeout_secs,
        })
    }

    async fn complete(&self, body: &ChatCompletionRequest<'_>) -> Result<String, ServiceError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ServiceError::NotReachable(self.base_url.clone())
                } else if e.is_timeout() {
                    ServiceError::Timeout(self.timeout_secs)
                } else {
                    ServiceError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;

        first_choice_content(parsed)
    }
}

#[async_trait]
impl ExtractionClient for OpenAiClient {
    async fn extract_from_text(&self, prompt: &str, text: &str) -> Result<String, ServiceError> {
        let body = ChatCompletionRequest {
            model: &self.text_model,
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Text(text_extraction_message(prompt, text)),
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        tracing::debug!(model = %self.text_model, text_len = text.len(), "Text extraction request");
        self.complete(&body).await
    }

    async fn extract_from_image(
        &self,
        prompt: &str,
        image_base64: &str,
    ) -> Result<String, ServiceError> {
        let body = ChatCompletionRequest {
            model: &self.vision_model,
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image_data_url(image_base64),
                        },
                    },
                ]),
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        tracing::debug!(
            model = %self.vision_model,
            payload_len = image_base64.len(),
            "Vision extraction request"
        );
        self.complete(&body).await
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ──────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(String),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn first_choice_content(response: ChatCompletionResponse) -> Result<String, ServiceError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or(ServiceError::EmptyResponse)
}

/// Map a non-success HTTP status to the service error taxonomy.
fn classify_status(status: u16, body: String) -> ServiceError {
    match status {
        429 => ServiceError::QuotaExceeded(body),
        _ => ServiceError::ApiError {
            status,
            message: body,
        },
    }
}

/// Build a data URL, sniffing the image type from the base64 prefix.
fn image_data_url(image_base64: &str) -> String {
    let mime = if image_base64.starts_with("iVBORw0KGgo") {
        "image/png"
    } else if image_base64.starts_with("R0lGOD") {
        "image/gif"
    } else if image_base64.starts_with("UklGR") {
        "image/webp"
    } else {
        "image/jpeg"
    };
    format!("data:{mime};base64,{image_base64}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trims_trailing_slash() {
        let mut cfg = OpenAiConfig::new("sk-test");
        cfg.base_url = "http://localhost:8080/v1/".into();
        let client = OpenAiClient::new(cfg).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn default_models() {
        let cfg = OpenAiConfig::new("k");
        assert_eq!(cfg.vision_model, "gpt-4o-mini");
        assert_eq!(cfg.text_model, "gpt-4");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn vision_request_serializes_text_and_image_parts() {
        let body = ChatCompletionRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text { text: "extract" },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image_data_url("iVBORw0KGgoAAA"),
                        },
                    },
                ]),
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let json = serde_json::to_value(&body).unwrap();
        let parts = &json["messages"][0]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[0]["text"], "extract");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(
            parts[1]["image_url"]["url"],
            "data:image/png;base64,iVBORw0KGgoAAA"
        );
        assert_eq!(json["max_tokens"], 1000);
    }

    #[test]
    fn text_request_serializes_plain_content() {
        let body = ChatCompletionRequest {
            model: "gpt-4",
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Text("hello".into()),
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["content"], "hello");
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn data_url_sniffs_common_formats() {
        assert!(image_data_url("/9j/4AAQ").starts_with("data:image/jpeg;base64,"));
        assert!(image_data_url("R0lGODlh").starts_with("data:image/gif;base64,"));
        assert!(image_data_url("UklGRiQA").starts_with("data:image/webp;base64,"));
        assert!(image_data_url("Qk0").starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn status_429_is_quota() {
        assert_eq!(
            classify_status(429, "slow down".into()),
            ServiceError::QuotaExceeded("slow down".into())
        );
        assert!(matches!(
            classify_status(503, String::new()),
            ServiceError::ApiError { status: 503, .. }
        ));
    }

    #[test]
    fn response_content_extraction() {
        let parsed: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"x\":1}"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_content(parsed).unwrap(), "{\"x\":1}");

        let empty: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(first_choice_content(empty), Err(ServiceError::EmptyResponse));

        let null_content: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert_eq!(
            first_choice_content(null_content),
            Err(ServiceError::EmptyResponse)
        );
    }
}
