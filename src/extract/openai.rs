//! OpenAI-compatible chat completions backend.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::ExtractionError;
use crate::extract::StoryExtractor;
use crate::extract::prompt::{build_prompt, parse_stories_response};
use crate::mail::ParsedMessage;
use crate::stories::ExtractedStory;

const PROVIDER: &str = "openai";

/// Longest slice of an error body quoted in an error message.
const ERROR_BODY_PREVIEW: usize = 300;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    response_format: ResponseFormat,
    max_completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Extracts stories with one JSON-mode chat completion per message.
pub struct OpenAiExtractor {
    client: reqwest::Client,
    config: LlmConfig,
    endpoint: String,
    timeout: Duration,
}

impl OpenAiExtractor {
    /// `timeout` bounds each HTTP exchange, connect through body.
    pub fn new(config: LlmConfig, timeout: Duration) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            config,
            endpoint,
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn request_error(&self, err: reqwest::Error) -> ExtractionError {
        if err.is_timeout() {
            ExtractionError::Timeout(self.timeout)
        } else {
            ExtractionError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl StoryExtractor for OpenAiExtractor {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn extract(
        &self,
        message: &ParsedMessage,
    ) -> Result<Vec<ExtractedStory>, ExtractionError> {
        let prompt = build_prompt(&message.subject, &message.body);
        let request = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: &prompt,
            }],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            max_completion_tokens: self.config.max_tokens,
        };

        debug!(
            model = %self.config.model,
            prompt_chars = prompt.len(),
            "Requesting story extraction"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(ExtractionError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP {status}: {preview}"),
            });
        }

        let body = response.text().await.map_err(|e| self.request_error(e))?;
        let chat: ChatResponse =
            serde_json::from_str(&body).map_err(|e| ExtractionError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: format!("Malformed completion body: {e}"),
            })?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ExtractionError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "No choices in completion".to_string(),
            })?;

        let stories = parse_stories_response(PROVIDER, &content)?;
        debug!(count = stories.len(), "Extraction response parsed");
        Ok(stories)
    }
}
