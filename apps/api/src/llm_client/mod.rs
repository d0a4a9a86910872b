/// LLM Client: the single point of entry for all chat-completion calls.
///
/// ARCHITECTURAL RULE: No other module may call an LLM provider directly.
/// Model and key selection happens in `ai_gateway`; this module only speaks
/// the OpenAI-compatible wire protocol to whatever `ModelTarget` it is given.
use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;
pub mod sse;

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("AI service not configured: {0}")]
    NotConfigured(String),

    #[error("Stream interrupted: {0}")]
    Stream(String),
}

/// Incremental text fragments of a streamed completion.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Where a request goes and how it authenticates.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTarget {
    pub api_key: String,
    pub model_slug: String,
    pub base_url: String,
    pub supports_json_mode: bool,
}

impl ModelTarget {
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// A single system/user exchange.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

impl<'a> CompletionBody<'a> {
    fn new(target: &'a ModelTarget, request: &ChatRequest<'a>, stream: bool, json: bool) -> Self {
        Self {
            model: &target.model_slug,
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.user,
                },
            ],
            stream,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: json.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl CompletionResponse {
    /// Text of the first choice.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// The single LLM client used by all services.
/// Wraps the chat-completions API with retry logic and structured output helpers.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
}

impl LlmClient {
    pub fn new(timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    /// Blocking completion, returning the trimmed text of the first choice.
    pub async fn complete(
        &self,
        target: &ModelTarget,
        request: &ChatRequest<'_>,
    ) -> Result<String, LlmError> {
        let body = CompletionBody::new(target, request, false, false);
        let response: CompletionResponse = self.send_with_retry(target, &body).await?.json().await?;
        log_usage(target, &response);

        let text = response.text().map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(text.to_string())
    }

    /// Completion whose text is deserialized as JSON.
    /// Uses the provider's JSON mode when the model supports it, otherwise
    /// strips markdown fences before parsing.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        target: &ModelTarget,
        request: &ChatRequest<'_>,
    ) -> Result<T, LlmError> {
        let body = CompletionBody::new(target, request, false, target.supports_json_mode);
        let response: CompletionResponse = self.send_with_retry(target, &body).await?.json().await?;
        log_usage(target, &response);

        let text = response.text().ok_or(LlmError::EmptyContent)?;
        let text = if target.supports_json_mode {
            text.trim()
        } else {
            strip_json_fences(text)
        };

        serde_json::from_str(text).map_err(LlmError::Parse)
    }

    /// Streaming completion. Retries only apply to establishing the stream;
    /// once bytes flow, errors surface as stream items.
    pub async fn stream(
        &self,
        target: &ModelTarget,
        request: &ChatRequest<'_>,
    ) -> Result<TextStream, LlmError> {
        let body = CompletionBody::new(target, request, true, false);
        let response = self.send_with_retry(target, &body).await?;
        Ok(Box::pin(sse::delta_stream(response.bytes_stream())))
    }

    /// Retries on transport errors, 429 and 5xx with exponential backoff.
    async fn send_with_retry(
        &self,
        target: &ModelTarget,
        body: &CompletionBody<'_>,
    ) -> Result<reqwest::Response, LlmError> {
        if target.api_key.is_empty() {
            return Err(LlmError::NotConfigured(format!(
                "no API key for model '{}'",
                target.model_slug
            )));
        }

        let endpoint = target.endpoint();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self
                .client
                .post(&endpoint)
                .bearer_auth(&target.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let raw = response.text().await.unwrap_or_default();
                    let message = serde_json::from_str::<ProviderError>(&raw)
                        .map(|e| e.error.message)
                        .unwrap_or(raw);
                    let error = LlmError::Api {
                        status: status.as_u16(),
                        message,
                    };
                    if !is_retryable(status) {
                        return Err(error);
                    }
                    error
                }
                Err(e) => LlmError::Http(e),
            };

            if attempt >= MAX_ATTEMPTS {
                return Err(match error {
                    LlmError::Api { status: 429, .. } => LlmError::RateLimited {
                        retries: MAX_ATTEMPTS - 1,
                    },
                    other => other,
                });
            }

            let delay = backoff(attempt);
            warn!(
                model = %target.model_slug,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Chat completion failed, retrying: {error}"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// 429 and 5xx are worth another attempt; other client errors are not.
fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Delay after the given (1-based) failed attempt: 1s, 2s, 4s...
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

fn log_usage(target: &ModelTarget, response: &CompletionResponse) {
    if let Some(usage) = &response.usage {
        debug!(
            model = %target.model_slug,
            "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
            usage.prompt_tokens, usage.completion_tokens
        );
    }
}

/// Removes a surrounding markdown code fence (with or without a language
/// tag) from model output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json", "JSON", ...) on the opening line.
    let inner = match inner.split_once('\n') {
        Some((tag, rest)) if !tag.trim_start().starts_with('{') => rest,
        _ => inner,
    };
    inner.trim().strip_suffix("```").unwrap_or(inner).trim()
}
