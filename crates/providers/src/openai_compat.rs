//! OpenAI-compatible backend implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, llama.cpp server, Groq,
//! Together AI, and any endpoint exposing `/v1/chat/completions`.
//!
//! The rendered prompt is sent as a single user message. With streaming on,
//! the SSE response is read by a background task and forwarded through a
//! bounded channel, so the reader never runs more than `channel_capacity`
//! fragments ahead of the consumer. Dropping the returned stream closes the
//! channel; the reader notices on its next send and abandons the response.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use promptline_core::error::BackendError;
use promptline_core::provider::{FragmentStream, GenerationBackend, GenerationConfig};
use promptline_core::template::RenderedPrompt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// An OpenAI-compatible generation backend.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    channel_capacity: usize,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible backend.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: build_client(DEFAULT_TIMEOUT),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Set the whole-request timeout for backend calls.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// Set how many fragments may be buffered ahead of the consumer.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    fn request_body(prompt: &RenderedPrompt, config: &GenerationConfig) -> serde_json::Value {
        serde_json::json!({
            "model": config.model,
            "messages": [ApiMessage {
                role: "user".into(),
                content: Some(prompt.as_str().to_string()),
            }],
            "temperature": config.temperature,
            "stream": config.streaming,
        })
    }

    async fn send(&self, body: &serde_json::Value, streaming: bool) -> Result<reqwest::Response, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if streaming {
            request = request.header("Accept", "text/event-stream");
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        check_status(response).await
    }

    async fn complete(
        &self,
        prompt: RenderedPrompt,
        config: &GenerationConfig,
    ) -> Result<FragmentStream, BackendError> {
        let body = Self::request_body(&prompt, config);
        debug!(backend = %self.name, model = %config.model, "Sending completion request");

        let response = self.send(&body, false).await?;
        let api_response: ApiResponse =
            response.json().await.map_err(|e| BackendError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?
            .message
            .content
            .unwrap_or_default();

        Ok(Box::pin(futures::stream::iter(std::iter::once(Ok(content)))))
    }

    async fn stream(
        &self,
        prompt: RenderedPrompt,
        config: &GenerationConfig,
    ) -> Result<FragmentStream, BackendError> {
        let body = Self::request_body(&prompt, config);
        debug!(backend = %self.name, model = %config.model, "Sending streaming request");

        let response = self.send(&body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(self.channel_capacity);
        let backend_name = self.name.clone();

        // Spawn task to read the SSE byte stream and forward content deltas
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::default();
            let mut completed = false;

            loop {
                let (pending, eof) = match byte_stream.next().await {
                    Some(Ok(bytes)) => (lines.push(&bytes), false),
                    Some(Err(e)) => {
                        let _ = tx
                            .send(Err(BackendError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                    None => (lines.finish(), true),
                };

                for line in pending {
                    match decode_line(&line) {
                        SseEvent::Skip => {}
                        SseEvent::Done => {
                            trace!(backend = %backend_name, "Received [DONE]");
                            return;
                        }
                        SseEvent::Failed(err) => {
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                        SseEvent::Delta { content, finished } => {
                            completed |= finished;
                            if let Some(content) = content {
                                if tx.send(Ok(content)).await.is_err() {
                                    debug!(backend = %backend_name, "Consumer dropped, abandoning stream");
                                    return;
                                }
                            }
                        }
                    }
                }

                if eof {
                    break;
                }
            }

            // Stream ended without [DONE]; only a finish_reason makes that clean.
            if !completed {
                warn!(backend = %backend_name, "Stream ended before generation completed");
                let _ = tx
                    .send(Err(BackendError::StreamInterrupted(
                        "stream ended before generation completed".into(),
                    )))
                    .await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[async_trait]
impl GenerationBackend for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: RenderedPrompt,
        config: &GenerationConfig,
    ) -> Result<FragmentStream, BackendError> {
        if config.streaming {
            self.stream(prompt, config).await
        } else {
            self.complete(prompt, config).await
        }
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build HTTP client with timeout, using defaults");
            reqwest::Client::new()
        })
}

/// Map non-success statuses to backend errors before any output is read.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status().as_u16();

    if status == 429 {
        return Err(BackendError::RateLimited {
            retry_after_secs: retry_after(&response).unwrap_or(5),
        });
    }

    if (200..300).contains(&status) {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    warn!(status, body = %error_body, "Backend returned error");

    if status == 401 {
        let message = error_message(&error_body)
            .unwrap_or_else(|| "Invalid API key".to_string());
        return Err(BackendError::AuthenticationFailed(message));
    }

    Err(BackendError::ApiError {
        status_code: status,
        message: error_message(&error_body).unwrap_or(error_body),
    })
}

/// Pull `error.message` out of an OpenAI-style error body. Falls back to
/// the raw body text when it is not JSON but still says something.
fn error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message")?.as_str().map(str::to_string));
    parsed.or_else(|| {
        let trimmed = body.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

// --- SSE decoding ---

/// Splits an incoming byte stream into complete lines.
///
/// Bytes are buffered until a newline arrives so multi-byte characters split
/// across network chunks decode intact.
#[derive(Default)]
struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            lines.push(text.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Flush a trailing line that had no newline.
    fn finish(&mut self) -> Vec<String> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.buffer);
        vec![String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string()]
    }
}

#[derive(Debug)]
enum SseEvent {
    /// Blank line, comment, or a field we don't use.
    Skip,
    /// `data: [DONE]`
    Done,
    /// The backend reported an error inside the stream.
    Failed(BackendError),
    /// A content delta, possibly carrying a finish reason.
    Delta {
        content: Option<String>,
        finished: bool,
    },
}

fn decode_line(line: &str) -> SseEvent {
    // Skip empty lines, SSE comments, and non-data fields
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();
    if data.is_empty() {
        return SseEvent::Skip;
    }
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => {
            if let Some(err) = resp.error {
                return SseEvent::Failed(BackendError::ApiError {
                    status_code: 500,
                    message: err.message,
                });
            }
            let mut content = String::new();
            let mut finished = false;
            for choice in resp.choices {
                if let Some(text) = choice.delta.content {
                    content.push_str(&text);
                }
                finished |= choice.finish_reason.is_some();
            }
            SseEvent::Delta {
                content: (!content.is_empty()).then_some(content),
                finished,
            }
        }
        Err(e) => {
            // A chunk we cannot read may have carried text; ending cleanly
            // later would hide the loss.
            warn!(data = %data, error = %e, "Unparseable SSE chunk");
            SseEvent::Failed(BackendError::StreamInterrupted(format!(
                "unparseable stream chunk: {e}"
            )))
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}
