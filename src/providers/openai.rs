//! OpenAI-compatible client for chat completions and embeddings.
//!
//! Works against any endpoint speaking the OpenAI REST dialect
//! (`/chat/completions`, `/embeddings`), which covers most hosted and
//! self-hosted model servers.
//!
//! Streamed completions (`"stream": true`) arrive as server-sent events;
//! each `data:` line carries one chunk and `data: [DONE]` ends the answer.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::traits::{EmbeddingModel, EmbeddingVector, TextModel};
use crate::{HuginError, Result};

/// Default base URL for the OpenAI API.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// System message sent ahead of every completion prompt.
const SYSTEM_PROMPT: &str = "you are a helpful assistant";

/// Client configuration, usually taken straight from a model config map.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub model: String,
    /// Sampling temperature for completions (default: 0.7).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Requested embedding size, forwarded as `dimensions`.
    #[serde(default)]
    pub vector_dimensions: Option<usize>,
    /// HTTP timeout in seconds (default: 60).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Request streamed completions; `complete` then joins the chunks.
    #[serde(default)]
    pub stream: bool,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout() -> u64 {
    60
}

/// Client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    http: Client,
}

impl OpenAiClient {
    /// Create a client from a typed config.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HuginError::Http(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// Create a client from a JSON model config.
    ///
    /// Unknown keys (such as `type`) are ignored.
    pub fn from_config(config: &Value) -> Result<Self> {
        let config: OpenAiConfig = serde_json::from_value(config.clone())
            .map_err(|e| HuginError::Configuration(format!("invalid openai config: {e}")))?;
        Self::new(config)
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        self.send(path, body)
            .await?
            .json()
            .await
            .map_err(|e| HuginError::Http(e.to_string()))
    }

    async fn send<B: Serialize>(&self, path: &str, body: &B) -> Result<Response> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| HuginError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED => HuginError::AuthenticationFailed,
                StatusCode::TOO_MANY_REQUESTS => HuginError::RateLimited,
                _ => HuginError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }
        Ok(response)
    }

    fn chat_request<'a>(&'a self, user: &'a str, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatRequestMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatRequestMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.config.temperature,
            stream,
        }
    }

    async fn request_stream(&self, prompt: &Value) -> Result<BoxStream<'static, String>> {
        let user = prompt_text(prompt);
        let response = self
            .send("chat/completions", &self.chat_request(&user, true))
            .await?;
        debug!(model = %self.config.model, "completion stream opened");
        Ok(delta_contents(response.bytes_stream().boxed()).boxed())
    }
}

fn prompt_text(prompt: &Value) -> String {
    match prompt {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl TextModel for OpenAiClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &Value) -> Result<String> {
        if self.config.stream {
            let chunks: Vec<String> = self.request_stream(prompt).await?.collect().await;
            return Ok(chunks.concat());
        }

        let user = prompt_text(prompt);
        let response: ChatResponseBody = self
            .post("chat/completions", &self.chat_request(&user, false))
            .await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(HuginError::EmptyResponse)
    }

    async fn complete_stream(&self, prompt: &Value) -> Result<BoxStream<'static, String>> {
        self.request_stream(prompt).await
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn dimensions(&self) -> Option<usize> {
        self.config.vector_dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
            dimensions: self.config.vector_dimensions,
        };

        let response: EmbeddingResponseBody = self.post("embeddings", &request).await?;
        let mut data = response.data;
        data.sort_by_key(|item| item.index);
        if data.len() != texts.len() {
            return Err(HuginError::DataError(format!(
                "embedding endpoint returned {} vectors for {} texts",
                data.len(),
                texts.len()
            )));
        }
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

// Wire types

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponseBody {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    #[serde(default)]
    delta: ChatStreamDelta,
}

#[derive(Default, Deserialize)]
struct ChatStreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponseBody {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Parser state for a streamed completion body.
struct DeltaReader<S> {
    body: S,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    finished: bool,
}

impl<S> DeltaReader<S> {
    /// Consume every complete line in the buffer.
    fn drain_lines(&mut self) {
        while !self.finished {
            let Some(end) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            self.accept_line(&String::from_utf8_lossy(&line));
        }
    }

    fn accept_line(&mut self, line: &str) {
        let Some(data) = line.trim().strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.finished = true;
            return;
        }
        match serde_json::from_str::<ChatStreamChunk>(data) {
            Ok(chunk) => self.pending.extend(
                chunk
                    .choices
                    .into_iter()
                    .take(1)
                    .filter_map(|choice| choice.delta.content)
                    .filter(|content| !content.is_empty()),
            ),
            Err(e) => warn!(error = %e, "skipping malformed completion chunk"),
        }
    }
}

/// Text deltas of a streamed chat completion body.
///
/// Stops at `[DONE]`, at the end of the body, or at the first transport
/// error (which is logged).
fn delta_contents<S, B, E>(body: S) -> impl Stream<Item = String> + Send + 'static
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let reader = DeltaReader {
        body,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };
    stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(content) = reader.pending.pop_front() {
                return Some((content, reader));
            }
            if reader.finished {
                return None;
            }
            match reader.body.next().await {
                Some(Ok(bytes)) => {
                    reader.buffer.extend_from_slice(bytes.as_ref());
                    reader.drain_lines();
                }
                Some(Err(e)) => {
                    warn!(error = %e, "completion stream interrupted");
                    reader.finished = true;
                }
                None => {
                    let rest = String::from_utf8_lossy(&reader.buffer).into_owned();
                    reader.buffer.clear();
                    reader.accept_line(&rest);
                    reader.finished = true;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_defaults() {
        let client =
            OpenAiClient::from_config(&json!({"type": "openai", "api_key": "k", "model": "m"}))
                .unwrap();
        assert_eq!(client.config().base_url, DEFAULT_BASE_URL);
        assert!((client.config().temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(client.config().vector_dimensions, None);
    }

    type Body = stream::Iter<std::vec::IntoIter<std::result::Result<String, String>>>;

    fn body(parts: &[&str]) -> Body {
        stream::iter(parts.iter().map(|p| Ok(p.to_string())).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn deltas_split_across_reads() {
        let chunks: Vec<String> = delta_contents(body(&[
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel",
            "lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n",
            "data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]))
        .collect()
        .await;
        assert_eq!(chunks, vec!["Hello", " world"]);
    }

    #[tokio::test]
    async fn malformed_lines_skipped_and_tail_flushed() {
        let chunks: Vec<String> = delta_contents(body(&[
            ": keep-alive\n",
            "data: not json\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"end\"}}]}",
        ]))
        .collect()
        .await;
        assert_eq!(chunks, vec!["end"]);
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let parts: Vec<std::result::Result<String, String>> = vec![
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n".to_string()),
            Err("reset".to_string()),
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n".to_string()),
        ];
        let chunks: Vec<String> = delta_contents(stream::iter(parts)).collect().await;
        assert_eq!(chunks, vec!["a"]);
    }

    #[test]
    fn config_missing_model_is_error() {
        let result = OpenAiClient::from_config(&json!({"api_key": "k"}));
        assert!(matches!(result, Err(HuginError::Configuration(_))));
    }
}
