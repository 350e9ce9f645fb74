use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

/// How request latency is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyMode {
    /// Wall clock from send to the fully parsed response body.
    FullResponse,
    /// Wall clock from send to the first streamed content token.
    FirstToken,
}

/// The outcome of one completed chat exchange.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Set only when the exchange ran in streaming mode.
    pub time_to_first_token: Option<Duration>,
}

/// The one capability the benchmarker needs from an endpoint: send a chat
/// completion, get back text, token usage, and timing. Implemented over HTTP
/// by [`OpenAIClient`] and by in-process mocks in tests.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        request: ChatCompletionRequest,
        mode: LatencyMode,
    ) -> Result<Completion, ClientError>;
}

// Request types for the OpenAI chat completions API.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

// Response types.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: Message,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

// Streaming response types (SSE chunks).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Delta {
    pub role: Option<String>,
    pub content: Option<String>,
}

// Models list response.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsResponse {
    pub data: Vec<Model>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Model {
    pub id: String,
    #[serde(default)]
    pub owned_by: String,
}

/// Configuration for creating an HTTP completion client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the OpenAI-compatible API endpoint
    pub base_url: String,
    /// Optional API key sent as a bearer token
    pub api_key: Option<String>,
    /// Request timeout duration
    pub timeout: Duration,
    /// Connection pool size (should match concurrency for optimal performance)
    pub pool_size: usize,
}

/// HTTP client for OpenAI-compatible chat completion endpoints.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAIClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.pool_size) // Match concurrency for optimal connection reuse
            .pool_idle_timeout(Duration::from_secs(300))
            .tcp_keepalive(Duration::from_secs(60))
            .http2_keep_alive_interval(Duration::from_secs(30))
            .http2_keep_alive_timeout(Duration::from_secs(20))
            .http2_keep_alive_while_idle(true)
            .build()
            .map_err(|e| ClientError::Other(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url,
            api_key: config.api_key,
            timeout: config.timeout,
        })
    }

    async fn post_completions(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<reqwest::Response, ClientError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut req = self.client.post(&url).json(request);
        if let Some(api_key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(ClientError::Http { status, message });
        }

        Ok(response)
    }

    async fn complete_blocking(
        &self,
        mut request: ChatCompletionRequest,
    ) -> Result<Completion, ClientError> {
        request.stream = Some(false);

        let response = self.post_completions(&request).await?;
        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(self.timeout)
            } else {
                ClientError::Parse(e.to_string())
            }
        })?;

        let text = completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(Completion {
            text,
            prompt_tokens: completion.usage.prompt_tokens,
            completion_tokens: completion.usage.completion_tokens,
            time_to_first_token: None,
        })
    }

    async fn complete_streaming(
        &self,
        mut request: ChatCompletionRequest,
    ) -> Result<Completion, ClientError> {
        request.stream = Some(true);

        let start = Instant::now();
        let mut response = self.post_completions(&request).await?;

        let mut text = String::new();
        let mut first_token: Option<Duration> = None;
        // Token count is approximate in streaming mode: one per content chunk.
        let mut completion_tokens: u64 = 0;

        'stream: loop {
            let bytes = response.chunk().await.map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout(self.timeout)
                } else {
                    ClientError::Parse(e.to_string())
                }
            })?;

            let Some(data) = bytes else {
                break;
            };

            for line in String::from_utf8_lossy(&data).lines() {
                match parse_sse_line(line) {
                    Some(SseEvent::Done) => break 'stream,
                    Some(SseEvent::Chunk(chunk)) => {
                        for choice in chunk.choices {
                            if let Some(content) = choice.delta.content {
                                if first_token.is_none() {
                                    first_token = Some(start.elapsed());
                                }
                                completion_tokens += 1;
                                text.push_str(&content);
                            }
                        }
                    }
                    None => {}
                }
            }
        }

        Ok(Completion {
            text,
            prompt_tokens: 0,
            completion_tokens,
            time_to_first_token: first_token,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    async fn complete(
        &self,
        request: ChatCompletionRequest,
        mode: LatencyMode,
    ) -> Result<Completion, ClientError> {
        match mode {
            LatencyMode::FullResponse => self.complete_blocking(request).await,
            LatencyMode::FirstToken => self.complete_streaming(request).await,
        }
    }
}

enum SseEvent {
    Chunk(ChatCompletionChunk),
    Done,
}

fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let payload = line.strip_prefix("data: ")?;
    if payload == "[DONE]" {
        return Some(SseEvent::Done);
    }
    serde_json::from_str::<ChatCompletionChunk>(payload)
        .ok()
        .map(SseEvent::Chunk)
}

/// Classify a reqwest transport failure into the client error taxonomy.
fn transport_error(e: reqwest::Error, timeout: Duration) -> ClientError {
    if e.is_connect() {
        ClientError::Connection(e.to_string())
    } else if e.is_timeout() {
        ClientError::Timeout(timeout)
    } else if e.is_request() {
        let message = e.to_string();
        if message.contains("connection closed")
            || message.contains("connection reset")
            || message.contains("broken pipe")
            || message.contains("connection refused")
        {
            ClientError::Connection(message)
        } else {
            ClientError::Other(message)
        }
    } else {
        ClientError::Other(e.to_string())
    }
}

/// List the models the server advertises at `{base_url}/models`.
pub async fn list_models(
    base_url: &str,
    api_key: Option<&str>,
    timeout: Duration,
) -> Result<Vec<Model>, ClientError> {
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ClientError::Other(e.to_string()))?;

    let url = format!("{}/models", base_url);
    let mut req = client.get(&url);
    if let Some(key) = api_key {
        req = req.header("Authorization", format!("Bearer {}", key));
    }

    let response = req.send().await.map_err(|e| transport_error(e, timeout))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read response".to_string());
        return Err(ClientError::Http { status, message });
    }

    let models: ModelsResponse = response
        .json()
        .await
        .map_err(|e| ClientError::Parse(e.to_string()))?;

    Ok(models.data)
}

/// Query the server for its models and pick the first one.
///
/// All OpenAI-compatible backends support the models endpoint, so this works
/// against vLLM, TGI, llama.cpp, Ollama and the hosted gateways alike.
pub async fn detect_model(
    base_url: &str,
    api_key: Option<&str>,
    timeout: Duration,
) -> Result<String, ClientError> {
    let models = list_models(base_url, api_key, timeout).await?;

    let Some(first) = models.first() else {
        return Err(ClientError::Other(format!(
            "no models available from server at {}/models",
            base_url
        )));
    };

    if models.len() > 1 {
        log::info!("Found {} models, using: {}", models.len(), first.id);
        log::debug!(
            "Available models: {:?}",
            models.iter().map(|m| &m.id).collect::<Vec<_>>()
        );
    } else {
        log::info!("Detected model: {}", first.id);
    }

    Ok(first.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_content_line() {
        let line = r#"data: {"id":"c1","choices":[{"delta":{"role":null,"content":"hi"},"finish_reason":null}]}"#;
        match parse_sse_line(line) {
            Some(SseEvent::Chunk(chunk)) => {
                assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hi"));
            }
            _ => panic!("expected a content chunk"),
        }
    }

    #[test]
    fn test_parse_sse_done_marker() {
        assert!(matches!(
            parse_sse_line("data: [DONE]"),
            Some(SseEvent::Done)
        ));
    }

    #[test]
    fn test_parse_sse_ignores_non_data_lines() {
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line("event: ping").is_none());
    }

    #[test]
    fn test_response_parses_without_optional_metadata() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 34}
        }"#;
        let response: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.choices[0].message.content, "hello");
        assert_eq!(response.usage.prompt_tokens, 12);
        assert_eq!(response.usage.completion_tokens, 34);
        assert_eq!(response.usage.total_tokens, 0);
    }
}
