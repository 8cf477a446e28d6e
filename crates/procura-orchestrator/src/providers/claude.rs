// Anthropic messages API client
//
// Implements `ProviderClient` over the HTTP messages endpoint: a streaming
// call returning server-sent events, and the plain JSON call used for the
// follow-up request. SSE frames are split on blank lines and handed to the
// stream decoder as raw events; this module never interprets frame payloads.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

use crate::error::{OrchestrationError, Result};
use crate::provider::{
    ChatMessage, ContentPart, ProviderClient, ProviderMessage, RawEvent, RawEventStream,
    TokenUsage, ToolDefinition, TurnRequest,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the Anthropic messages API
#[derive(Debug, Clone)]
pub struct ClaudeClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ClaudeClient {
    /// Create a client against the public API endpoint
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the endpoint base URL (proxies, test servers)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post_messages(
        &self,
        request: &TurnRequest,
        tools: &[ToolDefinition],
        stream: bool,
    ) -> Result<reqwest::Response> {
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            stream,
            system: request.system.as_deref(),
            temperature: request.temperature,
            messages: &request.messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestrationError::ProviderConnection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(OrchestrationError::ProviderConnection(format!(
                "messages call failed with {status}: {detail}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl ProviderClient for ClaudeClient {
    async fn open_stream(
        &self,
        request: &TurnRequest,
        tools: &[ToolDefinition],
    ) -> Result<RawEventStream> {
        debug!(model = %request.model, tools = tools.len(), "opening message stream");
        let response = self.post_messages(request, tools, true).await?;

        let bytes = response.bytes_stream().map(|chunk| {
            chunk
                .map(|b| b.to_vec())
                .map_err(|e| OrchestrationError::ProviderConnection(e.to_string()))
        });
        Ok(Box::pin(SseStream::new(Box::pin(bytes))))
    }

    async fn complete(
        &self,
        request: &TurnRequest,
        tools: &[ToolDefinition],
    ) -> Result<ProviderMessage> {
        debug!(model = %request.model, "non-streaming messages call");
        let response = self.post_messages(request, tools, false).await?;

        let message: MessagesResponse = response
            .json()
            .await
            .map_err(|e| OrchestrationError::ProviderConnection(e.to_string()))?;
        Ok(ProviderMessage {
            content: message.content,
            model: message.model,
            stop_reason: message.stop_reason,
            usage: message.usage,
        })
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentPart>,
    model: String,
    stop_reason: Option<String>,
    usage: Option<TokenUsage>,
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Splits an SSE byte stream into raw events
///
/// Buffers bytes until a blank line terminates an event block, then parses
/// the block's `event:` and `data:` lines. Blocks without data (comments,
/// keep-alives) are skipped.
struct SseStream {
    inner: ByteStream,
    buffer: String,
}

impl SseStream {
    fn new(inner: ByteStream) -> Self {
        Self { inner, buffer: String::new() }
    }

    /// Take the next complete event block out of the buffer, if any
    fn next_block(&mut self) -> Option<String> {
        let end = self.buffer.find("\n\n")?;
        let block = self.buffer[..end].to_string();
        self.buffer.drain(..end + 2);
        Some(block)
    }
}

impl Stream for SseStream {
    type Item = Result<RawEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            while let Some(block) = self.next_block() {
                if let Some(event) = parse_sse_block(&block) {
                    return Poll::Ready(Some(Ok(event)));
                }
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.buffer.push_str(&String::from_utf8_lossy(&bytes));
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => {
                    // trailing block without a terminating blank line
                    if self.buffer.trim().is_empty() {
                        return Poll::Ready(None);
                    }
                    let block = std::mem::take(&mut self.buffer);
                    match parse_sse_block(&block) {
                        Some(event) => return Poll::Ready(Some(Ok(event))),
                        None => return Poll::Ready(None),
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Parse one SSE event block into a raw event
///
/// Returns `None` for blocks with no data lines (comments, keep-alives).
fn parse_sse_block(block: &str) -> Option<RawEvent> {
    let mut event = String::new();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start());
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(RawEvent::new(event, data_lines.join("\n")))
}
