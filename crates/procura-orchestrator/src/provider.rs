// Provider seam for the turn engine
//
// The engine talks to the generative-model provider through the
// `ProviderClient` trait: a streaming call that yields raw wire frames for
// the decoder, and a non-streaming call used for the follow-up request after
// tool execution. Implementations are injected into the engine's constructor.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

use crate::error::Result;

/// One content block of a conversation message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Narrative text
    Text {
        /// Text content
        text: String,
    },
    /// A tool-use request emitted by the assistant
    ToolUse {
        /// Provider-assigned tool call id
        id: String,
        /// Tool name
        name: String,
        /// Structured tool input
        input: Value,
    },
    /// A tool result returned to the provider
    ToolResult {
        /// Id of the tool call this result answers
        tool_use_id: String,
        /// Serialized result or error text
        content: String,
        /// Whether the result represents a failure
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

/// One message of the running conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Message role ("user" or "assistant")
    pub role: String,
    /// Content blocks
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    /// Create a user text message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    /// Create an assistant text message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }
}

/// Declared tool surface sent to the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON schema for the tool input
    pub input_schema: Value,
}

/// Token usage reported by the provider
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    /// Prompt tokens
    #[serde(default)]
    pub input_tokens: u32,
    /// Completion tokens
    #[serde(default)]
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Merge another usage report into this one
    pub fn merge(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Inbound request for one conversational turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    /// Model identifier
    pub model: String,
    /// Maximum output tokens
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// System instruction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Running conversation history
    pub messages: Vec<ChatMessage>,
}

impl TurnRequest {
    /// Create a turn request with default generation settings
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 4096,
            temperature: None,
            system: None,
            messages,
        }
    }

    /// Set the system instruction
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the maximum output tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// One raw wire frame as read off the provider's event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Wire event name (e.g. "content_block_delta")
    pub event: String,
    /// Frame payload, a JSON document
    pub data: String,
}

impl RawEvent {
    /// Create a raw event
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self { event: event.into(), data: data.into() }
    }
}

/// Stream of raw provider frames for one turn
pub type RawEventStream = Pin<Box<dyn Stream<Item = Result<RawEvent>> + Send>>;

/// Complete (non-streamed) provider response
#[derive(Debug, Clone)]
pub struct ProviderMessage {
    /// Response content blocks
    pub content: Vec<ContentPart>,
    /// Model that produced the response
    pub model: String,
    /// Why generation stopped
    pub stop_reason: Option<String>,
    /// Token usage for the call
    pub usage: Option<TokenUsage>,
}

impl ProviderMessage {
    /// Concatenated text of all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Model-agnostic provider client
///
/// `open_stream` starts the turn's streaming call; the returned frames feed
/// the stream decoder. `complete` performs the non-streaming follow-up call
/// whose text becomes the turn's narrative after tool execution.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Open a streaming generation call
    async fn open_stream(
        &self,
        request: &TurnRequest,
        tools: &[ToolDefinition],
    ) -> Result<RawEventStream>;

    /// Perform a non-streaming generation call
    async fn complete(
        &self,
        request: &TurnRequest,
        tools: &[ToolDefinition],
    ) -> Result<ProviderMessage>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}
