// Client-facing wire events
//
// The shapes here are the orchestrator's outbound contract: one JSON frame
// per event, discriminated by a `type` field. Field casing matches what the
// web clients already parse (`toolEvent`, `toolName`, `tokenUsage`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::TokenUsage;
use crate::tool::SideEffectNotification;
use crate::turn::ToolInvocation;

/// One event frame sent to the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Narrative text fragment
    Text {
        /// The fragment
        content: String,
    },
    /// Tool invocation lifecycle update
    ToolInvocation {
        /// Lifecycle details
        #[serde(rename = "toolEvent")]
        tool_event: ToolEvent,
    },
    /// Out-of-band side effect for the presentation layer
    SideEffect {
        /// The notification
        notification: SideEffectNotification,
    },
    /// Terminal frame of a successful turn (exactly one per turn)
    Completion {
        /// Turn summary
        metadata: CompletionMetadata,
    },
    /// Terminal frame of a failed turn
    Error {
        /// Failure description
        content: String,
    },
}

/// Lifecycle stage of a tool event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolEventKind {
    /// Invocation detected and about to run
    Start,
    /// Invocation finished successfully
    Complete,
    /// Invocation failed
    Error,
}

/// Tool invocation lifecycle details carried by a `tool_invocation` frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolEvent {
    /// Lifecycle stage
    #[serde(rename = "type")]
    pub kind: ToolEventKind,
    /// Tool name
    #[serde(rename = "toolName")]
    pub tool_name: String,
    /// Parsed tool input (present on start)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    /// Result payload (present on complete)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure description (present on error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the stage was reached
    pub timestamp: DateTime<Utc>,
    /// Execution duration in milliseconds (present on complete/error)
    #[serde(rename = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ToolEvent {
    /// A start event for a detected invocation
    pub fn start(tool_name: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: ToolEventKind::Start,
            tool_name: tool_name.into(),
            parameters: Some(parameters),
            result: None,
            error: None,
            timestamp: Utc::now(),
            duration_ms: None,
        }
    }

    /// A completion event for a finished invocation
    pub fn complete(invocation: &ToolInvocation, duration_ms: u64) -> Self {
        Self {
            kind: ToolEventKind::Complete,
            tool_name: invocation.name.clone(),
            parameters: invocation.input.clone(),
            result: invocation.result.clone(),
            error: None,
            timestamp: Utc::now(),
            duration_ms: Some(duration_ms),
        }
    }

    /// An error event for a failed invocation
    pub fn error(invocation: &ToolInvocation, duration_ms: u64) -> Self {
        Self {
            kind: ToolEventKind::Error,
            tool_name: invocation.name.clone(),
            parameters: invocation.input.clone(),
            result: None,
            error: invocation.error.clone(),
            timestamp: Utc::now(),
            duration_ms: Some(duration_ms),
        }
    }
}

/// Turn summary attached to the terminal completion frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionMetadata {
    /// Model that produced the turn
    pub model: String,
    /// Tools invoked this turn, in execution order
    #[serde(rename = "toolsUsed")]
    pub tools_used: Vec<String>,
    /// Aggregate token usage, follow-up call included
    #[serde(rename = "tokenUsage")]
    pub token_usage: TokenUsage,
}
