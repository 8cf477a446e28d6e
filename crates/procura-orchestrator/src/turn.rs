// Per-turn bookkeeping: tool invocation lifecycle and turn state
//
// One `TurnState` exists per conversational turn, owned exclusively by the
// turn engine and discarded when the turn's final completion event has been
// emitted. The block counters and flags here back the explicit completion
// gate: the turn may only complete once every opened content block has
// closed and no invocation is still running.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{OrchestrationError, Result};
use crate::provider::TokenUsage;
use crate::tool::SideEffectNotification;

/// Lifecycle status of a tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStatus {
    /// Block open, input still accumulating
    Pending,
    /// Handler executing
    Running,
    /// Handler completed successfully
    Succeeded,
    /// Input parse, validation, execution, or deadline failure
    Failed,
}

/// One tool-invocation request embedded in the stream
///
/// Created at `ContentBlockStart` for a tool block, fed input fragments by
/// deltas, parsed and executed at `ContentBlockStop`.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Provider-assigned tool call id
    pub id: String,
    /// Tool name
    pub name: String,
    /// Accumulating partial-JSON input buffer
    raw_input: String,
    /// Parsed input, available once the block closed cleanly
    pub input: Option<Value>,
    /// Lifecycle status
    pub status: InvocationStatus,
    /// Result payload on success
    pub result: Option<Value>,
    /// Failure description
    pub error: Option<String>,
    /// Failure discriminant ("timeout", "schema_validation", ...)
    pub error_kind: Option<&'static str>,
    /// When the invocation was created
    pub started_at: DateTime<Utc>,
    /// When the invocation finished
    pub finished_at: Option<DateTime<Utc>>,
}

impl ToolInvocation {
    /// Create a pending invocation for a newly opened tool block
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            raw_input: String::new(),
            input: None,
            status: InvocationStatus::Pending,
            result: None,
            error: None,
            error_kind: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Append a partial-JSON input fragment
    pub fn push_input_fragment(&mut self, fragment: &str) {
        self.raw_input.push_str(fragment);
    }

    /// Parse the accumulated input buffer
    ///
    /// An empty buffer parses to an empty object: the provider omits deltas
    /// entirely for tools that take no arguments.
    pub fn parse_input(&mut self) -> Result<Value> {
        let input: Value = if self.raw_input.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&self.raw_input)?
        };
        self.input = Some(input.clone());
        Ok(input)
    }

    /// Mark the invocation running
    pub fn mark_running(&mut self) {
        self.status = InvocationStatus::Running;
    }

    /// Mark the invocation succeeded with a result payload
    pub fn succeed(&mut self, result: Value) {
        self.status = InvocationStatus::Succeeded;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
    }

    /// Mark the invocation failed
    pub fn fail(&mut self, error: &OrchestrationError) {
        self.status = InvocationStatus::Failed;
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind());
        self.finished_at = Some(Utc::now());
    }

    /// Whether the invocation reached a terminal status
    pub fn is_finished(&self) -> bool {
        matches!(self.status, InvocationStatus::Succeeded | InvocationStatus::Failed)
    }
}

/// State for one conversational turn
#[derive(Debug, Default)]
pub struct TurnState {
    /// Content blocks opened so far
    pub blocks_opened: usize,
    /// Content blocks closed so far
    pub blocks_closed: usize,
    /// Whether any tool block was ever detected this turn
    pub tools_detected: bool,
    /// Whether any tool invocation actually ran (or failed) this turn
    pub tools_executed: bool,
    /// Narrative text relayed on the low-latency path
    pub narrative: String,
    /// Completed invocations, in block-close order
    pub results: Vec<ToolInvocation>,
    /// Queued side-effect notifications, flushed at completion
    pub side_effects: Vec<SideEffectNotification>,
    /// Accumulated token usage
    pub usage: TokenUsage,
    /// Whether the provider already signalled end of turn
    pub provider_end_seen: bool,
    /// Model reported at message start
    pub model: Option<String>,
}

impl TurnState {
    /// Create state for a fresh turn
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a content block opening
    pub fn open_block(&mut self) {
        self.blocks_opened += 1;
    }

    /// Record a content block closing
    ///
    /// Upholds `blocks_closed <= blocks_opened`; the decoder already rejects
    /// stops for unopened blocks, so a violation here is a malformed stream.
    pub fn close_block(&mut self) -> Result<()> {
        if self.blocks_closed >= self.blocks_opened {
            return Err(OrchestrationError::Decode(
                "content block closed more times than opened".to_string(),
            ));
        }
        self.blocks_closed += 1;
        Ok(())
    }

    /// Whether every opened block has closed
    pub fn blocks_converged(&self) -> bool {
        self.blocks_closed == self.blocks_opened
    }

    /// Apply a streamed usage report
    ///
    /// Wire usage is cumulative per message, so the streamed leg is
    /// last-writer-wins rather than additive; only the follow-up call's
    /// usage is merged on top. A report omitting a counter (message_delta
    /// frames carry only output tokens) leaves the other counter alone.
    pub fn apply_stream_usage(&mut self, usage: TokenUsage) {
        if usage.input_tokens > 0 {
            self.usage.input_tokens = usage.input_tokens;
        }
        if usage.output_tokens > 0 {
            self.usage.output_tokens = usage.output_tokens;
        }
    }

    /// Record a completed invocation, preserving close order
    pub fn record_result(&mut self, invocation: ToolInvocation) {
        debug_assert!(invocation.is_finished());
        self.results.push(invocation);
    }

    /// Queue side effects for the completion flush
    pub fn queue_side_effects(&mut self, effects: Vec<SideEffectNotification>) {
        self.side_effects.extend(effects);
    }

    /// Names of tools invoked this turn, in execution order
    pub fn tools_used(&self) -> Vec<String> {
        self.results.iter().map(|inv| inv.name.clone()).collect()
    }
}
