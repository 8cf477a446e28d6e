//! Streaming tool-invocation orchestration for conversational procurement
//! assistants.
//!
//! The crate sits between a streaming generative-model provider and a
//! client-facing event channel. It decodes the provider's event stream,
//! relays narrative text with low latency, detects tool-use blocks, runs the
//! requested tools serially against a local registry, asks the provider for
//! a follow-up narrative once tools have run, and finishes every turn with
//! exactly one terminal frame.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use procura_orchestrator::{
//!     ClaudeClient, ChatMessage, EventEmitter, ExecutionContext, ToolRegistry,
//!     TurnEngine, TurnRequest,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> procura_orchestrator::Result<()> {
//! let provider = Arc::new(ClaudeClient::new("api-key"));
//! let registry = Arc::new(ToolRegistry::new());
//! let engine = TurnEngine::new(provider, registry);
//!
//! let (emitter, _frames) = EventEmitter::channel();
//! let context = ExecutionContext::new("user-1", "session-1");
//! let request = TurnRequest::new(
//!     "claude-sonnet-4-20250514",
//!     vec![ChatMessage::user("Create an RFP named Widget RFP")],
//! );
//!
//! let _report = engine
//!     .run_turn(request, &context, &emitter, CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod builtin;
pub mod context;
pub mod decoder;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod tool;
pub mod turn;

pub use builtin::{register_builtin_tools, RecordStore};
pub use context::ExecutionContext;
pub use decoder::{BlockDelta, BlockStart, ProviderEvent, StreamDecoder};
pub use emitter::{ChannelSink, EventEmitter, EventSink};
pub use engine::{EngineConfig, TurnEngine, TurnPhase, TurnReport};
pub use error::{OrchestrationError, Result};
pub use events::{ClientEvent, CompletionMetadata, ToolEvent, ToolEventKind};
pub use executor::{ExecutionReport, ToolExecutor};
pub use provider::{
    ChatMessage, ContentPart, ProviderClient, ProviderMessage, RawEvent, RawEventStream,
    TokenUsage, ToolDefinition, TurnRequest,
};
pub use providers::ClaudeClient;
pub use registry::ToolRegistry;
pub use tool::{
    SideEffectKind, SideEffectNotification, SideEffectPriority, Tool, ToolHandler, ToolOutcome,
    ToolParameters,
};
pub use turn::{InvocationStatus, ToolInvocation, TurnState};
