// Turn engine: the orchestration state machine
//
// Drives one conversational turn end to end: opens the provider stream,
// decodes frames in arrival order, relays or suppresses narrative text,
// executes tool invocations serially as their blocks close, performs the
// follow-up provider call when tools ran, and emits exactly one terminal
// frame per turn. The completion gate is explicit: the turn finishes only
// when the provider signalled end of turn, every opened block has closed,
// and no invocation is still running.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::ExecutionContext;
use crate::decoder::{BlockDelta, BlockStart, ProviderEvent, StreamDecoder};
use crate::emitter::EventEmitter;
use crate::error::{OrchestrationError, Result};
use crate::events::{ClientEvent, CompletionMetadata, ToolEvent};
use crate::executor::{ToolExecutor, DEFAULT_TOOL_DEADLINE};
use crate::provider::{ChatMessage, ContentPart, ProviderClient, TokenUsage, TurnRequest};
use crate::registry::ToolRegistry;
use crate::tool::SideEffectNotification;
use crate::turn::{ToolInvocation, TurnState};

/// Instruction appended to the system prompt of the follow-up call so the
/// model never ends a turn on bare tool execution.
const FOLLOW_UP_SYSTEM_SUFFIX: &str = "\n\nCRITICAL: You MUST provide a helpful text response to the user after executing tools. The user is waiting for your response. Always explain what you did and provide relevant information, guidance, or next steps. Never end with just tool execution - always follow up with explanatory text for the user.";

/// Narrative used when the follow-up call returns no text at all
const FALLBACK_NARRATIVE: &str = "Task completed successfully.";

/// Tunable engine behavior
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Watchdog deadline per tool invocation
    pub tool_deadline: std::time::Duration,
    /// System-prompt suffix for the follow-up call
    pub follow_up_system_suffix: String,
    /// Narrative substituted when the follow-up call yields no text
    pub fallback_narrative: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tool_deadline: DEFAULT_TOOL_DEADLINE,
            follow_up_system_suffix: FOLLOW_UP_SYSTEM_SUFFIX.to_string(),
            fallback_narrative: FALLBACK_NARRATIVE.to_string(),
        }
    }
}

/// Phase of the turn state machine, reported for observability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Stream requested, no frame decoded yet
    AwaitingStart,
    /// Frames flowing, no tool running
    Streaming,
    /// A tool invocation is executing
    ToolsExecuting,
    /// Stream converged, follow-up call in flight
    AwaitingFollowUp,
    /// Terminal frames being emitted
    Completing,
    /// Turn finished cleanly
    Done,
    /// Turn failed
    Failed,
}

/// Log and apply a phase transition
fn transition(phase: &mut TurnPhase, next: TurnPhase) {
    debug!(from = ?*phase, to = ?next, "phase transition");
    *phase = next;
}

/// Summary of a finished turn
#[derive(Debug)]
pub struct TurnReport {
    /// Narrative text delivered to the client
    pub narrative: String,
    /// Tools invoked, in execution order
    pub tools_used: Vec<String>,
    /// Aggregate token usage, follow-up call included
    pub usage: TokenUsage,
    /// Model that produced the turn
    pub model: String,
    /// Every invocation with its terminal status
    pub invocations: Vec<ToolInvocation>,
}

/// Orchestrates conversational turns against a provider and a tool registry
pub struct TurnEngine {
    provider: Arc<dyn ProviderClient>,
    registry: Arc<ToolRegistry>,
    config: EngineConfig,
    side_effect_tx: Option<mpsc::UnboundedSender<SideEffectNotification>>,
}

impl TurnEngine {
    /// Create an engine with default configuration
    pub fn new(provider: Arc<dyn ProviderClient>, registry: Arc<ToolRegistry>) -> Self {
        Self { provider, registry, config: EngineConfig::default(), side_effect_tx: None }
    }

    /// Override the engine configuration
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Also forward side-effect notifications on a dedicated channel
    #[must_use]
    pub fn with_side_effect_channel(
        mut self,
        tx: mpsc::UnboundedSender<SideEffectNotification>,
    ) -> Self {
        self.side_effect_tx = Some(tx);
        self
    }

    /// Run one conversational turn to completion
    ///
    /// Emits client frames on `emitter` as the turn progresses and returns a
    /// summary report. A fatal error emits a terminal error frame first;
    /// cancellation emits nothing further and closes the emitter.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        context: &ExecutionContext,
        emitter: &EventEmitter,
        cancel: CancellationToken,
    ) -> Result<TurnReport> {
        let tools = self.registry.definitions();
        let executor =
            ToolExecutor::new(Arc::clone(&self.registry)).with_deadline(self.config.tool_deadline);

        let mut phase = TurnPhase::AwaitingStart;
        info!(
            provider = self.provider.provider_name(),
            model = %request.model,
            session = %context.session_id,
            tools = tools.len(),
            "starting turn"
        );

        let mut stream = match self.provider.open_stream(&request, &tools).await {
            Ok(stream) => stream,
            Err(e) => return self.fail_turn(emitter, e),
        };

        let mut decoder = StreamDecoder::new();
        let mut state = TurnState::new();
        // invocations whose blocks are still open, keyed by block index
        let mut open_tools: std::collections::HashMap<usize, ToolInvocation> =
            std::collections::HashMap::new();

        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => return self.cancel_turn(emitter),
                frame = stream.next() => frame,
            };

            let raw = match frame {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => return self.fail_turn(emitter, e),
                None => {
                    // transport closed; acceptable only once the turn converged
                    if state.provider_end_seen
                        && state.blocks_converged()
                        && open_tools.is_empty()
                    {
                        break;
                    }
                    return self.fail_turn(
                        emitter,
                        OrchestrationError::ProviderConnection(
                            "stream ended before the turn converged".to_string(),
                        ),
                    );
                }
            };

            let event = match decoder.decode(&raw) {
                Ok(event) => event,
                Err(e) if e.is_fatal() => return self.fail_turn(emitter, e),
                Err(e) => {
                    warn!(error = %e, event = %raw.event, "skipping malformed frame");
                    continue;
                }
            };

            match event {
                ProviderEvent::MessageStart { model, usage } => {
                    transition(&mut phase, TurnPhase::Streaming);
                    debug!(model = ?model, "message started");
                    state.model = model;
                    if let Some(usage) = usage {
                        state.apply_stream_usage(usage);
                    }
                }

                ProviderEvent::ContentBlockStart { index, block } => {
                    state.open_block();
                    match block {
                        BlockStart::Text => {
                            debug!(index, "text block opened");
                        }
                        BlockStart::ToolUse { id, name } => {
                            debug!(index, tool = %name, "tool block opened");
                            state.tools_detected = true;
                            // the start lifecycle event is always relayed,
                            // before the input has finished streaming
                            emitter.emit(&ClientEvent::ToolInvocation {
                                tool_event: ToolEvent::start(&name, serde_json::json!({})),
                            });
                            open_tools.insert(index, ToolInvocation::new(id, name));
                        }
                    }
                }

                ProviderEvent::ContentBlockDelta { index, delta } => match delta {
                    BlockDelta::Text(text) => {
                        // once a tool is detected, primary-channel text is
                        // suppressed for the rest of the turn
                        if state.tools_detected {
                            debug!(index, "suppressing text after tool detection");
                        } else {
                            state.narrative.push_str(&text);
                            emitter.emit(&ClientEvent::Text { content: text });
                        }
                    }
                    BlockDelta::PartialJson(fragment) => {
                        if let Some(invocation) = open_tools.get_mut(&index) {
                            invocation.push_input_fragment(&fragment);
                        }
                    }
                },

                ProviderEvent::ContentBlockStop { index } => {
                    if let Err(e) = state.close_block() {
                        warn!(error = %e, index, "skipping malformed frame");
                        continue;
                    }
                    if let Some(invocation) = open_tools.remove(&index) {
                        transition(&mut phase, TurnPhase::ToolsExecuting);
                        let finished = self
                            .run_invocation(invocation, context, &executor, emitter, &cancel, &mut state)
                            .await?;
                        state.record_result(finished);
                        transition(&mut phase, TurnPhase::Streaming);
                    }
                }

                ProviderEvent::MessageDelta { usage } => {
                    if let Some(usage) = usage {
                        state.apply_stream_usage(usage);
                    }
                }

                ProviderEvent::MessageStop => {
                    debug!(
                        blocks_opened = state.blocks_opened,
                        blocks_closed = state.blocks_closed,
                        "provider end of turn"
                    );
                    state.provider_end_seen = true;
                }

                ProviderEvent::Ignored => {}
            }

            // completion gate
            if state.provider_end_seen && state.blocks_converged() && open_tools.is_empty() {
                break;
            }
        }

        // a cancel observed between the last frame and the gate firing still
        // suppresses every remaining client event
        if cancel.is_cancelled() {
            return self.cancel_turn(emitter);
        }

        if state.tools_executed {
            transition(&mut phase, TurnPhase::AwaitingFollowUp);
            let follow_up = self.build_follow_up_request(&request, &state);
            let response = tokio::select! {
                () = cancel.cancelled() => return self.cancel_turn(emitter),
                response = self.provider.complete(&follow_up, &tools) => match response {
                    Ok(response) => response,
                    Err(e) => {
                        return self.fail_turn(
                            emitter,
                            OrchestrationError::FollowUpCall(e.to_string()),
                        );
                    }
                },
            };
            if let Some(usage) = response.usage {
                state.usage.merge(usage);
            }

            let narrative = response.text();
            let narrative = if narrative.trim().is_empty() {
                warn!("follow-up response carried no text, using fallback");
                self.config.fallback_narrative.clone()
            } else {
                narrative
            };
            emitter.emit(&ClientEvent::Text { content: narrative.clone() });
            state.narrative = narrative;
        }

        transition(&mut phase, TurnPhase::Completing);
        for notification in &state.side_effects {
            emitter.emit(&ClientEvent::SideEffect { notification: notification.clone() });
            if let Some(tx) = &self.side_effect_tx {
                let _ = tx.send(notification.clone());
            }
        }

        let model = state.model.clone().unwrap_or_else(|| request.model.clone());
        let tools_used = state.tools_used();
        emitter.emit(&ClientEvent::Completion {
            metadata: CompletionMetadata {
                model: model.clone(),
                tools_used: tools_used.clone(),
                token_usage: state.usage,
            },
        });

        transition(&mut phase, TurnPhase::Done);
        info!(
            tools = tools_used.len(),
            input_tokens = state.usage.input_tokens,
            output_tokens = state.usage.output_tokens,
            phase = ?phase,
            "turn complete"
        );
        Ok(TurnReport {
            narrative: state.narrative,
            tools_used,
            usage: state.usage,
            model,
            invocations: state.results,
        })
    }

    /// Execute one invocation whose block just closed
    ///
    /// Always returns a finished invocation except under cancellation, which
    /// aborts the turn.
    async fn run_invocation(
        &self,
        mut invocation: ToolInvocation,
        context: &ExecutionContext,
        executor: &ToolExecutor,
        emitter: &EventEmitter,
        cancel: &CancellationToken,
        state: &mut TurnState,
    ) -> Result<ToolInvocation> {
        let input = match invocation.parse_input() {
            Ok(input) => input,
            Err(e) => {
                warn!(tool = %invocation.name, error = %e, "tool input did not parse");
                invocation.fail(&e);
                state.tools_executed = true;
                emitter.emit(&ClientEvent::ToolInvocation {
                    tool_event: ToolEvent::error(&invocation, 0),
                });
                return Ok(invocation);
            }
        };

        invocation.mark_running();
        state.tools_executed = true;

        let report = tokio::select! {
            () = cancel.cancelled() => {
                return self.cancel_turn::<ToolInvocation>(emitter);
            }
            report = executor.execute(&invocation.name, &input, context) => report,
        };

        let duration_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX);
        match report.outcome {
            Ok(outcome) => {
                invocation.succeed(outcome.payload);
                state.queue_side_effects(outcome.side_effects);
                emitter.emit(&ClientEvent::ToolInvocation {
                    tool_event: ToolEvent::complete(&invocation, duration_ms),
                });
            }
            Err(e) => {
                invocation.fail(&e);
                emitter.emit(&ClientEvent::ToolInvocation {
                    tool_event: ToolEvent::error(&invocation, duration_ms),
                });
            }
        }
        Ok(invocation)
    }

    /// Build the non-streaming follow-up request after tool execution
    ///
    /// Carries the whole conversation plus an assistant message holding the
    /// turn's tool-use blocks (original provider ids) and a user message
    /// holding the matching tool results, so the model narrates what the
    /// tools actually did.
    pub fn build_follow_up_request(&self, request: &TurnRequest, state: &TurnState) -> TurnRequest {
        let mut messages = request.messages.clone();

        let tool_uses: Vec<ContentPart> = state
            .results
            .iter()
            .map(|inv| ContentPart::ToolUse {
                id: inv.id.clone(),
                name: inv.name.clone(),
                input: inv.input.clone().unwrap_or(serde_json::Value::Null),
            })
            .collect();
        let tool_results: Vec<ContentPart> = state
            .results
            .iter()
            .map(|inv| match (&inv.result, &inv.error) {
                (Some(result), _) => ContentPart::ToolResult {
                    tool_use_id: inv.id.clone(),
                    content: result.to_string(),
                    is_error: false,
                },
                (None, error) => ContentPart::ToolResult {
                    tool_use_id: inv.id.clone(),
                    content: error.clone().unwrap_or_else(|| "tool failed".to_string()),
                    is_error: true,
                },
            })
            .collect();

        messages.push(ChatMessage { role: "assistant".to_string(), content: tool_uses });
        messages.push(ChatMessage { role: "user".to_string(), content: tool_results });

        let system = format!(
            "{}{}",
            request.system.as_deref().unwrap_or(""),
            self.config.follow_up_system_suffix
        );

        TurnRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: Some(system),
            messages,
        }
    }

    /// Fail the turn: emit a terminal error frame, then return the error
    fn fail_turn<T>(&self, emitter: &EventEmitter, error: OrchestrationError) -> Result<T> {
        warn!(error = %error, "turn failed");
        emitter.emit(&ClientEvent::Error { content: error.to_string() });
        emitter.close();
        Err(error)
    }

    /// Abort the turn on cancellation: no further frames, close the emitter
    fn cancel_turn<T>(&self, emitter: &EventEmitter) -> Result<T> {
        info!("turn cancelled");
        emitter.close();
        Err(OrchestrationError::Cancelled)
    }
}

impl std::fmt::Debug for TurnEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnEngine")
            .field("provider", &self.provider.provider_name())
            .field("tools", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
