// Serialized tool execution with a watchdog deadline
//
// One invocation runs at a time; the engine calls `execute` from its event
// loop and awaits the report before touching the next event. The handler
// future is raced against a deadline; on expiry the future is dropped, so a
// handler that later wakes up finds nobody listening. Execution failure never
// propagates as an `Err` from this module: the report carries it, and the
// engine folds it into the follow-up provider call.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::error::{OrchestrationError, Result};
use crate::registry::ToolRegistry;
use crate::tool::ToolOutcome;

/// Default watchdog deadline per invocation
pub const DEFAULT_TOOL_DEADLINE: Duration = Duration::from_secs(30);

/// Outcome report for one tool invocation
#[derive(Debug)]
pub struct ExecutionReport {
    /// Tool name
    pub tool_name: String,
    /// Handler outcome, or the per-invocation failure
    pub outcome: Result<ToolOutcome>,
    /// Wall-clock execution time
    pub elapsed: Duration,
}

impl ExecutionReport {
    /// Whether the invocation succeeded
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Executes registered tools one at a time under a deadline
#[derive(Debug)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    deadline: Duration,
}

impl ToolExecutor {
    /// Create an executor over a registry with the default deadline
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry, deadline: DEFAULT_TOOL_DEADLINE }
    }

    /// Override the watchdog deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// The configured watchdog deadline
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Execute one tool invocation to completion
    ///
    /// Resolves the tool, validates the input against its declared schema,
    /// then runs the handler raced against the deadline. Every failure mode
    /// is captured in the returned report.
    pub async fn execute(
        &self,
        tool_name: &str,
        input: &serde_json::Value,
        context: &ExecutionContext,
    ) -> ExecutionReport {
        let started = std::time::Instant::now();

        let Some(tool) = self.registry.lookup(tool_name) else {
            warn!(tool = tool_name, "tool not registered");
            return ExecutionReport {
                tool_name: tool_name.to_string(),
                outcome: Err(OrchestrationError::ToolExecutionFailed {
                    tool: tool_name.to_string(),
                    reason: "tool is not registered".to_string(),
                }),
                elapsed: started.elapsed(),
            };
        };

        if let Err(reason) = tool.parameters.validate(input) {
            warn!(tool = tool_name, %reason, "tool input rejected");
            return ExecutionReport {
                tool_name: tool_name.to_string(),
                outcome: Err(OrchestrationError::SchemaValidation {
                    tool: tool_name.to_string(),
                    reason,
                }),
                elapsed: started.elapsed(),
            };
        }

        debug!(tool = tool_name, "executing tool");
        let outcome = match timeout(self.deadline, tool.execute(input, context)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(tool = tool_name, deadline = ?self.deadline, "tool deadline expired");
                Err(OrchestrationError::ToolTimeout {
                    tool: tool_name.to_string(),
                    deadline: self.deadline,
                })
            }
        };

        let elapsed = started.elapsed();
        debug!(tool = tool_name, ?elapsed, success = outcome.is_ok(), "tool finished");
        ExecutionReport { tool_name: tool_name.to_string(), outcome, elapsed }
    }
}
