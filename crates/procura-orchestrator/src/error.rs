// Error types for turn orchestration

use std::time::Duration;
use thiserror::Error;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Orchestration errors
///
/// Per-invocation errors (`SchemaValidation`, `ToolExecutionFailed`,
/// `ToolTimeout`) fail a single tool call and are folded into the follow-up
/// provider call. `Decode` errors are logged and the frame skipped. Turn-level
/// errors (`ProviderConnection`, `FollowUpCall`, `Cancelled`) fail the turn.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Malformed provider frame (skipped, never fatal to the turn)
    #[error("malformed provider frame: {0}")]
    Decode(String),

    /// Tool input did not match the tool's declared schema
    #[error("invalid input for tool '{tool}': {reason}")]
    SchemaValidation {
        /// Tool name
        tool: String,
        /// Reason the input was rejected
        reason: String,
    },

    /// Tool handler returned a failure
    #[error("tool '{tool}' failed: {reason}")]
    ToolExecutionFailed {
        /// Tool name
        tool: String,
        /// Failure description from the handler
        reason: String,
    },

    /// Tool handler exceeded its watchdog deadline
    #[error("tool '{tool}' timed out after {deadline:?}")]
    ToolTimeout {
        /// Tool name
        tool: String,
        /// The deadline that expired
        deadline: Duration,
    },

    /// The provider stream itself failed (fatal to the turn)
    #[error("provider connection error: {0}")]
    ProviderConnection(String),

    /// The follow-up provider call failed (fatal to the turn)
    #[error("follow-up provider call failed: {0}")]
    FollowUpCall(String),

    /// Tool registration was rejected
    #[error("tool registration error: {0}")]
    Registry(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Turn cancelled by the caller
    #[error("turn cancelled")]
    Cancelled,
}

impl OrchestrationError {
    /// Short discriminant used when reporting tool failures on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::SchemaValidation { .. } => "schema_validation",
            Self::ToolExecutionFailed { .. } => "execution",
            Self::ToolTimeout { .. } => "timeout",
            Self::ProviderConnection(_) => "provider_connection",
            Self::FollowUpCall(_) => "follow_up",
            Self::Registry(_) => "registry",
            Self::Json(_) => "json",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this error fails the whole turn rather than one invocation
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ProviderConnection(_) | Self::FollowUpCall(_) | Self::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        let err = OrchestrationError::ToolTimeout {
            tool: "create_record".to_string(),
            deadline: Duration::from_secs(30),
        };
        assert_eq!(err.kind(), "timeout");

        let err = OrchestrationError::SchemaValidation {
            tool: "create_record".to_string(),
            reason: "missing field".to_string(),
        };
        assert_eq!(err.kind(), "schema_validation");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(OrchestrationError::ProviderConnection("reset".to_string()).is_fatal());
        assert!(OrchestrationError::Cancelled.is_fatal());
        assert!(!OrchestrationError::Decode("bad frame".to_string()).is_fatal());
        assert!(!OrchestrationError::ToolExecutionFailed {
            tool: "t".to_string(),
            reason: "r".to_string()
        }
        .is_fatal());
    }
}
