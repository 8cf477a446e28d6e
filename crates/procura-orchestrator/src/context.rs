// Execution context threaded through tool handler calls
//
// The context identifies the acting principal and conversational session.
// It is opaque to the turn engine: created by the caller, passed unchanged
// and read-only into every tool handler.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Caller-supplied context for one conversational session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Acting principal (user identifier)
    pub principal: String,
    /// Session identifier
    pub session_id: String,
    /// Session state handlers may read (current record, active agent, ...)
    #[serde(default)]
    pub session_state: HashMap<String, Value>,
}

impl ExecutionContext {
    /// Create a new execution context
    pub fn new(principal: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            session_id: session_id.into(),
            session_state: HashMap::new(),
        }
    }

    /// Attach a session state entry
    #[must_use]
    pub fn with_state(mut self, key: impl Into<String>, value: Value) -> Self {
        self.session_state.insert(key.into(), value);
        self
    }

    /// Get a session state entry
    pub fn state(&self, key: &str) -> Option<&Value> {
        self.session_state.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let ctx = ExecutionContext::new("user-7", "session-42");
        assert_eq!(ctx.principal, "user-7");
        assert_eq!(ctx.session_id, "session-42");
        assert!(ctx.session_state.is_empty());
    }

    #[test]
    fn test_context_state() {
        let ctx = ExecutionContext::new("user-7", "session-42")
            .with_state("current_record", serde_json::json!(42));

        assert_eq!(ctx.state("current_record"), Some(&serde_json::json!(42)));
        assert_eq!(ctx.state("missing"), None);
    }
}
