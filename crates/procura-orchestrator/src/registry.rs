// Tool registry keyed by name
//
// A lookup table, no control flow. Registration validates each tool's
// declared schema once, so execution-time dispatch is a plain map hit instead
// of the string-matched routing the original service used.

use std::collections::HashMap;

use crate::error::{OrchestrationError, Result};
use crate::provider::ToolDefinition;
use crate::tool::Tool;

/// Registry of the fixed, locally registered tool set
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
    /// Registration order, preserved for the declared tool surface
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, validating its declaration
    ///
    /// Rejects empty or duplicate names, non-object parameter schemas, and
    /// required properties that are not declared.
    pub fn register(&mut self, tool: Tool) -> Result<()> {
        if tool.name.is_empty() {
            return Err(OrchestrationError::Registry("tool name must not be empty".to_string()));
        }
        if self.tools.contains_key(&tool.name) {
            return Err(OrchestrationError::Registry(format!(
                "tool '{}' is already registered",
                tool.name
            )));
        }
        if tool.parameters.param_type != "object" {
            return Err(OrchestrationError::Registry(format!(
                "tool '{}' declares a non-object parameter schema",
                tool.name
            )));
        }
        for required in &tool.parameters.required {
            if !tool.parameters.properties.contains_key(required) {
                return Err(OrchestrationError::Registry(format!(
                    "tool '{}' requires undeclared property '{}'",
                    tool.name, required
                )));
            }
        }

        self.order.push(tool.name.clone());
        self.tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    /// Find a tool by name
    pub fn lookup(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Export the declared tool surface, in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(Tool::definition)
            .collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::tool::{ToolHandler, ToolOutcome, ToolParameters};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;

    struct NoopHandler;

    #[async_trait]
    impl ToolHandler for NoopHandler {
        async fn execute(
            &self,
            _input: &Value,
            _context: &ExecutionContext,
        ) -> crate::error::Result<ToolOutcome> {
            Ok(ToolOutcome::new(Value::Null))
        }
    }

    fn tool(name: &str, parameters: ToolParameters) -> Tool {
        Tool::new(name, "Test tool", parameters, Arc::new(NoopHandler))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("create_record", ToolParameters::new())).unwrap();

        assert!(registry.lookup("create_record").is_some());
        assert!(registry.lookup("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("create_record", ToolParameters::new())).unwrap();
        let result = registry.register(tool("create_record", ToolParameters::new()));
        assert!(matches!(result, Err(OrchestrationError::Registry(_))));
    }

    #[test]
    fn test_register_rejects_empty_name() {
        let mut registry = ToolRegistry::new();
        let result = registry.register(tool("", ToolParameters::new()));
        assert!(matches!(result, Err(OrchestrationError::Registry(_))));
    }

    #[test]
    fn test_register_rejects_undeclared_required() {
        let mut params = ToolParameters::new();
        params.required.push("phantom".to_string());

        let mut registry = ToolRegistry::new();
        let result = registry.register(tool("bad", params));
        assert!(matches!(result, Err(OrchestrationError::Registry(_))));
    }

    #[test]
    fn test_definitions_preserve_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("update_record", ToolParameters::new())).unwrap();
        registry.register(tool("create_record", ToolParameters::new())).unwrap();

        let names: Vec<String> =
            registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["update_record".to_string(), "create_record".to_string()]);
    }
}
