// Tool abstractions for turn orchestration
//
// Tools are the fixed, locally registered backend capabilities the model may
// invoke mid-stream. This module defines the tool interface, the declared
// input schema with validation, and the side-effect notifications a handler
// may hand back for the presentation layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::provider::ToolDefinition;

/// Tool parameter schema (JSON-schema object subset)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameters {
    /// Type (always "object" for tool parameters)
    #[serde(rename = "type")]
    pub param_type: String,
    /// Property definitions
    pub properties: HashMap<String, ToolPropertySchema>,
    /// Required property names
    pub required: Vec<String>,
}

impl ToolParameters {
    /// Create a new tool parameters schema
    pub fn new() -> Self {
        Self { param_type: "object".to_string(), properties: HashMap::new(), required: Vec::new() }
    }

    /// Add a property to the schema
    #[must_use]
    pub fn add_property(
        mut self,
        name: impl Into<String>,
        property_type: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            ToolPropertySchema {
                property_type: property_type.into(),
                description: description.into(),
            },
        );
        if required {
            self.required.push(name);
        }
        self
    }

    /// Validate a parsed tool input against this schema
    ///
    /// Checks that the input is an object, that every required property is
    /// present, and that every declared property that is present has the
    /// declared type. Undeclared keys are tolerated.
    pub fn validate(&self, input: &Value) -> std::result::Result<(), String> {
        let object = input.as_object().ok_or_else(|| "input is not an object".to_string())?;

        for name in &self.required {
            if !object.contains_key(name) {
                return Err(format!("missing required property '{name}'"));
            }
        }

        for (name, value) in object {
            let Some(schema) = self.properties.get(name) else {
                continue;
            };
            let matches = match schema.property_type.as_str() {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.is_i64() || value.is_u64(),
                "boolean" => value.is_boolean(),
                "object" => value.is_object(),
                "array" => value.is_array(),
                _ => true,
            };
            if !matches {
                return Err(format!(
                    "property '{name}' should be of type {}",
                    schema.property_type
                ));
            }
        }

        Ok(())
    }
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self::new()
    }
}

/// Tool property schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPropertySchema {
    /// Property type
    #[serde(rename = "type")]
    pub property_type: String,
    /// Property description
    pub description: String,
}

/// Kind of side effect requested from the presentation layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectKind {
    /// A UI surface should re-fetch and re-render
    UiRefresh,
    /// Client-held state should be replaced
    StateUpdate,
    /// A user-facing notification should be shown
    Notification,
}

/// Relative urgency of a side-effect notification
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectPriority {
    /// Apply whenever convenient
    Low,
    /// Apply promptly
    #[default]
    Normal,
    /// Apply immediately
    High,
}

/// Out-of-band instruction for the presentation layer
///
/// Produced by tool handlers, queued on the turn state, and flushed to the
/// client independent of narrative text ordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SideEffectNotification {
    /// Kind of effect
    pub kind: SideEffectKind,
    /// Target UI surface
    pub target_surface: String,
    /// Effect payload
    pub payload: Value,
    /// Urgency
    #[serde(default)]
    pub priority: SideEffectPriority,
}

impl SideEffectNotification {
    /// Create a UI refresh notification
    pub fn ui_refresh(target_surface: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: SideEffectKind::UiRefresh,
            target_surface: target_surface.into(),
            payload,
            priority: SideEffectPriority::Normal,
        }
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: SideEffectPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Result produced by a successful tool handler call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Structured result payload, included in the follow-up call
    pub payload: Value,
    /// Side effects for the presentation layer
    #[serde(default)]
    pub side_effects: Vec<SideEffectNotification>,
}

impl ToolOutcome {
    /// Create an outcome with a payload and no side effects
    pub fn new(payload: Value) -> Self {
        Self { payload, side_effects: Vec::new() }
    }

    /// Attach a side effect
    #[must_use]
    pub fn with_side_effect(mut self, effect: SideEffectNotification) -> Self {
        self.side_effects.push(effect);
        self
    }
}

/// Handler for tool execution
///
/// Handlers are the boundary to domain collaborators. They receive validated
/// input and a read-only execution context, may perform arbitrary backend
/// I/O, and report failure through the returned `Result`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with validated input
    async fn execute(&self, input: &Value, context: &ExecutionContext) -> Result<ToolOutcome>;
}

/// A registered tool
#[derive(Clone)]
pub struct Tool {
    /// Tool name (used in provider tool calls)
    pub name: String,
    /// Tool description shown to the model
    pub description: String,
    /// Declared input schema
    pub parameters: ToolParameters,
    /// Handler invoked with validated input
    pub handler: Arc<dyn ToolHandler>,
}

impl Tool {
    /// Create a new tool
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
        }
    }

    /// Export the declared tool surface for a provider request
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: serde_json::to_value(&self.parameters).unwrap_or(Value::Null),
        }
    }

    /// Execute this tool with the given input
    pub async fn execute(&self, input: &Value, context: &ExecutionContext) -> Result<ToolOutcome> {
        self.handler.execute(input, context).await
    }
}

// Implement Debug manually since Arc<dyn ToolHandler> doesn't implement Debug
impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("handler", &"<handler>")
            .finish()
    }
}
