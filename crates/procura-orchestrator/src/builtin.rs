// Built-in record-facing tools
//
// The handlers the orchestrator ships with. They are deliberately thin: each
// one delegates to an injected `RecordStore` collaborator and reports what
// the backend said, plus a UI refresh side effect where the workspace view
// goes stale. Persistence itself lives behind the trait.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::context::ExecutionContext;
use crate::error::{OrchestrationError, Result};
use crate::registry::ToolRegistry;
use crate::tool::{SideEffectNotification, Tool, ToolHandler, ToolOutcome, ToolParameters};

/// Backend collaborator for record CRUD
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a record, returning it with its assigned id
    async fn create_record(&self, fields: &Value, context: &ExecutionContext) -> Result<Value>;

    /// Apply field updates to an existing record, returning the updated record
    async fn update_record(
        &self,
        record_id: i64,
        fields: &Value,
        context: &ExecutionContext,
    ) -> Result<Value>;

    /// Fetch a record by id
    async fn get_record(&self, record_id: i64, context: &ExecutionContext) -> Result<Value>;
}

struct CreateRecordHandler {
    store: Arc<dyn RecordStore>,
}

#[async_trait]
impl ToolHandler for CreateRecordHandler {
    async fn execute(&self, input: &Value, context: &ExecutionContext) -> Result<ToolOutcome> {
        let record = self.store.create_record(input, context).await?;
        debug!(record = %record, "record created");
        Ok(ToolOutcome::new(record.clone())
            .with_side_effect(SideEffectNotification::ui_refresh("workspace", record)))
    }
}

struct UpdateRecordHandler {
    store: Arc<dyn RecordStore>,
}

#[async_trait]
impl ToolHandler for UpdateRecordHandler {
    async fn execute(&self, input: &Value, context: &ExecutionContext) -> Result<ToolOutcome> {
        let record_id = required_id(input, "update_record")?;
        let fields = input.get("fields").cloned().unwrap_or_else(|| json!({}));
        let record = self.store.update_record(record_id, &fields, context).await?;
        Ok(ToolOutcome::new(record.clone())
            .with_side_effect(SideEffectNotification::ui_refresh("workspace", record)))
    }
}

struct GetRecordHandler {
    store: Arc<dyn RecordStore>,
}

#[async_trait]
impl ToolHandler for GetRecordHandler {
    async fn execute(&self, input: &Value, context: &ExecutionContext) -> Result<ToolOutcome> {
        let record_id = required_id(input, "get_record")?;
        let record = self.store.get_record(record_id, context).await?;
        Ok(ToolOutcome::new(record))
    }
}

/// Pure side-effect tool: asks the client to re-fetch the workspace view
struct RefreshWorkspaceHandler;

#[async_trait]
impl ToolHandler for RefreshWorkspaceHandler {
    async fn execute(&self, input: &Value, _context: &ExecutionContext) -> Result<ToolOutcome> {
        let payload = input.get("reason").cloned().map_or_else(
            || json!({}),
            |reason| json!({ "reason": reason }),
        );
        Ok(ToolOutcome::new(json!({"refreshed": true}))
            .with_side_effect(SideEffectNotification::ui_refresh("workspace", payload)))
    }
}

fn required_id(input: &Value, tool: &str) -> Result<i64> {
    input
        .get("record_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| OrchestrationError::ToolExecutionFailed {
            tool: tool.to_string(),
            reason: "record_id is missing or not an integer".to_string(),
        })
}

/// Register the built-in tool set against a record store
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    store: Arc<dyn RecordStore>,
) -> Result<()> {
    registry.register(Tool::new(
        "create_record",
        "Create a new procurement record (RFP, order, supplier entry) and make it current",
        ToolParameters::new()
            .add_property("name", "string", "Record name", true)
            .add_property("description", "string", "Record description", false)
            .add_property("budget", "number", "Budget in the session currency", false),
        Arc::new(CreateRecordHandler { store: Arc::clone(&store) }),
    ))?;

    registry.register(Tool::new(
        "update_record",
        "Update fields of an existing procurement record",
        ToolParameters::new()
            .add_property("record_id", "integer", "Id of the record to update", true)
            .add_property("fields", "object", "Field values to apply", true),
        Arc::new(UpdateRecordHandler { store: Arc::clone(&store) }),
    ))?;

    registry.register(Tool::new(
        "get_record",
        "Fetch a procurement record by id",
        ToolParameters::new().add_property("record_id", "integer", "Id of the record", true),
        Arc::new(GetRecordHandler { store }),
    ))?;

    registry.register(Tool::new(
        "refresh_workspace",
        "Ask the client to re-fetch and re-render the workspace view",
        ToolParameters::new().add_property("reason", "string", "Why a refresh is needed", false),
        Arc::new(RefreshWorkspaceHandler),
    ))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::SideEffectKind;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory store for tests
    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<HashMap<i64, Value>>,
        next_id: Mutex<i64>,
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        async fn create_record(&self, fields: &Value, _context: &ExecutionContext) -> Result<Value> {
            let mut next_id = self.next_id.lock().await;
            *next_id += 1;
            let id = *next_id;

            let mut record = fields.clone();
            record["id"] = json!(id);
            self.records.lock().await.insert(id, record.clone());
            Ok(record)
        }

        async fn update_record(
            &self,
            record_id: i64,
            fields: &Value,
            _context: &ExecutionContext,
        ) -> Result<Value> {
            let mut records = self.records.lock().await;
            let record = records.get_mut(&record_id).ok_or_else(|| {
                OrchestrationError::ToolExecutionFailed {
                    tool: "update_record".to_string(),
                    reason: format!("record {record_id} not found"),
                }
            })?;
            if let (Some(record), Some(fields)) = (record.as_object_mut(), fields.as_object()) {
                for (key, value) in fields {
                    record.insert(key.clone(), value.clone());
                }
            }
            Ok(record.clone())
        }

        async fn get_record(&self, record_id: i64, _context: &ExecutionContext) -> Result<Value> {
            self.records.lock().await.get(&record_id).cloned().ok_or_else(|| {
                OrchestrationError::ToolExecutionFailed {
                    tool: "get_record".to_string(),
                    reason: format!("record {record_id} not found"),
                }
            })
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry, Arc::new(MemoryStore::default())).unwrap();
        registry
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new("user-1", "session-1")
    }

    #[test]
    fn test_builtin_registration() {
        let registry = registry();
        assert_eq!(registry.len(), 4);
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec!["create_record", "update_record", "get_record", "refresh_workspace"]
        );
    }

    #[tokio::test]
    async fn test_create_record_emits_ui_refresh() {
        let registry = registry();
        let tool = registry.lookup("create_record").unwrap();

        let outcome =
            tool.execute(&json!({"name": "Widget RFP"}), &context()).await.unwrap();

        assert_eq!(outcome.payload["name"], "Widget RFP");
        assert_eq!(outcome.payload["id"], 1);
        assert_eq!(outcome.side_effects.len(), 1);
        assert_eq!(outcome.side_effects[0].kind, SideEffectKind::UiRefresh);
        assert_eq!(outcome.side_effects[0].target_surface, "workspace");
    }

    #[tokio::test]
    async fn test_update_then_get_roundtrip() {
        let store = Arc::new(MemoryStore::default());
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry, store).unwrap();
        let ctx = context();

        let created = registry
            .lookup("create_record")
            .unwrap()
            .execute(&json!({"name": "Widget RFP", "budget": 1000}), &ctx)
            .await
            .unwrap();
        let id = created.payload["id"].as_i64().unwrap();

        let updated = registry
            .lookup("update_record")
            .unwrap()
            .execute(&json!({"record_id": id, "fields": {"budget": 2000}}), &ctx)
            .await
            .unwrap();
        assert_eq!(updated.payload["budget"], 2000);

        let fetched = registry
            .lookup("get_record")
            .unwrap()
            .execute(&json!({"record_id": id}), &ctx)
            .await
            .unwrap();
        assert_eq!(fetched.payload["budget"], 2000);
        assert_eq!(fetched.payload["name"], "Widget RFP");
    }

    #[tokio::test]
    async fn test_get_missing_record_fails() {
        let registry = registry();
        let result = registry
            .lookup("get_record")
            .unwrap()
            .execute(&json!({"record_id": 404}), &context())
            .await;
        assert!(matches!(result, Err(OrchestrationError::ToolExecutionFailed { .. })));
    }

    #[tokio::test]
    async fn test_refresh_workspace_is_pure_side_effect() {
        let registry = registry();
        let outcome = registry
            .lookup("refresh_workspace")
            .unwrap()
            .execute(&json!({"reason": "stale list"}), &context())
            .await
            .unwrap();

        assert_eq!(outcome.payload, json!({"refreshed": true}));
        assert_eq!(outcome.side_effects.len(), 1);
        assert_eq!(outcome.side_effects[0].payload, json!({"reason": "stale list"}));
    }
}
