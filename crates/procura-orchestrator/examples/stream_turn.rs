// Run one streaming turn against the live API with the built-in tools.
//
// ANTHROPIC_API_KEY=... cargo run --example stream_turn -- "Create an RFP named Widget RFP"

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use procura_orchestrator::{
    register_builtin_tools, ChatMessage, ClaudeClient, EventEmitter, ExecutionContext,
    OrchestrationError, RecordStore, Result, ToolRegistry, TurnEngine, TurnRequest,
};

/// In-memory record store so the example has something to create against
#[derive(Default)]
struct MemoryStore {
    records: tokio::sync::Mutex<Vec<Value>>,
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_record(&self, fields: &Value, _context: &ExecutionContext) -> Result<Value> {
        let mut records = self.records.lock().await;
        let mut record = fields.clone();
        record["id"] = json!(records.len() as i64 + 1);
        records.push(record.clone());
        Ok(record)
    }

    async fn update_record(
        &self,
        record_id: i64,
        fields: &Value,
        _context: &ExecutionContext,
    ) -> Result<Value> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r["id"].as_i64() == Some(record_id))
            .ok_or_else(|| OrchestrationError::ToolExecutionFailed {
                tool: "update_record".to_string(),
                reason: format!("record {record_id} not found"),
            })?;
        if let (Some(record), Some(fields)) = (record.as_object_mut(), fields.as_object()) {
            for (key, value) in fields {
                record.insert(key.clone(), value.clone());
            }
        }
        Ok(record.clone())
    }

    async fn get_record(&self, record_id: i64, _context: &ExecutionContext) -> Result<Value> {
        let records = self.records.lock().await;
        records
            .iter()
            .find(|r| r["id"].as_i64() == Some(record_id))
            .cloned()
            .ok_or_else(|| OrchestrationError::ToolExecutionFailed {
                tool: "get_record".to_string(),
                reason: format!("record {record_id} not found"),
            })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "procura_orchestrator=debug".into()),
        )
        .init();

    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .map_err(|_| OrchestrationError::ProviderConnection("ANTHROPIC_API_KEY not set".to_string()))?;
    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Create an RFP named Widget RFP with a budget of 5000".to_string());

    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, Arc::new(MemoryStore::default()))?;

    let engine = TurnEngine::new(Arc::new(ClaudeClient::new(api_key)), Arc::new(registry));
    let (emitter, mut frames) = EventEmitter::channel();

    let printer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            println!("{frame}");
        }
    });

    let context = ExecutionContext::new("example-user", "example-session");
    let request = TurnRequest::new("claude-sonnet-4-20250514", vec![ChatMessage::user(prompt)])
        .with_system("You are a procurement assistant. Use the available tools to manage records.");

    let report = engine
        .run_turn(request, &context, &emitter, CancellationToken::new())
        .await?;
    drop(emitter);
    let _ = printer.await;

    println!(
        "turn finished: tools={:?} tokens={}/{}",
        report.tools_used, report.usage.input_tokens, report.usage.output_tokens
    );
    Ok(())
}
