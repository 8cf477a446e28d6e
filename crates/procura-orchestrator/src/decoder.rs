// Stream decoder: raw provider frames -> internal event algebra
//
// Pure translation with no side effects or retries. A malformed frame maps to
// a decode error the caller logs and skips; one bad frame never terminates an
// otherwise healthy turn. The decoder tracks which block indices are open and
// of which kind so that orphaned or kind-mismatched deltas are rejected.

use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{OrchestrationError, Result};
use crate::provider::{RawEvent, TokenUsage};

/// Decoded provider event
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// The provider opened the assistant message
    MessageStart {
        /// Model reported by the provider
        model: Option<String>,
        /// Usage known at message start (prompt tokens)
        usage: Option<TokenUsage>,
    },
    /// A content block opened
    ContentBlockStart {
        /// Block index within the message
        index: usize,
        /// What kind of block opened
        block: BlockStart,
    },
    /// A fragment arrived for an open content block
    ContentBlockDelta {
        /// Block index within the message
        index: usize,
        /// The fragment
        delta: BlockDelta,
    },
    /// A content block closed
    ContentBlockStop {
        /// Block index within the message
        index: usize,
    },
    /// Message-level update (token usage)
    MessageDelta {
        /// Usage reported so far
        usage: Option<TokenUsage>,
    },
    /// The provider signalled end of turn
    MessageStop,
    /// A benign frame with no orchestration meaning (e.g. ping)
    Ignored,
}

/// Kind of content block announced at `ContentBlockStart`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockStart {
    /// Narrative text block
    Text,
    /// Tool-use request block
    ToolUse {
        /// Provider-assigned tool call id
        id: String,
        /// Tool name
        name: String,
    },
}

/// Fragment kind carried by `ContentBlockDelta`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockDelta {
    /// Narrative text fragment
    Text(String),
    /// Partial JSON fragment of a tool input
    PartialJson(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    ToolUse,
}

// Wire-level frame shapes (Anthropic messages stream)

#[derive(Deserialize)]
struct WireFrame {
    #[serde(rename = "type")]
    kind: String,
    index: Option<usize>,
    message: Option<WireMessage>,
    content_block: Option<WireBlock>,
    delta: Option<WireDelta>,
    usage: Option<TokenUsage>,
    error: Option<WireError>,
}

#[derive(Deserialize)]
struct WireMessage {
    model: Option<String>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct WireBlock {
    #[serde(rename = "type")]
    kind: String,
    id: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct WireDelta {
    #[serde(rename = "type")]
    kind: Option<String>,
    text: Option<String>,
    partial_json: Option<String>,
}

#[derive(Deserialize)]
struct WireError {
    message: Option<String>,
}

/// Decoder for one turn's raw event stream
///
/// Stateless per event apart from the open-block table, which exists to
/// validate that deltas and stops refer to blocks that were actually opened.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    open_blocks: HashMap<usize, BlockKind>,
}

impl StreamDecoder {
    /// Create a decoder for a fresh turn
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one raw frame into a provider event
    ///
    /// Ordering is preserved exactly as received. Unknown frame types and
    /// malformed payloads return `OrchestrationError::Decode`; a wire `error`
    /// frame is a provider connection failure and fatal to the turn.
    pub fn decode(&mut self, raw: &RawEvent) -> Result<ProviderEvent> {
        let frame: WireFrame = serde_json::from_str(&raw.data)
            .map_err(|e| OrchestrationError::Decode(format!("invalid frame payload: {e}")))?;

        match frame.kind.as_str() {
            "ping" => Ok(ProviderEvent::Ignored),

            "message_start" => {
                let message = frame.message;
                Ok(ProviderEvent::MessageStart {
                    model: message.as_ref().and_then(|m| m.model.clone()),
                    usage: message.and_then(|m| m.usage),
                })
            }

            "content_block_start" => {
                let index = frame
                    .index
                    .ok_or_else(|| OrchestrationError::Decode("block start without index".to_string()))?;
                let block = frame
                    .content_block
                    .ok_or_else(|| OrchestrationError::Decode("block start without content_block".to_string()))?;
                let start = match block.kind.as_str() {
                    "text" => BlockStart::Text,
                    "tool_use" => BlockStart::ToolUse {
                        id: block.id.ok_or_else(|| {
                            OrchestrationError::Decode("tool_use block without id".to_string())
                        })?,
                        name: block.name.ok_or_else(|| {
                            OrchestrationError::Decode("tool_use block without name".to_string())
                        })?,
                    },
                    other => {
                        return Err(OrchestrationError::Decode(format!(
                            "unknown content block type '{other}'"
                        )));
                    }
                };
                let kind = match start {
                    BlockStart::Text => BlockKind::Text,
                    BlockStart::ToolUse { .. } => BlockKind::ToolUse,
                };
                if self.open_blocks.insert(index, kind).is_some() {
                    return Err(OrchestrationError::Decode(format!(
                        "block index {index} opened twice"
                    )));
                }
                Ok(ProviderEvent::ContentBlockStart { index, block: start })
            }

            "content_block_delta" => {
                let index = frame
                    .index
                    .ok_or_else(|| OrchestrationError::Decode("block delta without index".to_string()))?;
                let kind = self.open_blocks.get(&index).copied().ok_or_else(|| {
                    OrchestrationError::Decode(format!("delta for unopened block {index}"))
                })?;
                let delta = frame
                    .delta
                    .ok_or_else(|| OrchestrationError::Decode("block delta without payload".to_string()))?;
                match (delta.kind.as_deref(), kind) {
                    (Some("text_delta"), BlockKind::Text) => {
                        let text = delta.text.ok_or_else(|| {
                            OrchestrationError::Decode("text_delta without text".to_string())
                        })?;
                        Ok(ProviderEvent::ContentBlockDelta { index, delta: BlockDelta::Text(text) })
                    }
                    (Some("input_json_delta"), BlockKind::ToolUse) => {
                        let fragment = delta.partial_json.ok_or_else(|| {
                            OrchestrationError::Decode("input_json_delta without partial_json".to_string())
                        })?;
                        Ok(ProviderEvent::ContentBlockDelta {
                            index,
                            delta: BlockDelta::PartialJson(fragment),
                        })
                    }
                    (Some(other), _) => Err(OrchestrationError::Decode(format!(
                        "delta type '{other}' does not match block {index}"
                    ))),
                    (None, _) => Err(OrchestrationError::Decode("delta without type".to_string())),
                }
            }

            "content_block_stop" => {
                let index = frame
                    .index
                    .ok_or_else(|| OrchestrationError::Decode("block stop without index".to_string()))?;
                if self.open_blocks.remove(&index).is_none() {
                    return Err(OrchestrationError::Decode(format!(
                        "stop for unopened block {index}"
                    )));
                }
                Ok(ProviderEvent::ContentBlockStop { index })
            }

            "message_delta" => Ok(ProviderEvent::MessageDelta { usage: frame.usage }),

            "message_stop" => Ok(ProviderEvent::MessageStop),

            "error" => Err(OrchestrationError::ProviderConnection(
                frame
                    .error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "provider reported an error".to_string()),
            )),

            other => Err(OrchestrationError::Decode(format!("unknown frame type '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(event: &str, data: serde_json::Value) -> RawEvent {
        RawEvent::new(event, data.to_string())
    }

    #[test]
    fn test_decode_message_lifecycle() {
        let mut decoder = StreamDecoder::new();

        let event = decoder
            .decode(&raw(
                "message_start",
                json!({"type": "message_start", "message": {"model": "claude-sonnet-4-20250514"}}),
            ))
            .unwrap();
        assert_eq!(
            event,
            ProviderEvent::MessageStart {
                model: Some("claude-sonnet-4-20250514".to_string()),
                usage: None,
            }
        );

        let event = decoder
            .decode(&raw("message_stop", json!({"type": "message_stop"})))
            .unwrap();
        assert_eq!(event, ProviderEvent::MessageStop);
    }

    #[test]
    fn test_decode_text_block() {
        let mut decoder = StreamDecoder::new();

        let event = decoder
            .decode(&raw(
                "content_block_start",
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text"}}),
            ))
            .unwrap();
        assert_eq!(event, ProviderEvent::ContentBlockStart { index: 0, block: BlockStart::Text });

        let event = decoder
            .decode(&raw(
                "content_block_delta",
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Creating "}}),
            ))
            .unwrap();
        assert_eq!(
            event,
            ProviderEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::Text("Creating ".to_string())
            }
        );

        let event = decoder
            .decode(&raw(
                "content_block_stop",
                json!({"type": "content_block_stop", "index": 0}),
            ))
            .unwrap();
        assert_eq!(event, ProviderEvent::ContentBlockStop { index: 0 });
    }

    #[test]
    fn test_decode_tool_use_block() {
        let mut decoder = StreamDecoder::new();

        let event = decoder
            .decode(&raw(
                "content_block_start",
                json!({
                    "type": "content_block_start",
                    "index": 1,
                    "content_block": {"type": "tool_use", "id": "toolu_1", "name": "create_record"}
                }),
            ))
            .unwrap();
        assert_eq!(
            event,
            ProviderEvent::ContentBlockStart {
                index: 1,
                block: BlockStart::ToolUse {
                    id: "toolu_1".to_string(),
                    name: "create_record".to_string()
                }
            }
        );

        let event = decoder
            .decode(&raw(
                "content_block_delta",
                json!({
                    "type": "content_block_delta",
                    "index": 1,
                    "delta": {"type": "input_json_delta", "partial_json": "{\"name\":"}
                }),
            ))
            .unwrap();
        assert_eq!(
            event,
            ProviderEvent::ContentBlockDelta {
                index: 1,
                delta: BlockDelta::PartialJson("{\"name\":".to_string())
            }
        );
    }

    #[test]
    fn test_decode_rejects_orphan_delta() {
        let mut decoder = StreamDecoder::new();
        let result = decoder.decode(&raw(
            "content_block_delta",
            json!({"type": "content_block_delta", "index": 3, "delta": {"type": "text_delta", "text": "x"}}),
        ));
        assert!(matches!(result, Err(OrchestrationError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_kind_mismatch() {
        let mut decoder = StreamDecoder::new();
        decoder
            .decode(&raw(
                "content_block_start",
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text"}}),
            ))
            .unwrap();

        // input_json_delta into a text block
        let result = decoder.decode(&raw(
            "content_block_delta",
            json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "input_json_delta", "partial_json": "{}"}
            }),
        ));
        assert!(matches!(result, Err(OrchestrationError::Decode(_))));
    }

    #[test]
    fn test_decode_malformed_payload() {
        let mut decoder = StreamDecoder::new();
        let result = decoder.decode(&RawEvent::new("content_block_delta", "not json"));
        assert!(matches!(result, Err(OrchestrationError::Decode(_))));
    }

    #[test]
    fn test_decode_unknown_frame_type() {
        let mut decoder = StreamDecoder::new();
        let result = decoder.decode(&raw("mystery", json!({"type": "mystery"})));
        assert!(matches!(result, Err(OrchestrationError::Decode(_))));
    }

    #[test]
    fn test_decode_ping_is_ignored() {
        let mut decoder = StreamDecoder::new();
        let event = decoder.decode(&raw("ping", json!({"type": "ping"}))).unwrap();
        assert_eq!(event, ProviderEvent::Ignored);
    }

    #[test]
    fn test_decode_message_start_usage() {
        let mut decoder = StreamDecoder::new();
        let event = decoder
            .decode(&raw(
                "message_start",
                json!({
                    "type": "message_start",
                    "message": {
                        "model": "claude-sonnet-4-20250514",
                        "usage": {"input_tokens": 100, "output_tokens": 1}
                    }
                }),
            ))
            .unwrap();
        assert_eq!(
            event,
            ProviderEvent::MessageStart {
                model: Some("claude-sonnet-4-20250514".to_string()),
                usage: Some(TokenUsage { input_tokens: 100, output_tokens: 1 }),
            }
        );
    }

    #[test]
    fn test_decode_usage_delta() {
        let mut decoder = StreamDecoder::new();
        let event = decoder
            .decode(&raw(
                "message_delta",
                json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 17}}),
            ))
            .unwrap();
        assert_eq!(
            event,
            ProviderEvent::MessageDelta {
                usage: Some(TokenUsage { input_tokens: 0, output_tokens: 17 })
            }
        );
    }

    #[test]
    fn test_decode_error_frame_is_fatal() {
        let mut decoder = StreamDecoder::new();
        let result = decoder.decode(&raw(
            "error",
            json!({"type": "error", "error": {"message": "overloaded"}}),
        ));
        assert!(matches!(result, Err(OrchestrationError::ProviderConnection(_))));
    }
}
