use codelia_pool::AgentEvent;
use codelia_protocol::EventType;
use serde_json::Value;
use serde_json::json;

/// Translates a pool-level `AgentEvent` into the `(EventType, data)` shape a
/// `RunEvent` carries. `AgentEvent::Reasoning` has no type of its own in
/// spec.md §3's event-type list, so it rides on `text` with a `reasoning`
/// marker rather than inventing a new wire type.
pub fn translate(event: &AgentEvent) -> (EventType, Value) {
    match event {
        AgentEvent::Text(text) => (EventType::Text, json!({ "text": text })),
        AgentEvent::Reasoning(text) => (EventType::Text, json!({ "text": text, "reasoning": true })),
        AgentEvent::ToolCall { id, name, arguments } => (
            EventType::ToolCall,
            json!({ "id": id, "name": name, "arguments": arguments }),
        ),
        AgentEvent::ToolResult { tool_call_id, content, is_error } => (
            EventType::ToolResult,
            json!({ "tool_call_id": tool_call_id, "content": content, "is_error": is_error }),
        ),
        AgentEvent::Final(content) => (EventType::Final, json!({ "content": content })),
        AgentEvent::Error(message) => (EventType::Error, json!({ "message": message })),
    }
}
