//! Tool-call extraction from reasoner replies.
//!
//! The reply format is a negotiated contract with the prompt builder: when
//! the model wants tools it embeds a JSON object
//! `{"action": "tool_call", "reasoning": …, "tool_calls": […]}` somewhere in
//! its reply. Extraction must tolerate whatever the model actually emits:
//! malformed input yields an empty list, never an error.

use orchestrator_mcp::ToolCall;
use serde_json::Value;
use tracing::warn;

const TOOL_CALL_ACTION: &str = "tool_call";

/// Extract tool calls from a reasoner reply. Empty when the reply is plain
/// prose or the envelope is malformed.
pub fn extract_tool_calls(text: &str) -> Vec<ToolCall> {
    // Cheap pre-parse rejection before any slicing.
    if !(text.contains("action") && text.contains(TOOL_CALL_ACTION)) {
        return Vec::new();
    }

    let Some(candidate) = json_object_span(text) else {
        return Vec::new();
    };

    let Ok(envelope) = serde_json::from_str::<Value>(candidate) else {
        warn!("Reply resembled a tool-call envelope but did not parse as JSON");
        return Vec::new();
    };

    if envelope.get("action").and_then(Value::as_str) != Some(TOOL_CALL_ACTION) {
        return Vec::new();
    }

    let Some(entries) = envelope.get("tool_calls").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries.iter().filter_map(parse_call).collect()
}

/// The substring spanning the first `{` through the last `}`, if any.
fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn parse_call(entry: &Value) -> Option<ToolCall> {
    let server_name = entry.get("server_name").and_then(Value::as_str);
    let tool_name = entry.get("tool_name").and_then(Value::as_str);
    match (server_name, tool_name) {
        (Some(server_name), Some(tool_name)) => Some(ToolCall {
            server_name: server_name.to_string(),
            tool_name: tool_name.to_string(),
            arguments: entry
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default())),
        }),
        _ => {
            warn!("Skipping malformed tool_calls entry: {entry}");
            None
        }
    }
}
