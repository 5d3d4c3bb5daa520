//! Prompt construction for the reasoner.
//!
//! The system prompt and the tool-call extractor share a negotiated JSON
//! envelope; changing one side means changing the other.

use std::fmt::Write;

use orchestrator_mcp::Tool;

use crate::{context::ConversationContext, orchestration::types::OrchestrationPreferences};

/// Number of trailing messages included when rendering history.
const HISTORY_WINDOW: usize = 10;

/// System prompt listing the tool catalog grouped by server, plus the
/// tool-call envelope directive.
pub fn system_prompt(tools: &[Tool]) -> String {
    let mut prompt = String::from(
        "You are an orchestration assistant with access to tools exposed by remote servers.\n\n\
         Available tools:\n",
    );

    if tools.is_empty() {
        prompt.push_str("(none)\n");
    }
    // The catalog arrives sorted by (server, tool), so grouping is a scan.
    let mut current_server: Option<&str> = None;
    for tool in tools {
        if current_server != Some(tool.server_name.as_str()) {
            let _ = writeln!(prompt, "Server: {}", tool.server_name);
            current_server = Some(tool.server_name.as_str());
        }
        let _ = writeln!(prompt, "  - {}: {}", tool.name, tool.description);
    }

    prompt.push_str(
        "\nWhen one or more tools are required to answer, reply with a single JSON object of the \
         form {\"action\": \"tool_call\", \"reasoning\": \"<why these tools>\", \"tool_calls\": \
         [{\"server_name\": \"<server>\", \"tool_name\": \"<tool>\", \"arguments\": {}}]}. \
         When no tools are needed, reply in plain prose.",
    );
    prompt
}

/// Synthesis prompt over collected tool results, selected by the requested
/// response format. Unknown formats fall back to the neutral template.
pub fn synthesis_prompt(
    original_message: &str,
    tool_results: &[String],
    preferences: &OrchestrationPreferences,
) -> String {
    match preferences.response_format.as_str() {
        "summary" => {
            let mut prompt = format!(
                "Provide a concise summary that answers the request below using the tool \
                 results.\n\nRequest: {original_message}\n\nTool results:\n"
            );
            for result in tool_results {
                let _ = writeln!(prompt, "- {result}");
            }
            prompt
        }
        "detailed" => {
            let mut prompt = format!(
                "Provide a comprehensive answer to the request below using the numbered tool \
                 results. Structure the answer with these sections: Summary, Key insights, \
                 Recommendations, Technical detail.\n\nRequest: {original_message}\n\n\
                 Tool results:\n"
            );
            for (index, result) in tool_results.iter().enumerate() {
                let _ = writeln!(prompt, "{}. {result}", index + 1);
            }
            prompt
        }
        "raw" => {
            let mut prompt = format!(
                "Format the raw tool results below for the user. Do not interpret or summarize \
                 them.\n\nRequest: {original_message}\n\nTool results:\n"
            );
            for result in tool_results {
                let _ = writeln!(prompt, "{result}");
            }
            prompt
        }
        _ => {
            let mut prompt = format!(
                "Using the tool results below, answer the request.\n\nRequest: \
                 {original_message}\n\nTool results:\n"
            );
            for result in tool_results {
                let _ = writeln!(prompt, "- {result}");
            }
            prompt
        }
    }
}

/// The last ten messages in order, rendered as `Role: content` lines.
pub fn history_text(ctx: &ConversationContext) -> String {
    let skip = ctx.messages.len().saturating_sub(HISTORY_WINDOW);
    ctx.messages
        .iter()
        .skip(skip)
        .map(|message| format!("{}: {}", message.role.label(), message.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::context::Role;

    fn tool(server: &str, name: &str, description: &str) -> Tool {
        Tool {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: json!({"type": "object"}),
            server_name: server.to_string(),
        }
    }

    fn prefs(format: &str) -> OrchestrationPreferences {
        OrchestrationPreferences {
            response_format: format.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_system_prompt_groups_by_server() {
        let tools = vec![
            tool("srvA", "echo", "Echo back"),
            tool("srvA", "search", "Search things"),
            tool("srvB", "fetch", "Fetch a URL"),
        ];

        let prompt = system_prompt(&tools);
        assert!(prompt.contains("Server: srvA\n  - echo: Echo back\n  - search: Search things\n"));
        assert!(prompt.contains("Server: srvB\n  - fetch: Fetch a URL\n"));
        // The envelope directive names the negotiated fields.
        assert!(prompt.contains("\"action\": \"tool_call\""));
        assert!(prompt.contains("\"tool_calls\""));
        assert!(prompt.contains("plain prose"));
    }

    #[test]
    fn test_system_prompt_empty_catalog() {
        let prompt = system_prompt(&[]);
        assert!(prompt.contains("(none)"));
        assert!(prompt.contains("\"action\": \"tool_call\""));
    }

    #[test]
    fn test_synthesis_summary_bullets() {
        let prompt = synthesis_prompt("weather?", &["sunny".into(), "22C".into()], &prefs("summary"));
        assert!(prompt.contains("concise summary"));
        assert!(prompt.contains("- sunny\n- 22C"));
    }

    #[test]
    fn test_synthesis_detailed_numbers_and_sections() {
        let prompt = synthesis_prompt("weather?", &["sunny".into(), "22C".into()], &prefs("detailed"));
        assert!(prompt.contains("1. sunny"));
        assert!(prompt.contains("2. 22C"));
        for section in ["Summary", "Key insights", "Recommendations", "Technical detail"] {
            assert!(prompt.contains(section), "missing section {section}");
        }
    }

    #[test]
    fn test_synthesis_raw() {
        let prompt = synthesis_prompt("weather?", &["sunny".into()], &prefs("raw"));
        assert!(prompt.contains("Do not interpret"));
        assert!(prompt.contains("sunny"));
    }

    #[test]
    fn test_synthesis_unknown_format_uses_default() {
        let prompt = synthesis_prompt("weather?", &["sunny".into()], &prefs("haiku"));
        assert!(prompt.contains("Using the tool results below"));
    }

    #[test]
    fn test_history_window_keeps_last_ten_in_order() {
        let manager = crate::context::ContextManager::new(Default::default());
        let mut ctx = manager.get_or_create("s1");
        for i in 0..12 {
            ctx.push_message(Role::User, format!("m{i}"));
        }

        let history = history_text(&ctx);
        let lines: Vec<&str> = history.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "User: m2");
        assert_eq!(lines[9], "User: m11");
    }

    #[test]
    fn test_history_capitalizes_roles() {
        let manager = crate::context::ContextManager::new(Default::default());
        let mut ctx = manager.get_or_create("s1");
        ctx.push_message(Role::User, "hi");
        ctx.push_message(Role::Assistant, "hello");

        assert_eq!(history_text(&ctx), "User: hi\nAssistant: hello");
    }
}
