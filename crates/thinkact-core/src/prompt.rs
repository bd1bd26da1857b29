//! Prompt Rendering
//!
//! Inputs shared by the text protocols when building the next prompt.

use crate::message::{Message, Role};
use crate::step::AgentStep;
use crate::tool::ToolRegistry;

/// Default system prompt for all protocols
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. \
Answer the question as well as you can, using the available tools when they help.";

/// Everything a protocol needs to render a prompt.
#[derive(Clone, Copy, Debug)]
pub struct PromptContext<'a> {
    pub system_prompt: &'a str,
    pub tools: &'a ToolRegistry,
    pub history: &'a [Message],
    pub goal: &'a str,
    pub steps: &'a [AgentStep],
}

impl PromptContext<'_> {
    /// Comma-separated tool names
    pub fn tool_names(&self) -> String {
        self.tools.names().join(", ")
    }

    /// Prior conversation as plain text, empty when there is none.
    pub fn history_text(&self) -> String {
        let lines: Vec<String> = self
            .history
            .iter()
            .filter(|m| m.role != Role::System && !m.content.is_empty())
            .map(|m| format!("{}: {}", speaker(m.role), m.content))
            .collect();
        if lines.is_empty() {
            String::new()
        } else {
            format!("Previous conversation:\n{}\n\n", lines.join("\n"))
        }
    }
}

const fn speaker(role: Role) -> &'static str {
    match role {
        Role::System => "System",
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::Tool => "Tool",
    }
}

/// Escape text for inclusion inside markup elements
pub fn escape_markup(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}
