//! LLM Provider Strategy Pattern
//!
//! Defines the model-client contract the runtime drives. Adapters for concrete
//! backends live outside this crate and only need to implement [`LlmProvider`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use thinkact_core::provider::{Capability, LlmProvider, ModelRequest};
//!
//! if provider.supports(Capability::ToolCalling) {
//!     let completion = provider.generate(&request).await?;
//! }
//! ```

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::message::{Message, Role, ToolCall};
use crate::tool::ToolSpec;

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "gpt-4o-mini", "llama3.2")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Stop sequences
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

const fn default_temperature() -> f32 {
    0.0
}

const fn default_max_tokens() -> u32 {
    2048
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stop_sequences: Vec::new(),
        }
    }
}

/// Optional features a model client may advertise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Native tool/function calling
    ToolCalling,
    /// Stateful response shape (server-side response ids)
    ResponsesApi,
    /// JSON-schema constrained output
    StructuredOutputJsonSchema,
    /// Plain JSON-object output mode
    NativeJsonObject,
}

impl Capability {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToolCalling => "tool_calling",
            Self::ResponsesApi => "responses_api",
            Self::StructuredOutputJsonSchema => "structured_output_json_schema",
            Self::NativeJsonObject => "native_json_object",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability set fixed when a client is constructed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Input item of a stateful (responses-shape) request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseItem {
    Message { role: Role, content: String },
    FunctionCall { call_id: String, name: String, arguments: String },
    FunctionCallOutput { call_id: String, output: String },
}

impl ResponseItem {
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::FunctionCallOutput {
            call_id: call_id.into(),
            output: output.into(),
        }
    }

    /// Flatten a transcript into input items for an opening stateful request.
    ///
    /// Tool results addressed by a call's item id are re-keyed to the call's
    /// `call_id`, so every output pairs with the `function_call` it answers.
    pub fn from_messages(messages: &[Message]) -> Vec<Self> {
        let mut items = Vec::with_capacity(messages.len());
        let mut calls: &[ToolCall] = &[];
        for message in messages {
            match message.role {
                Role::Tool => {
                    let addressed = message.tool_call_id.as_deref().unwrap_or_default();
                    let call_id = calls
                        .iter()
                        .find(|call| call.id == addressed)
                        .map_or(addressed, ToolCall::output_id);
                    items.push(Self::function_call_output(call_id, message.content.clone()));
                }
                Role::Assistant if !message.tool_calls.is_empty() => {
                    calls = message.tool_calls.as_slice();
                    if !message.content.is_empty() {
                        items.push(Self::Message {
                            role: Role::Assistant,
                            content: message.content.clone(),
                        });
                    }
                    items.extend(message.tool_calls.iter().map(|call| Self::FunctionCall {
                        call_id: call.output_id().to_string(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    }));
                }
                role => items.push(Self::Message {
                    role,
                    content: message.content.clone(),
                }),
            }
        }
        items
    }
}

/// What the model is asked to continue from.
#[derive(Clone, Debug)]
pub enum RequestInput {
    /// A single rendered prompt (text protocols)
    Prompt(String),
    /// The full message transcript (conventional tool-calling)
    Messages(Vec<Message>),
    /// Stateful shape: only incremental items on continuation turns
    Responses {
        items: Vec<ResponseItem>,
        previous_response_id: Option<String>,
    },
}

/// A single request to the model client.
#[derive(Clone, Debug)]
pub struct ModelRequest {
    pub input: RequestInput,

    /// Tool specs for native tool-calling; empty for text protocols
    pub tools: Vec<ToolSpec>,

    pub options: GenerationOptions,
}

impl ModelRequest {
    pub fn prompt(prompt: impl Into<String>, options: GenerationOptions) -> Self {
        Self {
            input: RequestInput::Prompt(prompt.into()),
            tools: Vec::new(),
            options,
        }
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text (best-effort for native payloads)
    pub content: String,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,

    /// Raw provider payload, required for native tool-calling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn raw(raw: Value) -> Self {
        Self {
            raw: Some(raw),
            ..Default::default()
        }
    }
}

/// Token usage statistics
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
    Error,
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The agent works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Capabilities, fixed at construction
    fn capabilities(&self) -> &Capabilities;

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(capability)
    }

    /// Generate a completion
    async fn generate(&self, request: &ModelRequest) -> Result<Completion>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert!(opts.temperature.abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens, 2048);
        assert!(opts.stop_sequences.is_empty());
    }

    #[test]
    fn test_capabilities() {
        let caps: Capabilities = [Capability::ToolCalling, Capability::ResponsesApi]
            .into_iter()
            .collect();
        assert!(caps.contains(Capability::ToolCalling));
        assert!(!caps.contains(Capability::NativeJsonObject));
        assert_eq!(caps.iter().count(), 2);
    }

    #[test]
    fn test_function_call_output_wire_format() {
        let item = ResponseItem::function_call_output("call_1", "sunny");
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            serde_json::json!({"type": "function_call_output", "call_id": "call_1", "output": "sunny"})
        );
    }

    #[test]
    fn test_items_from_transcript() {
        let mut call = ToolCall::new("fc_1", "search", r#"{"q":"rust"}"#);
        call.call_id = Some("call_1".into());
        let messages = vec![
            Message::system("sys"),
            Message::user("find rust"),
            Message::assistant_tool_calls("", vec![call]),
            Message::tool_result("call_1", "search", "found"),
        ];

        let items = ResponseItem::from_messages(&messages);
        assert_eq!(items.len(), 4);
        assert!(matches!(&items[2], ResponseItem::FunctionCall { call_id, .. } if call_id == "call_1"));
        assert_eq!(items[3], ResponseItem::function_call_output("call_1", "found"));
    }

    #[test]
    fn test_item_id_results_are_rekeyed_to_call_id() {
        let mut call = ToolCall::new("fc_1", "search", "{}");
        call.call_id = Some("call_1".into());
        let messages = vec![
            Message::assistant_tool_calls("", vec![call]),
            Message::tool_result("fc_1", "search", "found"),
            Message::tool_result("orphan", "search", "kept"),
        ];

        let items = ResponseItem::from_messages(&messages);
        assert_eq!(items[1], ResponseItem::function_call_output("call_1", "found"));
        assert_eq!(items[2], ResponseItem::function_call_output("orphan", "kept"));
    }
}
