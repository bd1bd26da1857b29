//! Native tool-calling.
//!
//! Two payload shapes are understood and told apart by their structure:
//!
//! - conventional: `{"choices": [{"message": {"content", "tool_calls": [...]}}]}`
//! - stateful: `{"id", "output": [{"type": "function_call" | "message" | "output_text", ...}]}`
//!
//! Either way the payload folds into one [`AssistantTurn`].

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};
use crate::message::ToolCall;
use crate::tool::ToolSchema;

/// Answer used when the model ends without tool calls and without text.
pub const NO_FINAL_ANSWER: &str = "No final answer returned.";

/// Which payload shape a turn arrived in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseShape {
    Conventional,
    Stateful,
}

/// One logical assistant turn.
#[derive(Clone, Debug, PartialEq)]
pub struct AssistantTurn {
    /// Concatenated text parts
    pub text: String,

    /// Tool calls in the order the model emitted them
    pub tool_calls: Vec<ToolCall>,

    /// Server-side response id (stateful shape)
    pub response_id: Option<String>,

    pub shape: ResponseShape,
}

impl AssistantTurn {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Final answer for a turn without tool calls
    pub fn final_answer(&self) -> String {
        let text = self.text.trim();
        if text.is_empty() {
            NO_FINAL_ANSWER.to_string()
        } else {
            text.to_string()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatPayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatFunction,
}

#[derive(Debug, Deserialize)]
struct ChatFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Extracts assistant turns and tool arguments from native tool-calling payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct StructuredCallExtractor;

impl StructuredCallExtractor {
    /// Fold a raw payload into one assistant turn.
    pub fn extract(&self, raw: &Value) -> Result<AssistantTurn> {
        match raw.get("output") {
            Some(Value::Array(items)) => Self::extract_stateful(raw, items),
            _ => Self::extract_conventional(raw),
        }
    }

    fn extract_conventional(raw: &Value) -> Result<AssistantTurn> {
        let payload: ChatPayload = serde_json::from_value(raw.clone())
            .map_err(|e| AgentError::MalformedResponse(format!("chat completion payload: {e}")))?;

        let choice = payload
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::MalformedResponse("no choices in response".into()))?;

        let text = choice
            .message
            .content
            .as_ref()
            .map(content_text)
            .unwrap_or_default();

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall::new(call.id, call.function.name, arguments_text(&call.function.arguments)))
            .collect();

        Ok(AssistantTurn {
            text,
            tool_calls,
            response_id: payload.id,
            shape: ResponseShape::Conventional,
        })
    }

    fn extract_stateful(raw: &Value, items: &[Value]) -> Result<AssistantTurn> {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for item in items {
            match item.get("type").and_then(Value::as_str) {
                Some("function_call") => tool_calls.push(function_call(item)?),
                Some("message") => {
                    if let Some(content) = item.get("content") {
                        text.push_str(&content_text(content));
                    }
                }
                Some("output_text") => {
                    if let Some(part) = item.get("text").and_then(Value::as_str) {
                        text.push_str(part);
                    }
                }
                // reasoning, web_search_call, ... carry nothing for the loop
                _ => {}
            }
        }

        // The top-level convenience field usually repeats the message text.
        if let Some(top) = raw.get("output_text").and_then(Value::as_str) {
            if !top.is_empty() && top != text {
                text.push_str(top);
            }
        }

        Ok(AssistantTurn {
            text,
            tool_calls,
            response_id: raw.get("id").and_then(Value::as_str).map(String::from),
            shape: ResponseShape::Stateful,
        })
    }

    /// Decode a call's argument string for the given tool.
    ///
    /// Empty arguments are synthesized only when the tool's input arity makes
    /// the intent unambiguous: `{}` for no inputs, `{key: ""}` for one.
    pub fn resolve_arguments(&self, call: &ToolCall, schema: &ToolSchema) -> Result<Value> {
        let encoded = call.arguments.trim();
        if encoded.is_empty() {
            let keys: Vec<&str> = schema.input_keys().collect();
            return match keys.as_slice() {
                [] => Ok(Value::Object(Map::new())),
                [key] => {
                    let mut args = Map::new();
                    args.insert((*key).to_string(), Value::String(String::new()));
                    Ok(Value::Object(args))
                }
                _ => Err(AgentError::ToolArguments {
                    tool: call.name.clone(),
                    message: format!(
                        "no arguments given but the tool takes {} inputs ({})",
                        keys.len(),
                        keys.join(", ")
                    ),
                }),
            };
        }

        serde_json::from_str(encoded).map_err(|e| AgentError::ToolArguments {
            tool: call.name.clone(),
            message: format!("malformed JSON arguments: {e}"),
        })
    }
}

fn function_call(item: &Value) -> Result<ToolCall> {
    let field = |key: &str| item.get(key).and_then(Value::as_str).map(String::from);

    let name = field("name")
        .ok_or_else(|| AgentError::MalformedResponse("function_call item without a name".into()))?;
    let call_id = field("call_id");
    let id = field("id")
        .or_else(|| call_id.clone())
        .ok_or_else(|| AgentError::MalformedResponse(format!("function_call '{name}' has no id")))?;
    let arguments = item.get("arguments").map(arguments_text).unwrap_or_default();

    Ok(ToolCall {
        id,
        call_id,
        name,
        arguments,
    })
}

/// Text of a content value: a plain string or a list of typed parts.
fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter(|part| {
                matches!(
                    part.get("type").and_then(Value::as_str),
                    Some("output_text" | "text") | None
                )
            })
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect(),
        _ => String::new(),
    }
}

/// Some backends send arguments as an object instead of an encoded string.
fn arguments_text(arguments: &Value) -> String {
    match arguments {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ParameterSchema;
    use serde_json::json;

    fn extract(raw: &Value) -> AssistantTurn {
        StructuredCallExtractor.extract(raw).unwrap()
    }

    #[test]
    fn test_conventional_with_tool_calls() {
        let turn = extract(&json!({
            "id": "chatcmpl-1",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "search", "arguments": "{\"q\": \"rust\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }));

        assert_eq!(turn.shape, ResponseShape::Conventional);
        assert_eq!(turn.text, "");
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].id, "call_abc");
        assert_eq!(turn.tool_calls[0].arguments, r#"{"q": "rust"}"#);
        assert!(turn.tool_calls[0].call_id.is_none());
    }

    #[test]
    fn test_conventional_text_only() {
        let turn = extract(&json!({
            "choices": [{"message": {"content": "It is sunny."}}]
        }));
        assert!(!turn.has_tool_calls());
        assert_eq!(turn.final_answer(), "It is sunny.");
    }

    #[test]
    fn test_conventional_without_choices_is_malformed() {
        let err = StructuredCallExtractor.extract(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse(_)));
    }

    #[test]
    fn test_stateful_folds_items() {
        let turn = extract(&json!({
            "id": "resp_123",
            "output": [
                {
                    "type": "function_call",
                    "id": "fc_1",
                    "call_id": "call_1",
                    "name": "search",
                    "arguments": "{\"q\":\"weather\"}"
                },
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [{"type": "output_text", "text": "Checking the weather."}]
                }
            ]
        }));

        assert_eq!(turn.shape, ResponseShape::Stateful);
        assert_eq!(turn.response_id.as_deref(), Some("resp_123"));
        assert_eq!(turn.text, "Checking the weather.");
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].id, "fc_1");
        assert_eq!(turn.tool_calls[0].output_id(), "call_1");
    }

    #[test]
    fn test_stateful_top_level_output_text() {
        let turn = extract(&json!({
            "id": "resp_1",
            "output": [
                {"type": "message", "content": [{"type": "output_text", "text": "Hello"}]}
            ],
            "output_text": "Hello"
        }));
        assert_eq!(turn.text, "Hello");

        let turn = extract(&json!({
            "id": "resp_2",
            "output": [{"type": "reasoning", "summary": []}],
            "output_text": "From the top level"
        }));
        assert_eq!(turn.text, "From the top level");
    }

    #[test]
    fn test_stateful_empty_text_fallback() {
        let turn = extract(&json!({"id": "resp_3", "output": []}));
        assert_eq!(turn.final_answer(), NO_FINAL_ANSWER);
    }

    #[test]
    fn test_resolve_empty_arguments_by_arity() {
        let none = ToolSchema::new("clock", "Current time");
        let one = ToolSchema::new("search", "Search")
            .param(ParameterSchema::new("query", "string", "Query").required());
        let two = one.clone().param(ParameterSchema::new("limit", "integer", "Max results"));

        let extractor = StructuredCallExtractor;
        let call = |name: &str| ToolCall::new("call_1", name, "  ");

        assert_eq!(extractor.resolve_arguments(&call("clock"), &none).unwrap(), json!({}));
        assert_eq!(
            extractor.resolve_arguments(&call("search"), &one).unwrap(),
            json!({"query": ""})
        );
        let err = extractor.resolve_arguments(&call("search"), &two).unwrap_err();
        assert!(matches!(err, AgentError::ToolArguments { .. }));
    }

    #[test]
    fn test_resolve_malformed_arguments_is_fatal() {
        let schema = ToolSchema::new("search", "Search");
        let call = ToolCall::new("call_1", "search", "{not json");
        let err = StructuredCallExtractor
            .resolve_arguments(&call, &schema)
            .unwrap_err();
        assert!(err.to_string().contains("malformed JSON arguments"));
    }

    #[test]
    fn test_object_arguments_are_reencoded() {
        let turn = extract(&json!({
            "choices": [{"message": {"tool_calls": [{
                "id": "call_1",
                "function": {"name": "search", "arguments": {"q": "rust"}}
            }]}}]
        }));
        assert_eq!(turn.tool_calls[0].arguments, r#"{"q":"rust"}"#);
    }
}
