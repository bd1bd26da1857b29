//! Tool System
//!
//! Tools are the callable capabilities of a run. The registry is built once,
//! is immutable for the duration of a run, and enforces unique names.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{AgentError, Result, ToolError};

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    pub fn new(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: false,
            default: None,
            enum_values: None,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    #[must_use]
    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }
}

/// Tool descriptor
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Whether the tool's observation ends the run as its final answer
    #[serde(default)]
    pub returns_directly: bool,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            returns_directly: false,
        }
    }

    #[must_use]
    pub fn param(mut self, param: ParameterSchema) -> Self {
        self.parameters.push(param);
        self
    }

    #[must_use]
    pub const fn returns_directly(mut self) -> Self {
        self.returns_directly = true;
        self
    }

    /// Declared input keys, in order
    pub fn input_keys(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    /// JSON schema describing the tool input object
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            let mut prop = Map::new();
            prop.insert("type".into(), json!(param.param_type));
            prop.insert("description".into(), json!(param.description));
            if let Some(values) = &param.enum_values {
                prop.insert("enum".into(), Value::Array(values.clone()));
            }
            if let Some(default) = &param.default {
                prop.insert("default".into(), default.clone());
            }
            properties.insert(param.name.clone(), Value::Object(prop));
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Native tool-calling specification
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema(),
        }
    }
}

/// Tool specification sent to models with native tool-calling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    /// Conventional (chat completions) form
    pub fn to_chat_json(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }

    /// Stateful (responses) form
    pub fn to_responses_json(&self) -> Value {
        json!({
            "type": "function",
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters,
        })
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's descriptor
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with normalized input
    async fn invoke(&self, input: Value) -> std::result::Result<Value, ToolError>;

    /// Validate input before execution (optional)
    fn validate(&self, input: &Value) -> std::result::Result<(), ToolError> {
        let schema = self.schema();
        let object = input.as_object();

        for param in schema.parameters.iter().filter(|p| p.required) {
            if !object.is_some_and(|o| o.contains_key(&param.name)) {
                return Err(ToolError::InvalidInput(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

/// A registered tool with its descriptor captured at registration time.
#[derive(Clone)]
pub struct RegisteredTool {
    schema: ToolSchema,
    tool: Arc<dyn Tool>,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.schema.name)
            .field("returns_directly", &self.schema.returns_directly)
            .finish_non_exhaustive()
    }
}

impl RegisteredTool {
    pub const fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub const fn returns_directly(&self) -> bool {
        self.schema.returns_directly
    }

    /// Coerce protocol input into the object shape the tool expects.
    ///
    /// Text protocols hand over a bare string: it is parsed as a JSON object
    /// when possible, otherwise wrapped under the tool's only parameter.
    pub fn normalize_input(&self, input: Value) -> Value {
        let keys: Vec<&str> = self.schema.input_keys().collect();
        match input {
            Value::Null => Value::Object(Map::new()),
            Value::String(text) => {
                if let Ok(Value::Object(parsed)) = serde_json::from_str::<Value>(text.trim()) {
                    return Value::Object(parsed);
                }
                match keys.as_slice() {
                    [] => Value::Object(Map::new()),
                    [key] => {
                        let mut wrapped = Map::new();
                        wrapped.insert((*key).to_string(), Value::String(text));
                        Value::Object(wrapped)
                    }
                    _ => Value::String(text),
                }
            }
            other => other,
        }
    }

    /// Normalize, validate and invoke.
    pub async fn invoke(&self, input: Value) -> std::result::Result<Value, ToolError> {
        let input = self.normalize_input(input);
        self.tool.validate(&input)?;
        self.tool.invoke(input).await
    }
}

/// Registry for available tools
#[derive(Clone, Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry, rejecting duplicate names
    pub fn from_tools(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Result<Self> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register_arc(tool)?;
        }
        Ok(registry)
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let schema = tool.schema();
        if self.index.contains_key(&schema.name) {
            return Err(AgentError::DuplicateTool(schema.name));
        }
        self.index.insert(schema.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool { schema, tool });
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Tool descriptors in registration order
    pub fn schemas(&self) -> impl Iterator<Item = &ToolSchema> {
        self.tools.iter().map(RegisteredTool::schema)
    }

    /// Native tool-calling specs in registration order
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.schemas().map(ToolSchema::spec).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(RegisteredTool::name).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool list for text-protocol prompts
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for schema in self.schemas() {
            out.push_str(&format!("{}: {}", schema.name, schema.description));
            if !schema.parameters.is_empty() {
                let params: Vec<String> = schema
                    .parameters
                    .iter()
                    .map(|p| {
                        let required = if p.required { ", required" } else { "" };
                        format!("{} ({}{}): {}", p.name, p.param_type, required, p.description)
                    })
                    .collect();
                out.push_str(&format!(" Input: {}", params.join("; ")));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Echoes its `text` parameter.
    pub struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("echo", "Repeat the given text")
                .param(ParameterSchema::new("text", "string", "Text to repeat").required())
        }

        async fn invoke(&self, input: Value) -> std::result::Result<Value, ToolError> {
            Ok(input["text"].clone())
        }
    }

    struct PairTool;

    #[async_trait]
    impl Tool for PairTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("pair", "Join two values")
                .param(ParameterSchema::new("left", "string", "Left").required())
                .param(ParameterSchema::new("right", "string", "Right").required())
        }

        async fn invoke(&self, input: Value) -> std::result::Result<Value, ToolError> {
            Ok(json!(format!("{}{}", input["left"], input["right"])))
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        let err = registry.register(EchoTool).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(name) if name == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_order_and_lookup() {
        let registry =
            ToolRegistry::from_tools([Arc::new(PairTool) as Arc<dyn Tool>, Arc::new(EchoTool)])
                .unwrap();
        assert_eq!(registry.names(), vec!["pair", "echo"]);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("unknown").is_none());
        assert!(registry.describe().starts_with("pair: Join two values"));
    }

    #[test]
    fn test_input_schema() {
        let schema = EchoTool.schema().input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["text"]["type"], "string");
        assert_eq!(schema["required"], json!(["text"]));
    }

    #[test]
    fn test_spec_shapes() {
        let spec = EchoTool.schema().spec();
        assert_eq!(spec.to_chat_json()["function"]["name"], "echo");
        assert_eq!(spec.to_responses_json()["name"], "echo");
    }

    #[test]
    fn test_normalize_string_input() {
        let registry = ToolRegistry::from_tools([Arc::new(EchoTool) as Arc<dyn Tool>]).unwrap();
        let echo = registry.get("echo").unwrap();
        assert_eq!(echo.normalize_input(json!("hi")), json!({"text": "hi"}));
        assert_eq!(
            echo.normalize_input(json!(r#"{"text": "raw"}"#)),
            json!({"text": "raw"})
        );
        assert_eq!(echo.normalize_input(Value::Null), json!({}));
    }

    #[tokio::test]
    async fn test_validation_runs_before_invoke() {
        let registry = ToolRegistry::from_tools([Arc::new(PairTool) as Arc<dyn Tool>]).unwrap();
        let pair = registry.get("pair").unwrap();

        let err = pair.invoke(json!("only one")).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));

        let out = pair.invoke(json!({"left": "a", "right": "b"})).await.unwrap();
        assert_eq!(out, json!(r#""a""b""#));
    }
}
