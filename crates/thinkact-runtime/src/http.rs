//! OpenAI-compatible HTTP provider.
//!
//! Text prompts and message transcripts go to `/chat/completions`; stateful
//! requests go to `/responses`. The raw JSON body is always kept on the
//! completion so native tool-calling can read either shape.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thinkact_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    parser::StructuredCallExtractor,
    provider::{
        Capabilities, Capability, Completion, FinishReason, GenerationOptions, LlmProvider,
        ModelRequest, RequestInput, ResponseItem, TokenUsage,
    },
    tool::ToolSpec,
};
use tracing::{debug, error};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// HTTP provider configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpProviderConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub api_base: String,

    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Advertise the stateful `/responses` endpoint
    pub responses_api: bool,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.into(),
            api_key: None,
            responses_api: false,
            timeout_secs: 120,
        }
    }
}

impl HttpProviderConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `THINKACT_API_KEY` wins over `OPENAI_API_KEY`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(base) = lookup("THINKACT_API_BASE") {
            config.api_base = base;
        }
        config.api_key = lookup("THINKACT_API_KEY")
            .or_else(|| lookup("OPENAI_API_KEY"))
            .filter(|key| !key.is_empty());
        if let Some(flag) = lookup("THINKACT_RESPONSES_API") {
            config.responses_api = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(secs) = lookup("THINKACT_TIMEOUT_SECS") {
            config.timeout_secs = secs.trim().parse().map_err(|_| {
                AgentError::Config(format!("THINKACT_TIMEOUT_SECS is not a number: '{secs}'"))
            })?;
        }

        Ok(config)
    }
}

/// Provider for OpenAI-compatible chat and responses endpoints
pub struct HttpProvider {
    client: reqwest::Client,
    config: HttpProviderConfig,
    capabilities: Capabilities,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;

        let mut capabilities = Capabilities::new()
            .with(Capability::ToolCalling)
            .with(Capability::StructuredOutputJsonSchema)
            .with(Capability::NativeJsonObject);
        if config.responses_api {
            capabilities = capabilities.with(Capability::ResponsesApi);
        }

        Ok(Self {
            client,
            config,
            capabilities,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(HttpProviderConfig::from_env()?)
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.config.api_base.trim_end_matches('/'))
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value> {
        let url = self.url(endpoint);
        debug!(url = %url, "POST");

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            error!(url = %url, error = %e, "HTTP request failed");
            if e.is_connect() || e.is_timeout() {
                AgentError::ProviderUnavailable(e.to_string())
            } else {
                AgentError::Provider(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(status = %status, body = %body, "API error");
            return Err(match status.as_u16() {
                429 => AgentError::RateLimited(body),
                401 | 403 => AgentError::Auth(body),
                code if code >= 500 => AgentError::ProviderUnavailable(format!("{status}: {body}")),
                _ => AgentError::Provider(format!("{status}: {body}")),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AgentError::MalformedResponse(format!("response body is not JSON: {e}")))
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn generate(&self, request: &ModelRequest) -> Result<Completion> {
        let (endpoint, body) = match &request.input {
            RequestInput::Prompt(prompt) => (
                "chat/completions",
                chat_body(&[Message::user(prompt.clone())], &request.tools, &request.options),
            ),
            RequestInput::Messages(messages) => (
                "chat/completions",
                chat_body(messages, &request.tools, &request.options),
            ),
            RequestInput::Responses {
                items,
                previous_response_id,
            } => {
                if !self.supports(Capability::ResponsesApi) {
                    return Err(AgentError::MissingCapability(
                        Capability::ResponsesApi.to_string(),
                    ));
                }
                (
                    "responses",
                    responses_body(
                        items,
                        previous_response_id.as_deref(),
                        &request.tools,
                        &request.options,
                    )?,
                )
            }
        };

        let raw = self.post(endpoint, &body).await?;
        Ok(completion(raw, &request.options.model))
    }
}

fn chat_message(message: &Message) -> Value {
    let mut object = Map::new();
    object.insert("role".into(), json!(message.role.as_str()));

    match message.role {
        Role::Assistant if !message.tool_calls.is_empty() => {
            let content = if message.content.is_empty() {
                Value::Null
            } else {
                json!(message.content)
            };
            object.insert("content".into(), content);
            let calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {"name": call.name, "arguments": call.arguments},
                    })
                })
                .collect();
            object.insert("tool_calls".into(), Value::Array(calls));
        }
        Role::Tool => {
            object.insert("content".into(), json!(message.content));
            object.insert("tool_call_id".into(), json!(message.tool_call_id));
        }
        _ => {
            object.insert("content".into(), json!(message.content));
        }
    }

    Value::Object(object)
}

fn chat_body(messages: &[Message], tools: &[ToolSpec], options: &GenerationOptions) -> Value {
    let mut body = json!({
        "model": options.model,
        "messages": messages.iter().map(chat_message).collect::<Vec<_>>(),
        "temperature": options.temperature,
        "max_tokens": options.max_tokens,
    });

    if !options.stop_sequences.is_empty() {
        body["stop"] = json!(options.stop_sequences);
    }
    if !tools.is_empty() {
        body["tools"] = Value::Array(tools.iter().map(ToolSpec::to_chat_json).collect());
        body["tool_choice"] = json!("auto");
    }
    body
}

fn responses_body(
    items: &[ResponseItem],
    previous_response_id: Option<&str>,
    tools: &[ToolSpec],
    options: &GenerationOptions,
) -> Result<Value> {
    let mut body = json!({
        "model": options.model,
        "input": serde_json::to_value(items)?,
        "temperature": options.temperature,
        "max_output_tokens": options.max_tokens,
    });

    if let Some(id) = previous_response_id {
        body["previous_response_id"] = json!(id);
    }
    if !tools.is_empty() {
        body["tools"] = Value::Array(tools.iter().map(ToolSpec::to_responses_json).collect());
    }
    Ok(body)
}

fn completion(raw: Value, requested_model: &str) -> Completion {
    let content = StructuredCallExtractor
        .extract(&raw)
        .map(|turn| turn.text)
        .unwrap_or_default();
    let model = raw
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(requested_model)
        .to_string();

    Completion {
        content,
        model,
        usage: usage(&raw),
        finish_reason: finish_reason(&raw),
        raw: Some(raw),
    }
}

/// Chat reports prompt/completion tokens, responses reports input/output.
fn usage(raw: &Value) -> Option<TokenUsage> {
    let usage = raw.get("usage")?;
    let count = |keys: [&str; 2]| {
        keys.iter()
            .find_map(|key| usage.get(*key).and_then(Value::as_u64))
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    };

    let prompt_tokens = count(["prompt_tokens", "input_tokens"]);
    let completion_tokens = count(["completion_tokens", "output_tokens"]);
    let total_tokens = usage
        .get("total_tokens")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(prompt_tokens + completion_tokens);

    Some(TokenUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens,
    })
}

fn finish_reason(raw: &Value) -> Option<FinishReason> {
    let reason = raw.pointer("/choices/0/finish_reason")?.as_str()?;
    Some(match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolUse,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use thinkact_core::{AgentBuilder, ProtocolKind, ToolCall};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::builtins::CalculatorTool;

    fn provider(server: &MockServer, responses_api: bool) -> HttpProvider {
        HttpProvider::new(HttpProviderConfig {
            api_base: server.uri(),
            api_key: Some("test-key".into()),
            responses_api,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-fallback"),
            ("THINKACT_RESPONSES_API", "true"),
            ("THINKACT_API_BASE", "http://localhost:8080/v1"),
        ]
        .into_iter()
        .collect();

        let config =
            HttpProviderConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_string()))
                .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-fallback"));
        assert!(config.responses_api);
        assert_eq!(config.api_base, "http://localhost:8080/v1");
    }

    #[test]
    fn test_config_never_serializes_key() {
        let config = HttpProviderConfig {
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let encoded = serde_json::to_string(&config).unwrap();
        assert!(!encoded.contains("sk-secret"));

        let decoded: HttpProviderConfig =
            serde_json::from_str(r#"{"responses_api": true}"#).unwrap();
        assert!(decoded.responses_api);
        assert_eq!(decoded.timeout_secs, 120);
    }

    #[test]
    fn test_capabilities_follow_config() {
        let plain = HttpProvider::new(HttpProviderConfig::default()).unwrap();
        assert!(plain.supports(Capability::ToolCalling));
        assert!(!plain.supports(Capability::ResponsesApi));
    }

    #[test]
    fn test_chat_message_shapes() {
        let call = ToolCall::new("call_1", "calculate", r#"{"expression":"1+1"}"#);
        let assistant = chat_message(&Message::assistant_tool_calls("", vec![call]));
        assert!(assistant["content"].is_null());
        assert_eq!(assistant["tool_calls"][0]["function"]["name"], "calculate");

        let tool = chat_message(&Message::tool_result("call_1", "calculate", "2"));
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "call_1");
    }

    #[tokio::test]
    async fn test_prompt_goes_to_chat_completions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"stop": ["\nObservation:"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "model": "gpt-4o-mini",
                "choices": [{
                    "message": {"role": "assistant", "content": "Final Answer: 4"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let options = GenerationOptions {
            stop_sequences: vec!["\nObservation:".into()],
            ..Default::default()
        };
        let completion = provider(&server, false)
            .generate(&ModelRequest::prompt("2+2?", options))
            .await
            .unwrap();

        assert_eq!(completion.content, "Final Answer: 4");
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));
        assert_eq!(completion.usage.unwrap().total_tokens, 15);
        assert!(completion.raw.is_some());
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = provider(&server, false)
            .generate(&ModelRequest::prompt("hi", GenerationOptions::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::RateLimited(body) if body == "slow down"));
        assert!(AgentError::RateLimited(String::new()).is_retryable());

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = provider(&server, false)
            .generate(&ModelRequest::prompt("hi", GenerationOptions::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Auth(_)));
    }

    #[tokio::test]
    async fn test_responses_request_without_capability_is_rejected() {
        let server = MockServer::start().await;
        let request = ModelRequest {
            input: RequestInput::Responses {
                items: Vec::new(),
                previous_response_id: Some("resp_1".into()),
            },
            tools: Vec::new(),
            options: GenerationOptions::default(),
        };

        let err = provider(&server, false).generate(&request).await.unwrap_err();
        assert!(matches!(err, AgentError::MissingCapability(_)));
    }

    #[tokio::test]
    async fn test_native_agent_over_chat_completions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"messages": [{}, {}, {}, {"role": "tool"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "6 * 7 is 42."}, "finish_reason": "stop"}]
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"content": null, "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "calculate", "arguments": "{\"expression\": \"6 * 7\"}"}
                    }]},
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&server)
            .await;

        let agent = AgentBuilder::new()
            .provider(Arc::new(provider(&server, false)))
            .protocol(ProtocolKind::Native)
            .tool(CalculatorTool)
            .return_intermediate_steps(true)
            .build()
            .unwrap();

        let output = agent.run("What is 6 * 7?", &[]).await.unwrap();
        assert_eq!(output.output(), "6 * 7 is 42.");
        let steps = output.steps.unwrap();
        assert_eq!(steps.len(), 1);
        assert!(steps[0].observation.is_ok());
    }

    #[tokio::test]
    async fn test_native_agent_over_responses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(body_partial_json(json!({"previous_response_id": "resp_1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "resp_2",
                "output": [{"type": "message", "role": "assistant",
                            "content": [{"type": "output_text", "text": "It is 42."}]}],
                "usage": {"input_tokens": 30, "output_tokens": 4, "total_tokens": 34}
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "resp_1",
                "output": [
                    {"type": "function_call", "id": "fc_1", "call_id": "call_1",
                     "name": "calculate", "arguments": "{\"expression\":\"6*7\"}"},
                    {"type": "message", "role": "assistant",
                     "content": [{"type": "output_text", "text": "Let me compute."}]}
                ]
            })))
            .mount(&server)
            .await;

        let agent = AgentBuilder::new()
            .provider(Arc::new(provider(&server, true)))
            .protocol(ProtocolKind::Native)
            .tool(CalculatorTool)
            .build()
            .unwrap();

        let output = agent.run("What is 6 * 7?", &[]).await.unwrap();
        assert_eq!(output.output(), "It is 42.");
        assert_eq!(output.iterations, 1);
    }
}
