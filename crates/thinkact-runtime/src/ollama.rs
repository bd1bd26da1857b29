//! Ollama LLM Provider
//!
//! Local inference through `ollama-rs`. Only the text protocols are
//! supported: no tool-calling capability is advertised.

use async_trait::async_trait;
use ollama_rs::{
    Ollama,
    generation::{
        chat::{ChatMessage, ChatMessageResponse, MessageRole, request::ChatMessageRequest},
    },
    models::ModelOptions as OllamaOptions,
};
use thinkact_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{
        Capabilities, Capability, Completion, FinishReason, GenerationOptions, LlmProvider,
        ModelRequest, RequestInput, TokenUsage,
    },
};

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("OLLAMA_HOST").unwrap_or(defaults.host),
            port: std::env::var("OLLAMA_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
        }
    }
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: Ollama,
    capabilities: Capabilities,
}

impl OllamaProvider {
    /// Create from configuration
    pub fn from_config(config: &OllamaConfig) -> Self {
        Self {
            client: Ollama::new(config.host.clone(), config.port),
            capabilities: Capabilities::new(),
        }
    }

    /// Create from `OLLAMA_HOST` / `OLLAMA_PORT`
    pub fn from_env() -> Self {
        Self::from_config(&OllamaConfig::from_env())
    }

    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => MessageRole::System,
                    Role::User | Role::Tool => MessageRole::User,
                    Role::Assistant => MessageRole::Assistant,
                };
                ChatMessage::new(role, m.content.clone())
            })
            .collect()
    }

    fn build_options(opts: &GenerationOptions) -> OllamaOptions {
        OllamaOptions::default()
            .temperature(opts.temperature)
            .num_predict(i32::try_from(opts.max_tokens).unwrap_or(i32::MAX))
            .stop(opts.stop_sequences.clone())
    }

    fn convert_completion(response: ChatMessageResponse, model: &str) -> Completion {
        Completion {
            content: response.message.content,
            model: model.to_string(),
            usage: response.final_data.as_ref().map(|d| {
                let prompt_tokens = u32::try_from(d.prompt_eval_count).unwrap_or(u32::MAX);
                let completion_tokens = u32::try_from(d.eval_count).unwrap_or(u32::MAX);
                TokenUsage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens.saturating_add(completion_tokens),
                }
            }),
            finish_reason: Some(FinishReason::Stop),
            raw: None,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn generate(&self, request: &ModelRequest) -> Result<Completion> {
        let messages = match &request.input {
            RequestInput::Prompt(prompt) => vec![ChatMessage::user(prompt.clone())],
            RequestInput::Messages(messages) => Self::convert_messages(messages),
            RequestInput::Responses { .. } => {
                return Err(AgentError::MissingCapability(
                    Capability::ResponsesApi.to_string(),
                ));
            }
        };

        let chat = ChatMessageRequest::new(request.options.model.clone(), messages)
            .options(Self::build_options(&request.options));

        let response = self
            .client
            .send_chat_messages(chat)
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        Ok(Self::convert_completion(response, &request.options.model))
    }
}
