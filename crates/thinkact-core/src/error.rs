//! Error Types
//!
//! Three classes of failure flow through a run:
//!
//! - [`AgentError`]: fatal, always propagated to the caller.
//! - [`ToolError`]: raised by a tool; fatal only for configuration and security kinds.
//! - [`FormatError`]: a model response that broke the protocol; fed back as an observation.

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The model client lacks a capability the selected protocol needs
    #[error("Model client does not support required capability: {0}")]
    MissingCapability(String),

    /// Tool names handed to an orchestrator differ from its allowed set
    #[error("Tool set mismatch: expected [{expected}], got [{actual}]")]
    ToolSetMismatch { expected: String, actual: String },

    /// Two tools registered under the same name
    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    /// Tool-call arguments could not be decoded or synthesized
    #[error("Invalid arguments for tool '{tool}': {message}")]
    ToolArguments { tool: String, message: String },

    /// Native tool-calling payload did not match either response shape
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A tool reported a security violation
    #[error("Security violation: {0}")]
    Security(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::RateLimited(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::MissingCapability(cap) => {
                format!("The configured model cannot be used here: it does not support {cap}.")
            }
            Self::ToolSetMismatch { .. } | Self::DuplicateTool(_) | Self::Config(_) => {
                format!("The agent is misconfigured: {self}")
            }
            Self::ToolArguments { tool, message } => {
                format!("The model sent unusable arguments to '{tool}': {message}")
            }
            Self::Security(msg) => format!("Request blocked: {msg}"),
            Self::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            Self::Auth(_) => "Authentication failed. Please check your credentials.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Error raised by a tool invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Ordinary failure; reported back to the model.
    #[error("{0}")]
    Execution(String),

    /// Input failed validation; reported back to the model.
    #[error("{0}")]
    InvalidInput(String),

    /// The tool is misconfigured; aborts the run.
    #[error("{0}")]
    Configuration(String),

    /// The call violated a security policy; aborts the run.
    #[error("{0}")]
    Security(String),
}

impl ToolError {
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Security(_))
    }
}

impl From<ToolError> for AgentError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Configuration(msg) => Self::Config(msg),
            ToolError::Security(msg) => Self::Security(msg),
            ToolError::Execution(msg) | ToolError::InvalidInput(msg) => Self::Other(msg),
        }
    }
}

/// A model response that violated the interaction protocol.
///
/// Never aborts a run; the runtime turns it into an error observation so the
/// model can correct itself on the next iteration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Invalid Format: Missing 'Action:' after 'Thought:'")]
    MissingAction,

    #[error("Invalid Format: Missing 'Action Input:' after 'Action:'")]
    MissingActionInput,

    #[error("Invalid Format: expected <final_answer> or both <action> and <action_input>")]
    MissingTags,

    #[error("Invalid Format: could not parse markup ({0})")]
    Malformed(String),
}
