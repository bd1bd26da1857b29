//! # thinkact-runtime
//!
//! Providers, built-in tools and logging for thinkact agents.
//!
//! ## Providers
//!
//! - **HTTP** (default): OpenAI-compatible `/chat/completions` and `/responses`
//! - **Ollama** (`ollama` feature): local inference, text protocols only
//!
//! ## Usage
//!
//! ```rust,ignore
//! use thinkact_runtime::{HttpProvider, builtins::CalculatorTool};
//!
//! let agent = AgentBuilder::new()
//!     .provider(Arc::new(HttpProvider::from_env()?))
//!     .protocol(ProtocolKind::Native)
//!     .tool(CalculatorTool)
//!     .build()?;
//! let answer = agent.ask("What is 6 * 7?").await?;
//! ```

pub mod builtins;
pub mod http;
pub mod telemetry;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use http::{HttpProvider, HttpProviderConfig};
#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;

// Re-export core types for convenience
pub use thinkact_core::{
    Agent, AgentBuilder, AgentConfig, AgentError, EarlyStopping, LlmProvider, Message,
    MultiToolOrchestrator, ProtocolKind, Result, RunOutput, Tool, ToolRegistry,
};
