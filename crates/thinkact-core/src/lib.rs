//! # thinkact-core
//!
//! Provider-agnostic think → act → observe runtime with pluggable output protocols.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             Agent                                │
//! │  ┌─────────────┐  ┌──────────────────┐  ┌─────────────────────┐  │
//! │  │  Reasoning  │──│     Protocol     │  │    LlmProvider      │  │
//! │  │    Loop     │  │ free text/tagged │──│  (capabilities)     │  │
//! │  └─────────────┘  │ native calls     │  └─────────────────────┘  │
//! │         │         └──────────────────┘                           │
//! │  ┌─────────────┐  ┌──────────────────┐                           │
//! │  │    Tools    │  │   RunContext     │   one per run            │
//! │  │   Registry  │  │ steps, transcript│                           │
//! │  └─────────────┘  └──────────────────┘                           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The protocol is fixed when the agent is built. Native tool-calling is only
//! accepted when the provider advertises [`Capability::ToolCalling`].

pub mod config;
pub mod error;
pub mod message;
pub mod observability;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod provider;
pub mod reasoning;
pub mod run;
pub mod step;
pub mod tool;

pub use config::{AgentConfig, EarlyStopping};
pub use error::{AgentError, FormatError, Result, ToolError};
pub use message::{Conversation, Message, Role, ToolCall};
pub use observability::{NoopTracker, Tracker};
pub use orchestrator::MultiToolOrchestrator;
pub use parser::{
    FreeTextParser, OutputParser, Protocol, ProtocolKind, StructuredCallExtractor,
    TaggedMarkupParser,
};
pub use provider::{
    Capabilities, Capability, Completion, GenerationOptions, LlmProvider, ModelRequest,
    RequestInput, ResponseItem,
};
pub use reasoning::{Agent, AgentBuilder, STOPPED_ANSWER};
pub use run::{RunId, RunOutput};
pub use step::{Action, AgentStep, Decision, Finish, Observation, ObservationStatus};
pub use tool::{ParameterSchema, Tool, ToolRegistry, ToolSchema, ToolSpec};
