//! Output Parsers
//!
//! One protocol is chosen per agent at construction time:
//!
//! - [`FreeTextParser`]: ReAct-style `Action:` / `Action Input:` / `Final Answer:` text
//! - [`TaggedMarkupParser`]: the same loop expressed in `<action>`-style tags
//! - [`StructuredCallExtractor`]: native tool calls in either response shape

pub mod free_text;
pub mod structured;
pub mod tagged;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::prompt::PromptContext;
use crate::provider::Capability;
use crate::step::ParseResult;

pub use free_text::FreeTextParser;
pub use structured::{AssistantTurn, ResponseShape, StructuredCallExtractor};
pub use tagged::TaggedMarkupParser;

/// A text protocol: how prompts are rendered and responses parsed.
pub trait OutputParser: Send + Sync {
    /// Turn model text into a decision or a recoverable format error
    fn parse(&self, text: &str) -> ParseResult;

    /// Render the full prompt for the next model call
    fn render(&self, ctx: &PromptContext<'_>) -> String;

    /// Sequences that end a model turn before it invents an observation
    fn stop_sequences(&self) -> Vec<String>;

    /// Appended to the prompt for the one extra call made when the budget runs out
    fn conclude_instruction(&self) -> &'static str;
}

/// Protocol selector used by configuration and the CLI
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    #[default]
    FreeText,
    Tagged,
    Native,
}

impl FromStr for ProtocolKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "free_text" | "react" | "text" => Ok(Self::FreeText),
            "tagged" | "xml" | "markup" => Ok(Self::Tagged),
            "native" | "tool_calling" => Ok(Self::Native),
            other => Err(AgentError::Config(format!("unknown protocol '{other}'"))),
        }
    }
}

/// The interaction protocol of an agent.
#[derive(Clone, Debug)]
pub enum Protocol {
    FreeText(FreeTextParser),
    TaggedMarkup(TaggedMarkupParser),
    NativeToolCalling(StructuredCallExtractor),
}

impl Protocol {
    pub const fn kind(&self) -> ProtocolKind {
        match self {
            Self::FreeText(_) => ProtocolKind::FreeText,
            Self::TaggedMarkup(_) => ProtocolKind::Tagged,
            Self::NativeToolCalling(_) => ProtocolKind::Native,
        }
    }

    /// Capability the model client must advertise for this protocol
    pub const fn required_capability(&self) -> Option<Capability> {
        match self {
            Self::NativeToolCalling(_) => Some(Capability::ToolCalling),
            Self::FreeText(_) | Self::TaggedMarkup(_) => None,
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::FreeText(FreeTextParser)
    }
}

impl From<ProtocolKind> for Protocol {
    fn from(kind: ProtocolKind) -> Self {
        match kind {
            ProtocolKind::FreeText => Self::FreeText(FreeTextParser),
            ProtocolKind::Tagged => Self::TaggedMarkup(TaggedMarkupParser),
            ProtocolKind::Native => Self::NativeToolCalling(StructuredCallExtractor),
        }
    }
}
