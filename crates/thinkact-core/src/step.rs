//! Step Types
//!
//! The values exchanged between parsers and the execution loop: what the
//! model decided ([`Action`] / [`Finish`]) and what came back ([`Observation`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FormatError;

/// Key under which a [`Finish`] stores its answer.
pub const OUTPUT_KEY: &str = "output";

/// Tool name recorded for actions synthesized from a formatting error.
pub const EXCEPTION_TOOL: &str = "_exception";

/// A request to invoke a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Tool to invoke
    pub tool: String,

    /// Tool input (a plain string for text protocols, an object for native calls)
    pub input: Value,

    /// The model text that led to this action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,

    /// Call id assigned by the model (native tool-calling only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl Action {
    pub fn new(tool: impl Into<String>, input: impl Into<Value>) -> Self {
        Self {
            tool: tool.into(),
            input: input.into(),
            rationale: None,
            call_id: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    /// Action standing in for a response that could not be parsed.
    pub fn exception(error: &FormatError, raw: impl Into<String>) -> Self {
        Self::new(EXCEPTION_TOOL, error.to_string()).with_rationale(raw)
    }

    pub fn is_exception(&self) -> bool {
        self.tool == EXCEPTION_TOOL
    }

    /// Input rendered for a prompt line
    pub fn input_text(&self) -> String {
        value_text(&self.input)
    }
}

/// Terminal value of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Finish {
    /// Named return values; the answer lives under [`OUTPUT_KEY`]
    pub returns: BTreeMap<String, Value>,

    /// Explanation (usually the raw model text)
    pub rationale: String,
}

impl Finish {
    pub fn new(output: impl Into<Value>, rationale: impl Into<String>) -> Self {
        let mut returns = BTreeMap::new();
        returns.insert(OUTPUT_KEY.to_string(), output.into());
        Self {
            returns,
            rationale: rationale.into(),
        }
    }

    /// The answer as text.
    pub fn output(&self) -> String {
        self.returns.get(OUTPUT_KEY).map(value_text).unwrap_or_default()
    }
}

/// Outcome of a tool invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationStatus {
    Ok,
    Err,
}

/// What the runtime observed after acting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub status: ObservationStatus,
    pub payload: Value,
}

impl Observation {
    pub fn ok(payload: impl Into<Value>) -> Self {
        Self {
            status: ObservationStatus::Ok,
            payload: payload.into(),
        }
    }

    pub fn err(payload: impl Into<Value>) -> Self {
        Self {
            status: ObservationStatus::Err,
            payload: payload.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ObservationStatus::Ok
    }

    /// Plain-text form, re-inserted into prompts and tool-result messages.
    pub fn to_text(&self) -> String {
        value_text(&self.payload)
    }

    /// Structured form for native tool-calling transcripts.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "status": self.status,
            "payload": self.payload,
        })
    }
}

/// One completed `(Action, Observation)` pair of the step log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    pub action: Action,
    pub observation: Observation,
}

/// What a parser made of a model response.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    /// Invoke these tools, in order
    Act(Vec<Action>),
    /// The model is done
    Finish(Finish),
}

/// Parser output: a decision, or a recoverable protocol violation.
pub type ParseResult = std::result::Result<Decision, FormatError>;

/// Strings render raw, everything else as compact JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
