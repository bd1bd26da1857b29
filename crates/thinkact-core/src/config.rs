//! Agent Configuration

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::prompt::DEFAULT_SYSTEM_PROMPT;
use crate::provider::GenerationOptions;

/// Default iteration budget
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// What to do when the iteration budget runs out
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarlyStopping {
    /// Return a fixed "stopped" answer
    #[default]
    Force,
    /// Ask the model once more to conclude from the steps so far
    Generate,
}

impl FromStr for EarlyStopping {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "force" => Ok(Self::Force),
            "generate" => Ok(Self::Generate),
            other => Err(AgentError::Config(format!(
                "unknown early stopping method '{other}' (expected 'force' or 'generate')"
            ))),
        }
    }
}

/// Agent configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// System prompt
    pub system_prompt: String,

    /// Maximum loop iterations; `None` means unbounded
    pub max_iterations: Option<usize>,

    /// Policy applied when the budget is exhausted
    pub early_stopping: EarlyStopping,

    /// Include the step log in run results
    pub return_intermediate_steps: bool,

    /// Generation options
    pub generation: GenerationOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: Some(DEFAULT_MAX_ITERATIONS),
            early_stopping: EarlyStopping::default(),
            return_intermediate_steps: false,
            generation: GenerationOptions::default(),
        }
    }
}

impl AgentConfig {
    /// Read overrides from `THINKACT_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, starting from defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup("THINKACT_MAX_ITERATIONS") {
            config.max_iterations = parse_budget(&raw)?;
        }
        if let Some(raw) = lookup("THINKACT_EARLY_STOPPING") {
            config.early_stopping = raw.parse()?;
        }
        if let Some(model) = lookup("THINKACT_MODEL") {
            config.generation.model = model;
        }
        if let Some(raw) = lookup("THINKACT_TEMPERATURE") {
            config.generation.temperature = raw.trim().parse().map_err(|_| {
                AgentError::Config(format!("THINKACT_TEMPERATURE is not a number: '{raw}'"))
            })?;
        }
        if let Some(prompt) = lookup("THINKACT_SYSTEM_PROMPT") {
            config.system_prompt = prompt;
        }

        Ok(config)
    }
}

/// `none`, `unlimited` and `0` disable the budget.
fn parse_budget(raw: &str) -> Result<Option<usize>> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "none" | "unlimited" | "0" => Ok(None),
        n => n.parse().map(Some).map_err(|_| {
            AgentError::Config(format!("THINKACT_MAX_ITERATIONS is not a number: '{raw}'"))
        }),
    }
}
