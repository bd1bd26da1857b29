//! Multi-tool orchestrator.
//!
//! An [`Agent`] whose tool set is pinned to a declared list of allowed tool
//! names. The check runs at construction, so a mismatch fails before any
//! model call.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::observability::Tracker;
use crate::parser::Protocol;
use crate::provider::LlmProvider;
use crate::reasoning::Agent;
use crate::run::RunOutput;
use crate::tool::{Tool, ToolRegistry};

/// Agent façade with a fixed, declared tool set
#[derive(Debug)]
pub struct MultiToolOrchestrator {
    allowed: BTreeSet<String>,
    agent: Agent,
}

impl MultiToolOrchestrator {
    /// Build an orchestrator. The names of `tools` must equal `allowed` as a set.
    pub fn new<I, S>(
        allowed: I,
        provider: Arc<dyn LlmProvider>,
        tools: Vec<Arc<dyn Tool>>,
        protocol: Protocol,
        config: AgentConfig,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: BTreeSet<String> = allowed.into_iter().map(Into::into).collect();
        let registry = ToolRegistry::from_tools(tools)?;

        let actual: BTreeSet<String> = registry.names().into_iter().map(String::from).collect();
        if actual != allowed {
            return Err(AgentError::ToolSetMismatch {
                expected: join(&allowed),
                actual: join(&actual),
            });
        }

        let agent = Agent::new(provider, Arc::new(registry), protocol, config)?;
        info!(tools = %join(&allowed), "orchestrator ready");

        Ok(Self { allowed, agent })
    }

    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<dyn Tracker>) -> Self {
        self.agent = self.agent.with_tracker(tracker);
        self
    }

    pub async fn run(&self, goal: &str, history: &[Message]) -> Result<RunOutput> {
        self.agent.run(goal, history).await
    }

    pub fn allowed_tools(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    pub const fn agent(&self) -> &Agent {
        &self.agent
    }
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
