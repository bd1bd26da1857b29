//! Run State
//!
//! Everything that changes during one run lives in a [`RunContext`] owned by
//! that run, so an [`Agent`](crate::Agent) can serve concurrent runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Conversation;
use crate::provider::ResponseItem;
use crate::step::{Action, AgentStep, Finish, Observation};

/// Unique run identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cross-turn state of a native tool-calling run.
#[derive(Clone, Debug, Default)]
pub struct ConversationState {
    previous_response_id: Option<String>,
    pending_outputs: Vec<ResponseItem>,
}

impl ConversationState {
    pub fn previous_response_id(&self) -> Option<&str> {
        self.previous_response_id.as_deref()
    }

    pub fn pending_outputs(&self) -> &[ResponseItem] {
        &self.pending_outputs
    }

    /// Queue a tool output for the next stateful request
    pub fn queue_output(&mut self, item: ResponseItem) {
        self.pending_outputs.push(item);
    }

    /// Hand over queued outputs; the queue is empty afterwards
    pub fn take_pending(&mut self) -> Vec<ResponseItem> {
        std::mem::take(&mut self.pending_outputs)
    }

    /// Remember the id of a stateful response for continuation
    pub fn record_response(&mut self, response_id: impl Into<String>) {
        self.previous_response_id = Some(response_id.into());
    }
}

/// Mutable state threaded through one run.
#[derive(Debug)]
pub struct RunContext {
    pub id: RunId,
    pub goal: String,
    iterations: usize,
    steps: Vec<AgentStep>,

    /// Message transcript (native tool-calling)
    pub transcript: Conversation,

    /// Stateful-shape continuation state (native tool-calling)
    pub state: ConversationState,

    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            id: RunId::new(),
            goal: goal.into(),
            iterations: 0,
            steps: Vec::new(),
            transcript: Conversation::new(),
            state: ConversationState::default(),
            started_at: Utc::now(),
        }
    }

    /// Completed iterations
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    /// Wall-clock time since the run started
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }

    pub fn advance(&mut self) {
        self.iterations += 1;
    }

    /// The step log so far
    pub fn steps(&self) -> &[AgentStep] {
        &self.steps
    }

    pub fn record(&mut self, action: Action, observation: Observation) {
        self.steps.push(AgentStep {
            action,
            observation,
        });
    }

    /// Close the run into its output
    pub fn finish(self, finish: Finish, stopped: bool, include_steps: bool) -> RunOutput {
        RunOutput {
            run_id: self.id,
            finish,
            iterations: self.iterations,
            stopped,
            previous_response_id: self.state.previous_response_id,
            steps: include_steps.then_some(self.steps),
        }
    }
}

/// Result of a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunOutput {
    pub run_id: RunId,
    pub finish: Finish,

    /// Iterations completed before the run ended
    pub iterations: usize,

    /// Whether the early-stopping policy produced the result
    pub stopped: bool,

    /// Last stateful response id, for continuing the conversation later
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,

    /// Step log, when intermediate steps were requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<AgentStep>>,
}

impl RunOutput {
    /// The answer as text
    pub fn output(&self) -> String {
        self.finish.output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_outputs_are_consumed_once() {
        let mut state = ConversationState::default();
        assert!(state.previous_response_id().is_none());

        state.queue_output(ResponseItem::function_call_output("call_1", "ok"));
        state.record_response("resp_1");

        assert_eq!(state.take_pending().len(), 1);
        assert!(state.pending_outputs().is_empty());
        assert_eq!(state.previous_response_id(), Some("resp_1"));
    }

    #[test]
    fn test_finish_with_and_without_steps() {
        let mut ctx = RunContext::new("goal");
        ctx.record(Action::new("echo", "hi"), Observation::ok("hi"));
        ctx.advance();
        let output = ctx.finish(Finish::new("hi", ""), false, true);
        assert_eq!(output.iterations, 1);
        assert_eq!(output.steps.map(|s| s.len()), Some(1));

        let mut ctx = RunContext::new("goal");
        ctx.state.record_response("resp_7");
        assert!(ctx.elapsed_ms() >= 0);
        let output = ctx.finish(Finish::new("x", ""), true, false);
        assert!(output.steps.is_none());
        assert_eq!(output.previous_response_id.as_deref(), Some("resp_7"));
    }
}
