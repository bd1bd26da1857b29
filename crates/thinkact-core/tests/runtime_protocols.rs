//! End-to-end behaviour of the runtime through the public API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use thinkact_core::{
    Action, AgentBuilder, AgentError, Completion, Decision, FreeTextParser, LlmProvider,
    ModelRequest, MultiToolOrchestrator, OutputParser, ParameterSchema, ProtocolKind,
    RequestInput, TaggedMarkupParser, Tool, ToolError, ToolSchema, Tracker,
    provider::Capabilities,
};

/// Answers by looking at the goal embedded in the prompt, so concurrent runs
/// can share one provider.
struct EchoGoalProvider {
    capabilities: Capabilities,
}

#[async_trait]
impl LlmProvider for EchoGoalProvider {
    fn name(&self) -> &str {
        "echo-goal"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn generate(&self, request: &ModelRequest) -> thinkact_core::Result<Completion> {
        let RequestInput::Prompt(prompt) = &request.input else {
            return Err(AgentError::Provider("expected a prompt".into()));
        };
        let goal = prompt
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix("Question: "))
            .unwrap_or_default();

        if prompt.contains("\nObservation: found") {
            Ok(Completion::text(format!("Final Answer: done with {goal}")))
        } else {
            Ok(Completion::text(format!("Action: lookup\nAction Input: {goal}")))
        }
    }
}

struct LookupTool;

#[async_trait]
impl Tool for LookupTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("lookup", "Look something up")
            .param(ParameterSchema::new("query", "string", "What to look up").required())
    }

    async fn invoke(&self, input: Value) -> Result<Value, ToolError> {
        Ok(json!(format!("found {}", input["query"].as_str().unwrap_or_default())))
    }
}

#[derive(Default)]
struct RecordingTracker {
    events: Mutex<HashMap<String, usize>>,
}

impl Tracker for RecordingTracker {
    fn track(&self, event: &str, _properties: &Value) -> anyhow::Result<()> {
        *self.events.lock().unwrap().entry(event.to_string()).or_default() += 1;
        Ok(())
    }
}

#[test]
fn final_answer_wins_over_action() {
    let decision = FreeTextParser
        .parse("Thought: x\nAction: Foo\nAction Input: y\nFinal Answer: 42")
        .unwrap();
    let Decision::Finish(finish) = decision else {
        panic!("expected a finish");
    };
    assert_eq!(finish.output(), "42");
}

#[test]
fn action_input_quotes_are_stripped() {
    let decision = FreeTextParser
        .parse("Action: Search\nAction Input: \"weather\"")
        .unwrap();
    assert_eq!(
        decision,
        Decision::Act(vec![
            Action::new("Search", "weather")
                .with_rationale("Action: Search\nAction Input: \"weather\"")
        ])
    );
}

#[test]
fn tagged_markup_without_closing_root_parses() {
    let decision = TaggedMarkupParser
        .parse("<response><thought>hm</thought><action>lookup</action><action_input>rust")
        .unwrap();
    let Decision::Act(actions) = decision else {
        panic!("expected an action");
    };
    assert_eq!(actions[0].tool, "lookup");
    assert_eq!(actions[0].input, json!("rust"));
}

#[tokio::test]
async fn concurrent_runs_keep_separate_state() {
    let tracker = Arc::new(RecordingTracker::default());
    let agent = AgentBuilder::new()
        .provider(Arc::new(EchoGoalProvider {
            capabilities: Capabilities::new(),
        }))
        .protocol(ProtocolKind::FreeText)
        .tool(LookupTool)
        .return_intermediate_steps(true)
        .tracker(tracker.clone())
        .build()
        .unwrap();

    let (a, b) = tokio::join!(agent.run("alpha", &[]), agent.run("beta", &[]));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.output(), "done with alpha");
    assert_eq!(b.output(), "done with beta");
    assert_ne!(a.run_id, b.run_id);
    assert_eq!(a.steps.unwrap()[0].observation.to_text(), "found alpha");
    assert_eq!(b.steps.unwrap()[0].observation.to_text(), "found beta");

    let events = tracker.events.lock().unwrap();
    assert_eq!(events.get("agent.run.started"), Some(&2));
    assert_eq!(events.get("agent.tool.invoked"), Some(&2));
    assert_eq!(events.get("agent.run.finished"), Some(&2));
}

#[test]
fn orchestrator_rejects_partial_tool_set() {
    let err = MultiToolOrchestrator::new(
        ["lookup", "calculate"],
        Arc::new(EchoGoalProvider {
            capabilities: Capabilities::new(),
        }),
        vec![Arc::new(LookupTool) as Arc<dyn Tool>],
        ProtocolKind::FreeText.into(),
        thinkact_core::AgentConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, AgentError::ToolSetMismatch { .. }));
}
