//! ReAct free-text protocol.
//!
//! ```text
//! Thought: I should look this up
//! Action: search
//! Action Input: "weather in Lisbon"
//! ```

use std::sync::LazyLock;

use regex::Regex;

use super::OutputParser;
use crate::error::FormatError;
use crate::prompt::PromptContext;
use crate::step::{Action, Decision, Finish, ParseResult};

pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
        .expect("action pattern is valid")
});

static ACTION_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Action\s*\d*\s*:").expect("action pattern is valid"));

/// Parser for the `Thought / Action / Action Input / Final Answer` format.
#[derive(Clone, Copy, Debug, Default)]
pub struct FreeTextParser;

impl OutputParser for FreeTextParser {
    fn parse(&self, text: &str) -> ParseResult {
        // A final answer wins even when an action is also present.
        if let Some(idx) = text.find(FINAL_ANSWER_MARKER) {
            let answer = text[idx + FINAL_ANSWER_MARKER.len()..].trim();
            return Ok(Decision::Finish(Finish::new(answer, text.trim())));
        }

        let Some(caps) = ACTION_RE.captures(text) else {
            if ACTION_ONLY_RE.is_match(text) {
                return Err(FormatError::MissingActionInput);
            }
            return Err(FormatError::MissingAction);
        };

        let tool = caps.get(1).map_or("", |m| m.as_str()).trim();
        if tool.is_empty() {
            return Err(FormatError::MissingAction);
        }
        let input = clean_input(caps.get(2).map_or("", |m| m.as_str()));

        Ok(Decision::Act(vec![
            Action::new(tool, input).with_rationale(text.trim()),
        ]))
    }

    fn render(&self, ctx: &PromptContext<'_>) -> String {
        let mut prompt = format!(
            "{system}\n\nYou have access to the following tools:\n\n{tools}\n\
Use the following format:\n\n\
Question: the input question you must answer\n\
Thought: you should always think about what to do\n\
Action: the action to take, should be one of [{names}]\n\
Action Input: the input to the action\n\
Observation: the result of the action\n\
... (this Thought/Action/Action Input/Observation can repeat N times)\n\
Thought: I now know the final answer\n\
{FINAL_ANSWER_MARKER} the final answer to the original input question\n\n\
Begin!\n\n{history}Question: {goal}\nThought:",
            system = ctx.system_prompt,
            tools = ctx.tools.describe(),
            names = ctx.tool_names(),
            history = ctx.history_text(),
            goal = ctx.goal,
        );

        for step in ctx.steps {
            let log = step.action.rationale.as_deref().unwrap_or_default();
            prompt.push_str(&format!(
                " {log}\nObservation: {}\nThought:",
                step.observation.to_text()
            ));
        }
        prompt
    }

    fn stop_sequences(&self) -> Vec<String> {
        vec!["\nObservation:".into()]
    }

    fn conclude_instruction(&self) -> &'static str {
        "\n\nI now need to return a final answer based on the previous steps:"
    }
}

/// Trim, cut any hallucinated observation, and strip one layer of matching quotes.
fn clean_input(raw: &str) -> String {
    let raw = raw.split("\nObservation").next().unwrap_or(raw).trim();
    strip_quotes(raw).to_string()
}

fn strip_quotes(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &text[1..text.len() - 1];
        }
    }
    text
}
