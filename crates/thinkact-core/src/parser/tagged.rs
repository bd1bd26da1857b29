//! Tagged-markup protocol.
//!
//! ```text
//! <thought>I should look this up</thought>
//! <action>search</action>
//! <action_input>weather in Lisbon</action_input>
//! ```
//!
//! Models frequently stop before closing their last element (the stop
//! sequence cuts at `</action_input>`), so elements still open at the end of
//! the response are closed before the structure is read.

use quick_xml::Reader;
use quick_xml::events::Event;

use super::OutputParser;
use crate::error::FormatError;
use crate::prompt::{PromptContext, escape_markup};
use crate::step::{Action, Decision, Finish, ParseResult};

/// Parser for `<thought>`, `<action>`, `<action_input>` and `<final_answer>` elements.
#[derive(Clone, Copy, Debug, Default)]
pub struct TaggedMarkupParser;

impl OutputParser for TaggedMarkupParser {
    fn parse(&self, text: &str) -> ParseResult {
        let doc = match Markup::parse(text) {
            Ok(doc) => doc,
            Err(reason) => {
                tracing::debug!(%reason, "markup parse failed");
                return Err(FormatError::Malformed(reason));
            }
        };

        if let Some(answer) = doc.text_of("final_answer").filter(|a| !a.is_empty()) {
            return Ok(Decision::Finish(Finish::new(answer.clone(), answer)));
        }

        let tool = doc.text_of("action").filter(|t| !t.is_empty());
        let input = doc.text_of("action_input").filter(|i| !i.is_empty());
        match (tool, input) {
            (Some(tool), Some(input)) => {
                let rationale = doc
                    .text_of("thought")
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| text.trim().to_string());
                Ok(Decision::Act(vec![
                    Action::new(tool, input).with_rationale(rationale),
                ]))
            }
            _ => Err(FormatError::MissingTags),
        }
    }

    fn render(&self, ctx: &PromptContext<'_>) -> String {
        let mut prompt = format!(
            "{system}\n\nYou have access to the following tools:\n\n{tools}\n\
Respond with exactly one of the following.\n\n\
To use a tool:\n\
<thought>your reasoning</thought>\n\
<action>the tool to use, one of [{names}]</action>\n\
<action_input>the input to the tool</action_input>\n\n\
When you know the answer:\n\
<thought>your reasoning</thought>\n\
<final_answer>the final answer to the question</final_answer>\n\n\
Each tool result will be given to you in an <observation> element.\n\n\
{history}Question: {goal}\n",
            system = ctx.system_prompt,
            tools = ctx.tools.describe(),
            names = ctx.tool_names(),
            history = ctx.history_text(),
            goal = ctx.goal,
        );

        for step in ctx.steps {
            let action = &step.action;
            if action.is_exception() {
                prompt.push_str(&format!(
                    "{}\n",
                    action.rationale.as_deref().unwrap_or_default()
                ));
            } else {
                prompt.push_str(&format!(
                    "<thought>{}</thought>\n<action>{}</action>\n<action_input>{}</action_input>\n",
                    escape_markup(action.rationale.as_deref().unwrap_or_default()),
                    escape_markup(&action.tool),
                    escape_markup(&action.input_text()),
                ));
            }
            prompt.push_str(&format!(
                "<observation>{}</observation>\n",
                escape_markup(&step.observation.to_text())
            ));
        }
        prompt
    }

    fn stop_sequences(&self) -> Vec<String> {
        vec!["</action_input>".into()]
    }

    fn conclude_instruction(&self) -> &'static str {
        "\nYou have no tool calls left. Using only the observations above, respond now with \
<thought>...</thought> and <final_answer>...</final_answer>.\n"
    }
}

/// Elements of a parsed response, in document order.
#[derive(Debug, Default)]
struct Markup {
    elements: Vec<Element>,
}

#[derive(Debug)]
struct Element {
    name: String,
    order: usize,
    text: String,
}

impl Markup {
    fn parse(text: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().check_end_names = false;

        let mut open: Vec<Element> = Vec::new();
        let mut elements = Vec::new();
        let mut order = 0;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    open.push(Element {
                        name: tag_name(e.name().as_ref()),
                        order,
                        text: String::new(),
                    });
                    order += 1;
                }
                Ok(Event::Empty(ref e)) => {
                    elements.push(Element {
                        name: tag_name(e.name().as_ref()),
                        order,
                        text: String::new(),
                    });
                    order += 1;
                }
                Ok(Event::End(ref e)) => {
                    let name = tag_name(e.name().as_ref());
                    match open.pop() {
                        Some(element) if element.name == name => {
                            let content = element.text.clone();
                            elements.push(element);
                            if let Some(parent) = open.last_mut() {
                                parent.text.push_str(&content);
                            }
                        }
                        Some(element) => {
                            return Err(format!("expected </{}>, found </{name}>", element.name));
                        }
                        None => return Err(format!("unexpected </{name}>")),
                    }
                }
                Ok(Event::Text(ref e)) => {
                    // Bare `&` or unknown entities keep the raw text.
                    let content = e.unescape().map_or_else(
                        |_| String::from_utf8_lossy(e).into_owned(),
                        std::borrow::Cow::into_owned,
                    );
                    if let Some(current) = open.last_mut() {
                        current.text.push_str(&content);
                    }
                }
                Ok(Event::CData(ref e)) => {
                    if let Some(current) = open.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(e));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(format!("markup error at {}: {e}", reader.buffer_position())),
                Ok(_) => {}
            }
        }

        // Close whatever is still open, innermost first.
        while let Some(element) = open.pop() {
            if let Some(parent) = open.last_mut() {
                parent.text.push_str(&element.text);
            }
            elements.push(element);
        }

        elements.sort_by_key(|e| e.order);
        Ok(Self { elements })
    }

    /// Trimmed text of the first element with this name
    fn text_of(&self, name: &str) -> Option<String> {
        self.elements
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.text.trim().to_string())
    }
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}
