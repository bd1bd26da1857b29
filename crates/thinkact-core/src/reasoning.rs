//! Reasoning Loop
//!
//! Drives the think → act → observe cycle. Each iteration makes one model
//! call, hands the response to the agent's protocol, and executes the
//! resulting tool calls in order. A run ends when the model finishes, a
//! `returns_directly` tool succeeds, or the iteration budget runs out.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::config::{AgentConfig, EarlyStopping};
use crate::error::{AgentError, Result};
use crate::message::{Message, Role};
use crate::observability::{self, NoopTracker, Tracker};
use crate::parser::{OutputParser, Protocol, ResponseShape, StructuredCallExtractor};
use crate::prompt::PromptContext;
use crate::provider::{Capability, GenerationOptions, LlmProvider, ModelRequest, RequestInput, ResponseItem};
use crate::run::{RunContext, RunOutput};
use crate::step::{Action, Decision, Finish, Observation};
use crate::tool::{Tool, ToolRegistry};

/// Answer returned when the budget runs out under [`EarlyStopping::Force`].
pub const STOPPED_ANSWER: &str = "Agent stopped due to iteration limit or time limit.";

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    protocol: Protocol,
    config: AgentConfig,
    tracker: Arc<dyn Tracker>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("provider", &self.provider.name())
            .field("tools", &self.tools.names())
            .field("protocol", &self.protocol.kind())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Create a new agent.
    ///
    /// Fails when the protocol needs a capability the provider does not advertise.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        protocol: Protocol,
        config: AgentConfig,
    ) -> Result<Self> {
        if let Some(capability) = protocol.required_capability() {
            if !provider.supports(capability) {
                return Err(AgentError::MissingCapability(capability.to_string()));
            }
        }

        Ok(Self {
            provider,
            tools,
            protocol,
            config,
            tracker: Arc::new(NoopTracker),
        })
    }

    /// Replace the event tracker
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<dyn Tracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Run the agent on a goal, continuing from prior history
    pub async fn run(&self, goal: &str, history: &[Message]) -> Result<RunOutput> {
        let mut ctx = RunContext::new(goal);

        info!(
            run_id = %ctx.id,
            protocol = ?self.protocol.kind(),
            tools = self.tools.len(),
            max_iterations = ?self.config.max_iterations,
            "run started"
        );
        observability::emit(
            self.tracker.as_ref(),
            observability::RUN_STARTED,
            &json!({
                "run_id": ctx.id.as_str(),
                "protocol": self.protocol.kind(),
                "tools": self.tools.names(),
            }),
        );

        let result = match &self.protocol {
            Protocol::FreeText(parser) => self.run_text(&mut ctx, parser, history).await,
            Protocol::TaggedMarkup(parser) => self.run_text(&mut ctx, parser, history).await,
            Protocol::NativeToolCalling(extractor) => {
                self.run_native(&mut ctx, extractor, history).await
            }
        };

        let (finish, stopped) = match result {
            Ok(done) => done,
            Err(e) => {
                error!(
                    run_id = %ctx.id,
                    iteration = ctx.iterations(),
                    elapsed_ms = ctx.elapsed_ms(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "run aborted"
                );
                return Err(e);
            }
        };

        let elapsed_ms = ctx.elapsed_ms();
        info!(
            run_id = %ctx.id,
            iterations = ctx.iterations(),
            steps = ctx.steps().len(),
            stopped,
            elapsed_ms,
            "run finished"
        );
        observability::emit(
            self.tracker.as_ref(),
            observability::RUN_FINISHED,
            &json!({
                "run_id": ctx.id.as_str(),
                "iterations": ctx.iterations(),
                "stopped": stopped,
                "elapsed_ms": elapsed_ms,
            }),
        );

        Ok(ctx.finish(finish, stopped, self.config.return_intermediate_steps))
    }

    /// Run with a simple question and no history
    pub async fn ask(&self, question: &str) -> Result<String> {
        self.run(question, &[]).await.map(|output| output.output())
    }

    fn should_continue(&self, iterations: usize) -> bool {
        self.config
            .max_iterations
            .is_none_or(|max| iterations < max)
    }

    async fn run_text<P: OutputParser>(
        &self,
        ctx: &mut RunContext,
        parser: &P,
        history: &[Message],
    ) -> Result<(Finish, bool)> {
        let options = self.text_options(parser);

        while self.should_continue(ctx.iterations()) {
            let prompt = self.render(parser, ctx, history);
            debug!(run_id = %ctx.id, iteration = ctx.iterations(), chars = prompt.len(), "calling model");

            let completion = self
                .provider
                .generate(&ModelRequest::prompt(prompt, options.clone()))
                .await?;

            match parser.parse(&completion.content) {
                Ok(Decision::Finish(finish)) => return Ok((finish, false)),
                Ok(Decision::Act(actions)) => {
                    for action in actions {
                        if let (_, Some(finish)) = self.act(ctx, action).await? {
                            return Ok((finish, false));
                        }
                    }
                }
                Err(format_error) => {
                    warn!(
                        run_id = %ctx.id,
                        iteration = ctx.iterations(),
                        error = %format_error,
                        "model output did not follow the protocol"
                    );
                    let observation = Observation::err(format_error.to_string());
                    ctx.record(Action::exception(&format_error, completion.content), observation);
                }
            }

            ctx.advance();
        }

        self.stop_text(ctx, parser, history, &options).await
    }

    async fn stop_text<P: OutputParser>(
        &self,
        ctx: &RunContext,
        parser: &P,
        history: &[Message],
        options: &GenerationOptions,
    ) -> Result<(Finish, bool)> {
        info!(
            run_id = %ctx.id,
            iterations = ctx.iterations(),
            policy = ?self.config.early_stopping,
            "iteration budget exhausted"
        );

        match self.config.early_stopping {
            EarlyStopping::Force => Ok((forced_stop(), true)),
            EarlyStopping::Generate => {
                let mut prompt = self.render(parser, ctx, history);
                prompt.push_str(parser.conclude_instruction());

                // One attempt, no retry: a provider error here ends the run.
                let completion = self
                    .provider
                    .generate(&ModelRequest::prompt(prompt, options.clone()))
                    .await?;

                let finish = match parser.parse(&completion.content) {
                    Ok(Decision::Finish(finish)) => finish,
                    _ => Finish::new(completion.content.trim(), completion.content.clone()),
                };
                Ok((finish, true))
            }
        }
    }

    async fn run_native(
        &self,
        ctx: &mut RunContext,
        extractor: &StructuredCallExtractor,
        history: &[Message],
    ) -> Result<(Finish, bool)> {
        ctx.transcript.push(Message::system(self.config.system_prompt.clone()));
        ctx.transcript
            .extend(history.iter().filter(|m| m.role != Role::System).cloned());
        ctx.transcript.push(Message::user(ctx.goal.clone()));

        let specs = self.tools.specs();

        while self.should_continue(ctx.iterations()) {
            let request = ModelRequest {
                input: self.native_input(ctx),
                tools: specs.clone(),
                options: self.config.generation.clone(),
            };
            debug!(
                run_id = %ctx.id,
                iteration = ctx.iterations(),
                tokens = ctx.transcript.estimate_tokens(),
                continuation = ctx.state.previous_response_id().is_some(),
                "calling model"
            );

            let completion = self.provider.generate(&request).await?;
            let raw = completion.raw.ok_or_else(|| {
                AgentError::MalformedResponse(
                    "native tool-calling needs the raw provider payload".into(),
                )
            })?;
            let turn = extractor.extract(&raw)?;

            if !turn.has_tool_calls() {
                let answer = turn.final_answer();
                ctx.transcript.push(Message::assistant(answer.clone()));
                return Ok((Finish::new(answer, turn.text), false));
            }

            ctx.transcript.push(Message::assistant_tool_calls(
                turn.text.clone(),
                turn.tool_calls.clone(),
            ));
            let stateful = turn.shape == ResponseShape::Stateful;

            for call in &turn.tool_calls {
                let input = match self.tools.get(&call.name) {
                    Some(tool) => extractor.resolve_arguments(call, tool.schema())?,
                    None => lenient_arguments(&call.arguments),
                };
                let mut action = Action::new(call.name.clone(), input).with_call_id(call.output_id());
                if !turn.text.is_empty() {
                    action = action.with_rationale(turn.text.clone());
                }

                let (observation, finish) = self.act(ctx, action).await?;
                let output = observation.to_json().to_string();
                ctx.transcript.push(Message::tool_result(
                    call.output_id(),
                    call.name.clone(),
                    output.clone(),
                ));
                if stateful {
                    ctx.state
                        .queue_output(ResponseItem::function_call_output(call.output_id(), output));
                }

                if let Some(finish) = finish {
                    if let (true, Some(id)) = (stateful, &turn.response_id) {
                        ctx.state.record_response(id.clone());
                    }
                    return Ok((finish, false));
                }
            }

            if let (true, Some(id)) = (stateful, &turn.response_id) {
                ctx.state.record_response(id.clone());
            }
            ctx.advance();
        }

        // There is no "conclude" prompt for native calling; generate degrades to force.
        info!(
            run_id = %ctx.id,
            iterations = ctx.iterations(),
            "iteration budget exhausted"
        );
        Ok((forced_stop(), true))
    }

    /// Next request body for native tool-calling.
    fn native_input(&self, ctx: &mut RunContext) -> RequestInput {
        if let Some(previous) = ctx.state.previous_response_id().map(String::from) {
            return RequestInput::Responses {
                items: ctx.state.take_pending(),
                previous_response_id: Some(previous),
            };
        }

        if self.provider.supports(Capability::ResponsesApi) {
            // Any queued outputs are already part of the transcript.
            ctx.state.take_pending();
            return RequestInput::Responses {
                items: ResponseItem::from_messages(ctx.transcript.messages()),
                previous_response_id: None,
            };
        }

        RequestInput::Messages(ctx.transcript.messages().to_vec())
    }

    /// Execute one action and record the step.
    ///
    /// Returns the observation and, for a successful `returns_directly`
    /// tool, the finish that ends the run.
    async fn act(
        &self,
        ctx: &mut RunContext,
        action: Action,
    ) -> Result<(Observation, Option<Finish>)> {
        let (observation, direct) = self.dispatch(&action).await?;

        info!(
            run_id = %ctx.id,
            iteration = ctx.iterations(),
            tool = %action.tool,
            status = ?observation.status,
            observation = %preview(&observation.to_text()),
            "step"
        );
        observability::emit(
            self.tracker.as_ref(),
            observability::TOOL_INVOKED,
            &json!({
                "run_id": ctx.id.as_str(),
                "iteration": ctx.iterations(),
                "tool": action.tool,
                "status": observation.status,
            }),
        );

        let finish = direct.then(|| {
            Finish::new(
                observation.payload.clone(),
                action.rationale.clone().unwrap_or_default(),
            )
        });
        ctx.record(action, observation.clone());
        Ok((observation, finish))
    }

    /// Resolve and invoke a tool. Only fatal tool errors escape.
    async fn dispatch(&self, action: &Action) -> Result<(Observation, bool)> {
        let Some(tool) = self.tools.get(&action.tool) else {
            return Ok((
                Observation::err(format!("{} is not a valid tool, try another one.", action.tool)),
                false,
            ));
        };

        match tool.invoke(action.input.clone()).await {
            Ok(payload) => Ok((Observation::ok(payload), tool.returns_directly())),
            Err(e) if e.is_fatal() => {
                error!(tool = %action.tool, error = %e, "tool raised a fatal error");
                Err(e.into())
            }
            Err(e) => Ok((
                Observation::err(format!("Error - {e}, correct and try again.")),
                false,
            )),
        }
    }

    fn render<P: OutputParser>(&self, parser: &P, ctx: &RunContext, history: &[Message]) -> String {
        parser.render(&PromptContext {
            system_prompt: &self.config.system_prompt,
            tools: &self.tools,
            history,
            goal: &ctx.goal,
            steps: ctx.steps(),
        })
    }

    fn text_options<P: OutputParser>(&self, parser: &P) -> GenerationOptions {
        let mut options = self.config.generation.clone();
        for stop in parser.stop_sequences() {
            if !options.stop_sequences.contains(&stop) {
                options.stop_sequences.push(stop);
            }
        }
        options
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get the protocol
    pub const fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }
}

fn forced_stop() -> Finish {
    Finish::new(STOPPED_ANSWER, "")
}

/// Arguments of a call to an unknown tool, kept only for the step log.
fn lenient_arguments(arguments: &str) -> Value {
    serde_json::from_str(arguments).unwrap_or_else(|_| Value::String(arguments.to_string()))
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(LIMIT).collect();
        format!("{cut}…")
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: Vec<Arc<dyn Tool>>,
    protocol: Protocol,
    config: AgentConfig,
    tracker: Option<Arc<dyn Tracker>>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: Vec::new(),
            protocol: Protocol::default(),
            config: AgentConfig::default(),
            tracker: None,
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    #[must_use]
    pub fn tool_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<Protocol>) -> Self {
        self.protocol = protocol.into();
        self
    }

    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    #[must_use]
    pub const fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    #[must_use]
    pub const fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = Some(max);
        self
    }

    /// Remove the iteration budget
    #[must_use]
    pub const fn unbounded(mut self) -> Self {
        self.config.max_iterations = None;
        self
    }

    #[must_use]
    pub const fn early_stopping(mut self, policy: EarlyStopping) -> Self {
        self.config.early_stopping = policy;
        self
    }

    #[must_use]
    pub const fn return_intermediate_steps(mut self, enabled: bool) -> Self {
        self.config.return_intermediate_steps = enabled;
        self
    }

    #[must_use]
    pub fn tracker(mut self, tracker: Arc<dyn Tracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;
        let tools = ToolRegistry::from_tools(self.tools)?;

        let agent = Agent::new(provider, Arc::new(tools), self.protocol, self.config)?;
        Ok(match self.tracker {
            Some(tracker) => agent.with_tracker(tracker),
            None => agent,
        })
    }
}
