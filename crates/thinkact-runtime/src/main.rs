//! thinkact CLI
//!
//! Runs one goal through an agent and prints the answer.
//!
//! ```text
//! thinkact "What is 6 * 7?" --protocol native --max-iterations 5 --steps
//! ```

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info};

use thinkact_core::{AgentBuilder, AgentConfig, EarlyStopping, LlmProvider, ProtocolKind};
use thinkact_runtime::{
    HttpProvider,
    builtins::{CalculatorTool, DateTimeTool},
    telemetry::{self, LogTracker},
};

/// Run a goal through a think/act/observe agent
#[derive(Parser, Debug)]
#[command(name = "thinkact", version, about, long_about = None)]
struct Cli {
    /// The goal or question for the agent
    goal: String,

    /// Output protocol: free-text, tagged or native
    #[arg(short, long, default_value = "free-text")]
    protocol: ProtocolKind,

    /// Model backend: http or ollama
    #[arg(long, default_value = "http")]
    provider: String,

    /// Model name (overrides THINKACT_MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Iteration budget (overrides THINKACT_MAX_ITERATIONS)
    #[arg(long, conflicts_with = "unbounded")]
    max_iterations: Option<usize>,

    /// Run without an iteration budget
    #[arg(long, default_value_t = false)]
    unbounded: bool,

    /// Policy when the budget runs out: force or generate
    #[arg(long)]
    early_stopping: Option<EarlyStopping>,

    /// Print the step log after the answer
    #[arg(long, default_value_t = false)]
    steps: bool,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

fn provider(name: &str) -> Result<Arc<dyn LlmProvider>> {
    match name {
        "http" => Ok(Arc::new(HttpProvider::from_env()?)),
        #[cfg(feature = "ollama")]
        "ollama" => Ok(Arc::new(thinkact_runtime::OllamaProvider::from_env())),
        other => bail!("unknown provider '{other}'"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    telemetry::init(if cli.verbose { "debug" } else { "info" });

    let mut config = AgentConfig::from_env().context("invalid THINKACT_* configuration")?;
    if let Some(model) = cli.model {
        config.generation.model = model;
    }
    if let Some(max) = cli.max_iterations {
        config.max_iterations = Some(max);
    }
    if cli.unbounded {
        config.max_iterations = None;
    }
    if let Some(policy) = cli.early_stopping {
        config.early_stopping = policy;
    }
    config.return_intermediate_steps = cli.steps;

    let agent = AgentBuilder::new()
        .provider(provider(&cli.provider)?)
        .protocol(cli.protocol)
        .config(config)
        .tool(CalculatorTool)
        .tool(DateTimeTool)
        .tracker(Arc::new(LogTracker))
        .build()
        .context("failed to build agent")?;

    info!(protocol = ?cli.protocol, provider = %cli.provider, "starting");
    let output = match agent.run(&cli.goal, &[]).await {
        Ok(output) => output,
        Err(e) => {
            error!(error = %e, retryable = e.is_retryable(), "agent run failed");
            bail!(e.user_message());
        }
    };

    if let Some(steps) = &output.steps {
        for (i, step) in steps.iter().enumerate() {
            println!(
                "[{}] {}({}) -> {}",
                i + 1,
                step.action.tool,
                step.action.input_text(),
                step.observation.to_text()
            );
        }
        println!();
    }
    println!("{}", output.output());

    if output.stopped {
        eprintln!("(stopped after {} iterations)", output.iterations);
    }
    Ok(())
}
