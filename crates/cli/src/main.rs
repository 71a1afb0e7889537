mod canvas;
mod cli;
mod config;
mod terminal;

use anyhow::{Context, Result};
use clap::Parser;
use doodle_agent::DrawAgent;
use doodle_core::{config::load_dotenv, Config};
use doodle_tool_runtime::{AgentError, TokenCallback};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::canvas::TerminalCanvas;
use crate::cli::CliArgs;
use crate::config::CliConfig;
use crate::terminal::Terminal;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    // Priority: flags > environment > config file > defaults
    let file_config = CliConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    let mut config = match &args.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    file_config.apply(&mut config, &|key| std::env::var(key).ok());
    args.apply(&mut config);
    config.log_summary();

    DrawAgent::check_model_config(&config.llm).context("invalid model configuration")?;
    let model = doodle_llm::create_model(&config.llm).context("failed to create LLM model")?;
    let terminal = Arc::new(Terminal::new(!args.quiet));
    let canvas = Arc::new(TerminalCanvas::new(terminal.clone()));

    let mut agent = DrawAgent::new(Arc::new(model), canvas.clone(), &config.agent)
        .context("failed to build draw agent")?;
    if config.llm.streaming {
        let callback: TokenCallback = Arc::new(crate::terminal::print_token);
        agent = agent.with_streaming(callback);
    }

    if let Some(prompt) = args.prompt.as_deref() {
        return run_request(&agent, &terminal, prompt).await;
    }

    terminal.print_banner(&config.llm.provider, config.llm.model())?;

    // REPL loop. Ctrl+C at the prompt exits; during a run it cancels the run.
    let mut lines = crate::terminal::spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    loop {
        terminal.print_prompt()?;
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => None,
            line = lines.recv() => line.transpose().context("failed to read input")?,
        };
        let Some(input) = line.as_deref().and_then(crate::terminal::parse_input) else {
            terminal.print_info("Goodbye.")?;
            break;
        };

        if input.is_empty() {
            continue;
        }

        if let Err(e) = run_request(&agent, &terminal, &input).await {
            error!(error = %e, "Request failed");
            terminal.print_error(&format!("{:#}", e))?;
        }
        info!(shapes = canvas.shape_count(), "Canvas state");
    }

    Ok(())
}

/// Run one drawing request. Ctrl+C cancels it and leaves the REPL running.
async fn run_request(agent: &DrawAgent, terminal: &Terminal, input: &str) -> Result<()> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = agent.run(input, &cancel).await;
    watcher.abort();

    match result {
        Ok(run) => terminal.display_run(&run),
        Err(AgentError::Cancelled) => terminal.print_info("[cancelled]"),
        Err(e) => Err(anyhow::Error::new(e).context("agent run failed")),
    }
}
