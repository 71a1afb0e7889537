use std::sync::Arc;

use doodle_core::{AgentConfig, ConfigError, LlmConfig};
use doodle_tool_runtime::tools::DRAWING_TOOL_NAMES;
use doodle_tool_runtime::{
    drawing_tools, AgentError, AgentOrchestrator, AgentRun, AllowList, Canvas, LanguageModel,
    PromptBuilder, PromptError, RegistryError, TokenCallback, Tool, ToolRegistry, TransportMode,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::prompts::{PREFIX, SUFFIX};

/// A reasoning agent wired to the drawing toolset.
pub struct DrawAgent {
    orchestrator: AgentOrchestrator,
}

impl DrawAgent {
    /// Build the agent over the five drawing tools bound to `canvas`.
    ///
    /// `config.allowed_tools` narrows which of them may be dispatched; all
    /// five stay in the prompt catalog either way.
    pub fn new(
        model: Arc<dyn LanguageModel>,
        canvas: Arc<dyn Canvas>,
        config: &AgentConfig,
    ) -> Result<Self, DrawAgentError> {
        let allowed = match &config.allowed_tools {
            Some(names) => {
                if let Some(unknown) = names.iter().find(|n| !DRAWING_TOOL_NAMES.contains(&n.as_str())) {
                    return Err(DrawAgentError::UnknownAllowedTool(unknown.clone()));
                }
                AllowList::new(names.iter().cloned())
            }
            None => AllowList::new(DRAWING_TOOL_NAMES),
        };
        if allowed.is_empty() {
            warn!("Allow-list is empty; every tool call will be rejected");
        }
        Self::with_tools(model, drawing_tools(canvas), allowed, config.max_iterations)
    }

    /// Reject model settings that would fail every run. The loop always sends
    /// its own `\nObservation:` stop, which clashes with instance-level stop
    /// sequences.
    pub fn check_model_config(llm: &LlmConfig) -> Result<(), DrawAgentError> {
        if llm.stop_sequences.is_some() {
            return Err(ConfigError::Invalid {
                key: "LLM_STOP_SEQUENCES".to_string(),
                message: "the draw agent sets its own stop sequence; unset this option".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Build the agent over an explicit tool list.
    pub fn with_tools(
        model: Arc<dyn LanguageModel>,
        tools: Vec<Arc<dyn Tool>>,
        allowed: AllowList,
        max_iterations: usize,
    ) -> Result<Self, DrawAgentError> {
        let registry = ToolRegistry::with_tools(tools, allowed)?;
        let template = PromptBuilder::new(PREFIX, SUFFIX).build(&registry.list())?;
        info!(
            tools = registry.len(),
            allowed = registry.allow_list().len(),
            max_iterations,
            "Draw agent ready"
        );
        let orchestrator = AgentOrchestrator::new(model, Arc::new(registry), template)
            .with_max_iterations(max_iterations);
        Ok(Self { orchestrator })
    }

    /// Stream generated text to `callback` on every model call.
    pub fn with_streaming(mut self, callback: TokenCallback) -> Self {
        self.orchestrator = self
            .orchestrator
            .with_mode(TransportMode::Streaming)
            .with_token_callback(callback);
        self
    }

    pub fn orchestrator(&self) -> &AgentOrchestrator {
        &self.orchestrator
    }

    pub async fn run(&self, input: &str, cancel: &CancellationToken) -> Result<AgentRun, AgentError> {
        info!(input_len = input.len(), "Running draw agent");
        self.orchestrator.run(input, cancel).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DrawAgentError {
    #[error("allowed tool '{0}' is not a drawing tool")]
    UnknownAllowedTool(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
}
