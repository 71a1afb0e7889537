use crate::output::{parse_output, AgentDecision, INVALID_OUTPUT_ACTION, INVALID_OUTPUT_OBSERVATION};
use crate::prompt::{PromptTemplate, OBSERVATION_MARKER};
use crate::provider::{CompletionRequest, LanguageModel, LlmError, TokenCallback, TransportMode};
use crate::registry::ToolRegistry;
use crate::scratchpad::{AgentStep, ScratchPad};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Default cap on model calls per run.
pub const DEFAULT_MAX_ITERATIONS: usize = 15;

/// Result text reported when the cap is hit.
pub const ITERATION_LIMIT_RESULT: &str = "Agent stopped due to max iterations.";

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model gave a final answer.
    Finished,
    /// The model never gave a final answer within the cap.
    IterationLimitExceeded,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub result: String,
    pub steps: Vec<AgentStep>,
    pub outcome: RunOutcome,
}

impl AgentRun {
    pub fn is_finished(&self) -> bool {
        self.outcome == RunOutcome::Finished
    }
}

/// The reasoning loop that drives model ↔ tool execution.
///
/// Flow: prompt → model → parse → dispatch tool or finish → prompt → ...
///
/// Malformed model output and tool failures become observations; only model
/// errors and cancellation end a run early.
pub struct AgentOrchestrator {
    model: Arc<dyn LanguageModel>,
    registry: Arc<ToolRegistry>,
    template: PromptTemplate,
    max_iterations: usize,
    stop_sequences: Vec<String>,
    mode: Option<TransportMode>,
    on_token: Option<TokenCallback>,
}

impl AgentOrchestrator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        registry: Arc<ToolRegistry>,
        template: PromptTemplate,
    ) -> Self {
        Self {
            model,
            registry,
            template,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            stop_sequences: vec![format!("\n{}", OBSERVATION_MARKER)],
            mode: None,
            on_token: None,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Force a transport mode for every model call of this orchestrator.
    pub fn with_mode(mut self, mode: TransportMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Receive generated fragments while the model streams.
    pub fn with_token_callback(mut self, callback: TokenCallback) -> Self {
        self.on_token = Some(callback);
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Run one user request through the loop.
    ///
    /// Each call owns a fresh scratchpad, so concurrent runs on one
    /// orchestrator never see each other's steps.
    pub async fn run(&self, input: &str, cancel: &CancellationToken) -> Result<AgentRun, AgentError> {
        let span = info_span!("agent_run", run_id = %Uuid::new_v4(), model = self.model.model_name());
        self.run_inner(input, cancel).instrument(span).await
    }

    async fn run_inner(&self, input: &str, cancel: &CancellationToken) -> Result<AgentRun, AgentError> {
        let mut scratchpad = ScratchPad::new();

        for iteration in 0..self.max_iterations {
            if cancel.is_cancelled() {
                info!(iteration, "Run cancelled");
                return Err(AgentError::Cancelled);
            }
            debug!(iteration, steps = scratchpad.len(), "Starting agent iteration");

            let prompt = self.template.render(input, &scratchpad.transcript());
            let text = self.call_model(prompt, cancel).await?;

            match parse_output(&text) {
                AgentDecision::Finish { answer } => {
                    info!(iteration, steps = scratchpad.len(), "Agent finished");
                    return Ok(AgentRun {
                        result: answer,
                        steps: scratchpad.into_steps(),
                        outcome: RunOutcome::Finished,
                    });
                }
                AgentDecision::Action { tool, input: action_input } => {
                    let observation = self.dispatch(&tool, &action_input).await;
                    debug!(tool = %tool, observation = %observation, "Tool observation");
                    scratchpad.push(AgentStep {
                        action: tool,
                        action_input,
                        observation,
                        log: text,
                    });
                }
                AgentDecision::Malformed => {
                    warn!(iteration, "Could not parse model output");
                    scratchpad.push(AgentStep {
                        action: INVALID_OUTPUT_ACTION.to_string(),
                        action_input: String::new(),
                        observation: INVALID_OUTPUT_OBSERVATION.to_string(),
                        log: text,
                    });
                }
            }
        }

        warn!(max_iterations = self.max_iterations, "Iteration limit reached");
        Ok(AgentRun {
            result: ITERATION_LIMIT_RESULT.to_string(),
            steps: scratchpad.into_steps(),
            outcome: RunOutcome::IterationLimitExceeded,
        })
    }

    async fn call_model(&self, prompt: String, cancel: &CancellationToken) -> Result<String, AgentError> {
        let mut request = CompletionRequest::prompt(prompt).with_stop_sequences(self.stop_sequences.clone());
        if let Some(mode) = self.mode {
            request = request.with_mode(mode);
        }
        if let Some(callback) = &self.on_token {
            request = request.with_token_callback(callback.clone());
        }

        match self.model.invoke(request, cancel).await {
            Ok(response) => Ok(response.text),
            Err(LlmError::Cancelled) => Err(AgentError::Cancelled),
            Err(e) => Err(AgentError::Model(e)),
        }
    }

    /// Resolve and call a tool. Never fails: every problem becomes the
    /// observation text.
    async fn dispatch(&self, name: &str, input: &str) -> String {
        let tool = match self.registry.resolve(name) {
            Ok(tool) => tool,
            Err(rejection) => {
                warn!(tool = name, %rejection, "Dispatch rejected");
                return rejection.to_string();
            }
        };

        match AssertUnwindSafe(tool.call(input)).catch_unwind().await {
            Ok(Ok(observation)) => observation,
            Ok(Err(e)) => {
                warn!(tool = name, error = %e, "Tool failed");
                format!("Tool error: {}", e)
            }
            Err(_) => {
                warn!(tool = name, "Tool panicked");
                "Tool error: handler panicked".to_string()
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Model(#[from] LlmError),
    #[error("Run cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptBuilder;
    use crate::provider::mock::ScriptedModel;
    use crate::registry::AllowList;
    use crate::tool::{Tool, ToolDefinition, ToolError};
    use crate::tools::{drawing_tools, DrawCommand, RecordingCanvas};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every raw input it is called with.
    struct RecordingTool {
        name: &'static str,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingTool {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Tool for RecordingTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.name, "records its input")
        }

        async fn call(&self, input: &str) -> Result<String, ToolError> {
            self.calls.lock().unwrap().push(input.to_string());
            tokio::task::yield_now().await;
            Ok(format!("{} ok", self.name))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("fail", "always fails")
        }

        async fn call(&self, _input: &str) -> Result<String, ToolError> {
            Err(ToolError::ExecutionFailed("canvas unavailable".into()))
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("panic", "always panics")
        }

        async fn call(&self, _input: &str) -> Result<String, ToolError> {
            panic!("boom");
        }
    }

    fn template(registry: &ToolRegistry) -> PromptTemplate {
        PromptBuilder::new("You draw.", "Question: {input}\nThought:{agent_scratchpad}")
            .build(&registry.list())
            .unwrap()
    }

    fn orchestrator(model: Arc<ScriptedModel>, registry: ToolRegistry) -> AgentOrchestrator {
        let template = template(&registry);
        AgentOrchestrator::new(model as Arc<dyn LanguageModel>, Arc::new(registry), template)
    }

    fn single_tool_registry(tool: Arc<dyn Tool>) -> ToolRegistry {
        let name = tool.definition().name;
        ToolRegistry::with_tools([tool], AllowList::new([name])).unwrap()
    }

    #[tokio::test]
    async fn test_final_answer_in_one_iteration() {
        let model = Arc::new(ScriptedModel::new());
        model.queue_text("Final Answer: done");
        let agent = orchestrator(model.clone(), ToolRegistry::new());

        let run = agent.run("draw a sun", &CancellationToken::new()).await.unwrap();

        assert_eq!(run.result, "done");
        assert_eq!(run.outcome, RunOutcome::Finished);
        assert!(run.steps.is_empty());
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_every_call_carries_observation_stop() {
        let model = Arc::new(ScriptedModel::new());
        model.queue_text("Final Answer: done");
        let agent = orchestrator(model.clone(), ToolRegistry::new());
        agent.run("x", &CancellationToken::new()).await.unwrap();

        let request = &model.requests()[0];
        assert_eq!(request.stop_sequences, Some(vec!["\nObservation:".to_string()]));
        assert_eq!(request.mode, None);
    }

    #[tokio::test]
    async fn test_draw_circle_dispatched_once_with_parsed_records() {
        let canvas = Arc::new(RecordingCanvas::new());
        let registry = ToolRegistry::with_tools(
            drawing_tools(canvas.clone()),
            AllowList::new(["drawCircle"]),
        )
        .unwrap();
        let model = Arc::new(ScriptedModel::new());
        model.queue_text("Action: drawCircle\nAction Input: x:1,y:2,radius:3");
        model.queue_text("Final Answer: a circle");
        let agent = orchestrator(model.clone(), registry);

        let run = agent.run("draw a circle", &CancellationToken::new()).await.unwrap();

        assert_eq!(run.result, "a circle");
        assert_eq!(
            canvas.commands(),
            vec![DrawCommand::Circle { x: 1.0, y: 2.0, radius: 3.0 }]
        );
        assert_eq!(run.steps.len(), 1);
        assert_eq!(run.steps[0].action, "drawCircle");
        assert_eq!(run.steps[0].action_input, "x:1,y:2,radius:3");
    }

    #[tokio::test]
    async fn test_scratchpad_reaches_next_prompt() {
        let tool = Arc::new(RecordingTool::new("drawLine"));
        let model = Arc::new(ScriptedModel::new());
        model.queue_text(" I need a line.\nAction: drawLine\nAction Input: {x1:0,y1:0,x2:5,y2:5}");
        model.queue_text("Final Answer: done");
        let agent = orchestrator(model.clone(), single_tool_registry(tool.clone()));

        agent.run("draw a line", &CancellationToken::new()).await.unwrap();

        assert_eq!(tool.calls(), vec!["{x1:0,y1:0,x2:5,y2:5}"]);
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].ends_with("Question: draw a line\nThought:"));
        assert!(prompts[1].ends_with(
            "Thought: I need a line.\nAction: drawLine\nAction Input: {x1:0,y1:0,x2:5,y2:5}\nObservation: drawLine ok\nThought:"
        ));
    }

    #[tokio::test]
    async fn test_tool_not_allowed_continues() {
        let tool = Arc::new(RecordingTool::new("drawRect"));
        let registry =
            ToolRegistry::with_tools([tool.clone() as Arc<dyn Tool>], AllowList::default()).unwrap();
        let model = Arc::new(ScriptedModel::new());
        model.queue_text("Action: drawRect\nAction Input: x:0,y:0,width:1,height:1");
        model.queue_text("Final Answer: gave up");
        let agent = orchestrator(model.clone(), registry);

        let run = agent.run("square", &CancellationToken::new()).await.unwrap();

        assert!(tool.calls().is_empty());
        assert!(run.steps[0].observation.starts_with("tool not allowed"));
        assert_eq!(run.outcome, RunOutcome::Finished);
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_continues() {
        let model = Arc::new(ScriptedModel::new());
        model.queue_text("Action: drawTriangle\nAction Input: x:1");
        model.queue_text("Final Answer: ok");
        let agent = orchestrator(model, single_tool_registry(Arc::new(RecordingTool::new("drawCircle"))));

        let run = agent.run("triangle", &CancellationToken::new()).await.unwrap();
        assert!(run.steps[0].observation.starts_with("unknown tool 'drawTriangle'"));
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let model = Arc::new(ScriptedModel::repeating("Action: drawCircle\nAction Input: x:1,y:1,radius:1"));
        let agent = orchestrator(model.clone(), single_tool_registry(Arc::new(RecordingTool::new("drawCircle"))))
            .with_max_iterations(3);

        let run = agent.run("circles forever", &CancellationToken::new()).await.unwrap();

        assert_eq!(run.outcome, RunOutcome::IterationLimitExceeded);
        assert!(!run.is_finished());
        assert_eq!(run.result, ITERATION_LIMIT_RESULT);
        assert_eq!(run.steps.len(), 3);
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn test_malformed_output_gets_corrective_observation() {
        let model = Arc::new(ScriptedModel::new());
        model.queue_text("I would like to draw a circle.");
        model.queue_text("Final Answer: done");
        let agent = orchestrator(model.clone(), ToolRegistry::new());

        let run = agent.run("circle", &CancellationToken::new()).await.unwrap();

        assert_eq!(run.outcome, RunOutcome::Finished);
        assert_eq!(run.steps.len(), 1);
        assert_eq!(run.steps[0].action, INVALID_OUTPUT_ACTION);
        assert_eq!(run.steps[0].observation, INVALID_OUTPUT_OBSERVATION);
        assert!(model.prompts()[1].contains(INVALID_OUTPUT_OBSERVATION));
    }

    #[tokio::test]
    async fn test_malformed_output_bounded_by_cap() {
        let model = Arc::new(ScriptedModel::repeating("no markers here"));
        let agent = orchestrator(model.clone(), ToolRegistry::new()).with_max_iterations(2);

        let run = agent.run("x", &CancellationToken::new()).await.unwrap();
        assert_eq!(run.outcome, RunOutcome::IterationLimitExceeded);
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_tool_error_becomes_observation() {
        let model = Arc::new(ScriptedModel::new());
        model.queue_text("Action: fail\nAction Input: x:1");
        model.queue_text("Final Answer: done");
        let agent = orchestrator(model, single_tool_registry(Arc::new(FailingTool)));

        let run = agent.run("x", &CancellationToken::new()).await.unwrap();
        assert_eq!(run.steps[0].observation, "Tool error: Execution failed: canvas unavailable");
    }

    #[tokio::test]
    async fn test_tool_panic_becomes_observation() {
        let model = Arc::new(ScriptedModel::new());
        model.queue_text("Action: panic\nAction Input: x:1");
        model.queue_text("Final Answer: survived");
        let agent = orchestrator(model, single_tool_registry(Arc::new(PanickingTool)));

        let run = agent.run("x", &CancellationToken::new()).await.unwrap();
        assert_eq!(run.steps[0].observation, "Tool error: handler panicked");
        assert_eq!(run.result, "survived");
    }

    #[tokio::test]
    async fn test_invalid_arguments_reach_model_as_invalid_arg() {
        let canvas = Arc::new(RecordingCanvas::new());
        let registry =
            ToolRegistry::with_tools(drawing_tools(canvas.clone()), AllowList::new(crate::tools::DRAWING_TOOL_NAMES))
                .unwrap();
        let model = Arc::new(ScriptedModel::new());
        model.queue_text("Action: drawCircle\nAction Input:   ");
        model.queue_text("Final Answer: done");
        let agent = orchestrator(model, registry);

        let run = agent.run("x", &CancellationToken::new()).await.unwrap();
        assert_eq!(run.steps[0].observation, "invalid arg");
        assert!(canvas.commands().is_empty());
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let model = Arc::new(ScriptedModel::new());
        model.queue_error(LlmError::Auth("bad key".into()));
        let agent = orchestrator(model, ToolRegistry::new());

        let err = agent.run("x", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::Model(LlmError::Auth(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_call() {
        let model = Arc::new(ScriptedModel::repeating("Final Answer: never"));
        let agent = orchestrator(model.clone(), ToolRegistry::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = agent.run("x", &cancel).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_model_cancellation_maps_to_cancelled() {
        let model = Arc::new(ScriptedModel::new());
        model.queue_error(LlmError::Cancelled);
        let agent = orchestrator(model, ToolRegistry::new());

        let err = agent.run("x", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_concurrent_runs_have_independent_scratchpads() {
        let tool = Arc::new(RecordingTool::new("drawCircle"));
        let model = Arc::new(ScriptedModel::new());
        // RecordingTool yields, so the two runs alternate: a, b, a, b.
        model.queue_text("Action: drawCircle\nAction Input: x:1");
        model.queue_text("Action: drawCircle\nAction Input: x:2");
        model.queue_text("Final Answer: first");
        model.queue_text("Final Answer: second");
        let agent = orchestrator(model, single_tool_registry(tool));
        let cancel = CancellationToken::new();

        let (a, b) = tokio::join!(agent.run("a", &cancel), agent.run("b", &cancel));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.steps.len(), 1);
        assert_eq!(b.steps.len(), 1);
        assert_ne!(a.steps[0].action_input, b.steps[0].action_input);
    }

    #[tokio::test]
    async fn test_mode_and_callback_forwarded() {
        let model = Arc::new(ScriptedModel::new());
        model.queue_text("Final Answer: done");
        let callback: TokenCallback = Arc::new(|_: &str| {});
        let agent = orchestrator(model.clone(), ToolRegistry::new())
            .with_mode(TransportMode::Streaming)
            .with_token_callback(callback);

        agent.run("x", &CancellationToken::new()).await.unwrap();
        let request = &model.requests()[0];
        assert_eq!(request.mode, Some(TransportMode::Streaming));
        assert!(request.on_token.is_some());
    }
}
