pub mod output;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod repair;
pub mod runtime;
pub mod scratchpad;
pub mod shape;
pub mod tool;
pub mod tools;

pub use output::{parse_output, AgentDecision};
pub use prompt::{PromptBuilder, PromptError, PromptTemplate};
pub use provider::{
    CompletionRequest, CompletionResponse, LanguageModel, LlmError, Message, PromptInput, Role,
    TokenCallback, TransportMode,
};
pub use registry::{AllowList, DispatchRejection, RegistryError, ToolRegistry};
pub use repair::{parse_shape_args, ArgError, INVALID_ARG};
pub use runtime::{AgentError, AgentOrchestrator, AgentRun, RunOutcome};
pub use scratchpad::{AgentStep, ScratchPad};
pub use shape::ShapeParams;
pub use tool::{Tool, ToolDefinition, ToolError};
pub use tools::{drawing_tools, Canvas, CanvasError, DrawCommand, DrawTool, RecordingCanvas};
