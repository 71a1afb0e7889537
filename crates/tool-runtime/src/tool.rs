use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Describes a tool for the model: the catalog shows `name: description`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name (e.g., "drawCircle")
    pub name: String,
    /// Shown verbatim to the model
    pub description: String,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.description)
    }
}

/// The primary extension point: all tools implement this trait.
///
/// A tool receives the raw `Action Input` text exactly as the model wrote it
/// and returns observation text. Errors are converted to observation text by
/// the orchestrator and never end a run.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's definition (name and description).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool against the model's raw argument text.
    async fn call(&self, input: &str) -> Result<String, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
