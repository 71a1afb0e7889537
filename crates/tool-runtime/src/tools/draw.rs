use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::repair::{parse_shape_args, INVALID_ARG};
use crate::shape::ShapeParams;
use crate::tool::{Tool, ToolDefinition, ToolError};

/// Receives the parsed records of one tool call and returns observation text.
#[async_trait]
pub trait DrawHandler: Send + Sync {
    async fn draw(&self, shapes: Vec<ShapeParams>) -> Result<String, ToolError>;
}

/// Adapts a synchronous closure into a [`DrawHandler`].
struct FnHandler<F>(F);

#[async_trait]
impl<F> DrawHandler for FnHandler<F>
where
    F: Fn(Vec<ShapeParams>) -> Result<String, ToolError> + Send + Sync,
{
    async fn draw(&self, shapes: Vec<ShapeParams>) -> Result<String, ToolError> {
        (self.0)(shapes)
    }
}

/// A tool whose argument text is repaired into shape records before the
/// handler sees it.
///
/// Unparseable arguments never reach the handler: the model gets
/// `"invalid arg"` back instead.
pub struct DrawTool {
    definition: ToolDefinition,
    handler: Arc<dyn DrawHandler>,
}

impl DrawTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn DrawHandler>,
    ) -> Self {
        Self {
            definition: ToolDefinition::new(name, description),
            handler,
        }
    }

    pub fn from_fn<F>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<ShapeParams>) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        Self::new(name, description, Arc::new(FnHandler(f)))
    }
}

#[async_trait]
impl Tool for DrawTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn call(&self, input: &str) -> Result<String, ToolError> {
        let shapes = match parse_shape_args(input) {
            Ok(shapes) => shapes,
            Err(e) => {
                debug!(tool = %self.definition.name, error = %e, "Rejecting tool arguments");
                return Ok(INVALID_ARG.to_string());
            }
        };
        debug!(tool = %self.definition.name, count = shapes.len(), "Drawing shapes");
        self.handler.draw(shapes).await
    }
}
