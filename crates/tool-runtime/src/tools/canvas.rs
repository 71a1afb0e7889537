//! The drawing toolset.
//!
//! Each tool turns shape records into [`DrawCommand`]s and sends them to a
//! [`Canvas`]. What a canvas does with a command (paint pixels, print to a
//! terminal, record it) is up to the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::draw::{DrawHandler, DrawTool};
use crate::shape::ShapeParams;
use crate::tool::{Tool, ToolDefinition, ToolError};

/// Tool names in catalog order.
pub const DRAWING_TOOL_NAMES: [&str; 5] = ["drawCircle", "drawRect", "drawLine", "drawEllipse", "Clear"];

/// One primitive for the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum DrawCommand {
    Circle { x: f64, y: f64, radius: f64 },
    Rect { x: f64, y: f64, width: f64, height: f64 },
    Line { x1: f64, y1: f64, x2: f64, y2: f64 },
    Ellipse { x: f64, y: f64, radius_x: f64, radius_y: f64 },
    Clear,
}

impl fmt::Display for DrawCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawCommand::Circle { x, y, radius } => write!(f, "circle at ({x}, {y}) r={radius}"),
            DrawCommand::Rect { x, y, width, height } => {
                write!(f, "rect at ({x}, {y}) {width}x{height}")
            }
            DrawCommand::Line { x1, y1, x2, y2 } => write!(f, "line ({x1}, {y1}) -> ({x2}, {y2})"),
            DrawCommand::Ellipse { x, y, radius_x, radius_y } => {
                write!(f, "ellipse at ({x}, {y}) rx={radius_x} ry={radius_y}")
            }
            DrawCommand::Clear => write!(f, "clear"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CanvasError {
    #[error("canvas unavailable: {0}")]
    Unavailable(String),
    #[error("canvas rejected command: {0}")]
    Rejected(String),
}

/// Where draw commands end up.
#[async_trait]
pub trait Canvas: Send + Sync {
    async fn execute(&self, command: DrawCommand) -> Result<(), CanvasError>;
}

/// Keeps every command in memory.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    commands: Mutex<Vec<DrawCommand>>,
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands received so far, in order.
    pub fn commands(&self) -> Vec<DrawCommand> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Canvas for RecordingCanvas {
    async fn execute(&self, command: DrawCommand) -> Result<(), CanvasError> {
        self.commands
            .lock()
            .map_err(|_| CanvasError::Unavailable("recording lock poisoned".to_string()))?
            .push(command);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeKind {
    Circle,
    Rect,
    Line,
    Ellipse,
}

impl ShapeKind {
    fn tool_name(self) -> &'static str {
        match self {
            ShapeKind::Circle => "drawCircle",
            ShapeKind::Rect => "drawRect",
            ShapeKind::Line => "drawLine",
            ShapeKind::Ellipse => "drawEllipse",
        }
    }

    fn description(self) -> &'static str {
        match self {
            ShapeKind::Circle => {
                "draws circles. Input is one or more objects with x, y (center) and radius, e.g. {x:100,y:100,radius:50}"
            }
            ShapeKind::Rect => {
                "draws rectangles. Input is one or more objects with x, y (top-left corner), width and height, e.g. {x:10,y:10,width:80,height:40}"
            }
            ShapeKind::Line => {
                "draws straight lines. Input is one or more objects with points holding x1, y1, x2, y2, e.g. {points:{x1:0,y1:0,x2:50,y2:50}}"
            }
            ShapeKind::Ellipse => {
                "draws ellipses. Input is one or more objects with x, y (center), radiusX and radiusY, e.g. {x:60,y:60,radiusX:40,radiusY:20}"
            }
        }
    }

    fn required_fields(self) -> &'static str {
        match self {
            ShapeKind::Circle => "x, y, radius",
            ShapeKind::Rect => "x, y, width, height",
            ShapeKind::Line => "x1, y1, x2, y2",
            ShapeKind::Ellipse => "x, y, radiusX, radiusY",
        }
    }

    /// `None` when a required field is missing.
    fn command(self, s: &ShapeParams) -> Option<DrawCommand> {
        Some(match self {
            ShapeKind::Circle => DrawCommand::Circle {
                x: s.x?,
                y: s.y?,
                radius: s.radius?,
            },
            ShapeKind::Rect => DrawCommand::Rect {
                x: s.x?,
                y: s.y?,
                width: s.width?,
                height: s.height?,
            },
            ShapeKind::Line => DrawCommand::Line {
                x1: s.x1?,
                y1: s.y1?,
                x2: s.x2?,
                y2: s.y2?,
            },
            ShapeKind::Ellipse => DrawCommand::Ellipse {
                x: s.x?,
                y: s.y?,
                radius_x: s.radius_x?,
                radius_y: s.radius_y?,
            },
        })
    }
}

struct ShapeHandler {
    kind: ShapeKind,
    canvas: Arc<dyn Canvas>,
}

#[async_trait]
impl DrawHandler for ShapeHandler {
    async fn draw(&self, shapes: Vec<ShapeParams>) -> Result<String, ToolError> {
        let total = shapes.len();
        let mut drawn = 0;
        let mut skipped = Vec::new();

        for (index, shape) in shapes.iter().enumerate() {
            let Some(command) = self.kind.command(shape) else {
                skipped.push(index + 1);
                continue;
            };
            self.canvas
                .execute(command)
                .await
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
            drawn += 1;
        }

        if drawn == 0 {
            return Err(ToolError::InvalidInput(format!(
                "no usable shape in {} record(s); each needs {}",
                total,
                self.kind.required_fields()
            )));
        }

        let noun = self.kind.tool_name().trim_start_matches("draw").to_lowercase();
        let mut observation = format!("drew {} {}(s)", drawn, noun);
        if !skipped.is_empty() {
            warn!(tool = self.kind.tool_name(), ?skipped, "Skipped incomplete records");
            let list = skipped.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            observation.push_str(&format!(
                "; skipped record(s) {} missing one of {}",
                list,
                self.kind.required_fields()
            ));
        }
        Ok(observation)
    }
}

/// Wipes the canvas. Arguments are ignored, so an empty `Action Input` works.
pub struct ClearTool {
    canvas: Arc<dyn Canvas>,
}

impl ClearTool {
    pub fn new(canvas: Arc<dyn Canvas>) -> Self {
        Self { canvas }
    }
}

#[async_trait]
impl Tool for ClearTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("Clear", "clears everything on the canvas. Input is ignored")
    }

    async fn call(&self, input: &str) -> Result<String, ToolError> {
        debug!(input, "Clearing canvas");
        self.canvas
            .execute(DrawCommand::Clear)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok("canvas cleared".to_string())
    }
}

/// The five drawing tools bound to one canvas, in catalog order.
pub fn drawing_tools(canvas: Arc<dyn Canvas>) -> Vec<Arc<dyn Tool>> {
    let mut tools: Vec<Arc<dyn Tool>> = [ShapeKind::Circle, ShapeKind::Rect, ShapeKind::Line, ShapeKind::Ellipse]
        .into_iter()
        .map(|kind| {
            let handler = Arc::new(ShapeHandler {
                kind,
                canvas: canvas.clone(),
            });
            Arc::new(DrawTool::new(kind.tool_name(), kind.description(), handler)) as Arc<dyn Tool>
        })
        .collect();
    tools.push(Arc::new(ClearTool::new(canvas)));
    tools
}
