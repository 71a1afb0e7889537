//! Built-in tools: the repaired-argument wrapper and the drawing toolset.

pub mod canvas;
pub mod draw;

pub use canvas::{drawing_tools, Canvas, CanvasError, ClearTool, DrawCommand, RecordingCanvas, DRAWING_TOOL_NAMES};
pub use draw::{DrawHandler, DrawTool};
