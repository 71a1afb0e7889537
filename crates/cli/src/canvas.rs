use async_trait::async_trait;
use doodle_tool_runtime::{Canvas, CanvasError, DrawCommand};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::terminal::Terminal;

/// Canvas that prints every command it receives.
pub struct TerminalCanvas {
    terminal: Arc<Terminal>,
    drawn: AtomicUsize,
}

impl TerminalCanvas {
    pub fn new(terminal: Arc<Terminal>) -> Self {
        Self {
            terminal,
            drawn: AtomicUsize::new(0),
        }
    }

    /// Shapes drawn since the last clear.
    pub fn shape_count(&self) -> usize {
        self.drawn.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Canvas for TerminalCanvas {
    async fn execute(&self, command: DrawCommand) -> Result<(), CanvasError> {
        self.terminal
            .display_command(&command)
            .map_err(|e| CanvasError::Unavailable(format!("terminal write failed: {e}")))?;
        match command {
            DrawCommand::Clear => self.drawn.store(0, Ordering::SeqCst),
            _ => {
                self.drawn.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}
