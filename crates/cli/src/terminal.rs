use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use doodle_tool_runtime::scratchpad::AgentStep;
use doodle_tool_runtime::{AgentRun, DrawCommand, RunOutcome};
use std::io::{self, BufRead, Write};
use tokio::sync::mpsc;

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const USER_PROMPT: Color = Color::Green;
    const ASSISTANT_TEXT: Color = Color::Cyan;
    const TOOL_CALL: Color = Color::Yellow;
    const TOOL_RESULT: Color = Color::DarkGreen;
    const DRAW: Color = Color::Blue;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
}

/// Longest observation shown in full.
const MAX_DISPLAY_CHARS: usize = 500;

/// Manages terminal I/O for one-shot runs and the REPL.
pub struct Terminal {
    show_steps: bool,
}

impl Terminal {
    pub fn new(show_steps: bool) -> Self {
        Self { show_steps }
    }

    /// Print the startup banner.
    pub fn print_banner(&self, provider: &str, model: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("doodle"),
            ResetColor,
            Print(" - LLM drawing agent\n"),
            SetForegroundColor(Colors::DIM),
            Print(format!("Provider: {} | Model: {}\n", provider, model)),
            Print("Type 'exit' or 'quit' (or Ctrl+C at the prompt) to end. Ctrl+C during a drawing cancels it.\n"),
            Print("---\n"),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print the input prompt.
    pub fn print_prompt(&self) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Colors::USER_PROMPT),
            Print("draw> "),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Display one command as the canvas receives it.
    pub fn display_command(&self, command: &DrawCommand) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DRAW),
            Print(format!("  [canvas] {}\n", command)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Display one completed tool step.
    pub fn display_step(&self, index: usize, step: &AgentStep) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::TOOL_CALL),
            Print(format!("[step {}: {}] ", index + 1, step.action)),
            SetForegroundColor(Colors::DIM),
            Print(format!("{}\n", truncate_for_display(step.action_input.trim()))),
            SetForegroundColor(Colors::TOOL_RESULT),
            Print(format!("  -> {}\n", truncate_for_display(&step.observation))),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Display the steps (unless quiet) and the final result of a run.
    pub fn display_run(&self, run: &AgentRun) -> Result<()> {
        if self.show_steps {
            for (i, step) in run.steps.iter().enumerate() {
                self.display_step(i, step)?;
            }
        }

        let mut stdout = io::stdout();
        let color = match run.outcome {
            RunOutcome::Finished => Colors::ASSISTANT_TEXT,
            RunOutcome::IterationLimitExceeded => Colors::ERROR,
        };
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(color),
            Print(format!("{}\n", run.result)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an error message.
    pub fn print_error(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::ERROR),
            Print(format!("Error: {}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an info message.
    pub fn print_info(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("{}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }
}

/// Print a streamed token. Output errors are dropped; the run goes on.
pub fn print_token(token: &str) {
    let mut stdout = io::stdout();
    execute!(
        stdout,
        SetForegroundColor(Colors::DIM),
        Print(token),
        ResetColor,
    )
    .ok();
    stdout.flush().ok();
}

/// Read lines on a dedicated thread so the REPL can await input alongside
/// Ctrl+C. The channel closes at end of input or after a read error.
pub fn spawn_line_reader<R>(mut reader: R) -> mpsc::Receiver<io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                if tx.blocking_send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tx.blocking_send(Err(e)).ok();
                break;
            }
        }
    });
    rx
}

/// Trim a line of user input. Returns None on exit commands.
pub fn parse_input(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if matches!(trimmed, "exit" | "quit" | "/exit" | "/quit") {
        return None;
    }
    Some(trimmed.to_string())
}

/// Shorten long text on a char boundary.
fn truncate_for_display(content: &str) -> String {
    let total = content.chars().count();
    if total <= MAX_DISPLAY_CHARS {
        return content.to_string();
    }
    let head: String = content.chars().take(MAX_DISPLAY_CHARS).collect();
    format!("{}... ({} chars total)", head, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_for_display("drew 1 circle(s)"), "drew 1 circle(s)");
    }

    #[test]
    fn test_long_text_truncated_on_char_boundary() {
        let long = "é".repeat(MAX_DISPLAY_CHARS + 10);
        let shown = truncate_for_display(&long);
        assert!(shown.starts_with(&"é".repeat(MAX_DISPLAY_CHARS)));
        assert!(shown.ends_with(&format!("... ({} chars total)", MAX_DISPLAY_CHARS + 10)));
    }

    #[test]
    fn test_exit_commands() {
        assert_eq!(parse_input("  a red sun \n").as_deref(), Some("a red sun"));
        assert_eq!(parse_input("\n").as_deref(), Some(""));
        assert_eq!(parse_input("quit\n"), None);
        assert_eq!(parse_input("/exit"), None);
    }

    #[tokio::test]
    async fn test_line_reader_closes_at_end_of_input() {
        let mut lines = spawn_line_reader(io::Cursor::new("a circle\nexit\n"));
        assert_eq!(lines.recv().await.unwrap().unwrap(), "a circle\n");
        assert_eq!(lines.recv().await.unwrap().unwrap(), "exit\n");
        assert!(lines.recv().await.is_none());
    }
}
