//! Prompt assembly for the reasoning loop.
//!
//! The template is `prefix`, one catalog line per tool, format instructions,
//! then `suffix`. The suffix carries the run-time slots `{input}` and
//! `{agent_scratchpad}`.

use crate::tool::ToolDefinition;

/// Marker the output parser looks for to finish a run.
pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";
/// Marker preceding the tool name.
pub const ACTION_MARKER: &str = "Action:";
/// Marker preceding the raw tool arguments.
pub const ACTION_INPUT_MARKER: &str = "Action Input:";
/// Marker preceding a tool result in the transcript.
pub const OBSERVATION_MARKER: &str = "Observation:";
/// Marker preceding the model's reasoning.
pub const THOUGHT_MARKER: &str = "Thought:";

pub const INPUT_SLOT: &str = "{input}";
pub const SCRATCHPAD_SLOT: &str = "{agent_scratchpad}";
const TOOL_NAMES_SLOT: &str = "{tool_names}";

/// Default format instructions; `{tool_names}` is filled at build time.
pub const FORMAT_INSTRUCTIONS: &str = "Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("prompt suffix is missing the {0} placeholder")]
    MissingPlaceholder(&'static str),
}

/// Assembles the fixed instruction template.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    prefix: String,
    suffix: String,
    format_instructions: String,
}

impl PromptBuilder {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            format_instructions: FORMAT_INSTRUCTIONS.to_string(),
        }
    }

    pub fn with_format_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.format_instructions = instructions.into();
        self
    }

    /// Build the template for an ordered tool list.
    pub fn build(&self, tools: &[ToolDefinition]) -> Result<PromptTemplate, PromptError> {
        for slot in [INPUT_SLOT, SCRATCHPAD_SLOT] {
            if !self.suffix.contains(slot) {
                return Err(PromptError::MissingPlaceholder(slot));
            }
        }

        let catalog = tools
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        let tool_names = tools
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let instructions = self.format_instructions.replace(TOOL_NAMES_SLOT, &tool_names);

        let template = [
            self.prefix.as_str(),
            catalog.as_str(),
            instructions.as_str(),
            self.suffix.as_str(),
        ]
        .join("\n\n");

        Ok(PromptTemplate { template })
    }
}

/// A built template waiting for the run-time slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute the user input and scratchpad transcript.
    ///
    /// Single pass: substituted text is never scanned for placeholders, so a
    /// user who types `{agent_scratchpad}` gets exactly that text back.
    pub fn render(&self, input: &str, scratchpad: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + input.len() + scratchpad.len());
        let mut rest = self.template.as_str();

        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix(INPUT_SLOT) {
                out.push_str(input);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(SCRATCHPAD_SLOT) {
                out.push_str(scratchpad);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}
