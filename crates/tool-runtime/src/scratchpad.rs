use serde::{Deserialize, Serialize};

use crate::prompt::{OBSERVATION_MARKER, THOUGHT_MARKER};

/// One completed action and what came of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStep {
    /// Tool name as written by the model
    pub action: String,
    /// Raw `Action Input` text, before argument repair
    pub action_input: String,
    /// Text handed back to the model
    pub observation: String,
    /// The model's full reply that produced this step
    pub log: String,
}

/// Per-run transcript of steps. Append-only.
#[derive(Debug, Clone, Default)]
pub struct ScratchPad {
    steps: Vec<AgentStep>,
}

impl ScratchPad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: AgentStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[AgentStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn into_steps(self) -> Vec<AgentStep> {
        self.steps
    }

    /// Render the steps for the `{agent_scratchpad}` slot.
    pub fn transcript(&self) -> String {
        self.steps
            .iter()
            .map(|step| {
                format!(
                    "{}\n{} {}\n{}",
                    step.log.trim_end(),
                    OBSERVATION_MARKER,
                    step.observation,
                    THOUGHT_MARKER
                )
            })
            .collect()
    }
}
