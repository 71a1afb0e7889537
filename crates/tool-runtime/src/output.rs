//! Reads the model's text and decides what the loop does next.

use crate::prompt::{
    ACTION_INPUT_MARKER, ACTION_MARKER, FINAL_ANSWER_MARKER, OBSERVATION_MARKER, THOUGHT_MARKER,
};

/// Observation fed back when the model's text matches no known pattern.
pub const INVALID_OUTPUT_OBSERVATION: &str = "could not parse output. Reply with an `Action:` line \
followed by an `Action Input:` line, or with `Final Answer:` when you are done.";

/// Action name recorded for steps produced by unparseable output.
pub const INVALID_OUTPUT_ACTION: &str = "_invalid_output";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentDecision {
    /// The run is over.
    Finish { answer: String },
    /// Dispatch `tool` with the raw argument text.
    Action { tool: String, input: String },
    /// Neither pattern was found.
    Malformed,
}

/// Parse one model reply.
///
/// `Final Answer:` wins over an action in the same reply. Action input runs
/// until the next marker (`Observation:`, `Thought:`, `Action:`) or the end of
/// the text.
pub fn parse_output(text: &str) -> AgentDecision {
    if let Some(pos) = text.find(FINAL_ANSWER_MARKER) {
        let answer = text[pos + FINAL_ANSWER_MARKER.len()..].trim().to_string();
        return AgentDecision::Finish { answer };
    }

    let Some(action_pos) = text.find(ACTION_MARKER) else {
        return AgentDecision::Malformed;
    };
    let after_action = &text[action_pos + ACTION_MARKER.len()..];
    let Some(input_pos) = after_action.find(ACTION_INPUT_MARKER) else {
        return AgentDecision::Malformed;
    };

    let tool = after_action[..input_pos]
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string();
    if tool.is_empty() {
        return AgentDecision::Malformed;
    }

    let raw_input = &after_action[input_pos + ACTION_INPUT_MARKER.len()..];
    let end = [OBSERVATION_MARKER, THOUGHT_MARKER, ACTION_MARKER]
        .iter()
        .filter_map(|marker| raw_input.find(marker))
        .min()
        .unwrap_or(raw_input.len());

    AgentDecision::Action {
        tool,
        input: raw_input[..end].trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(tool: &str, input: &str) -> AgentDecision {
        AgentDecision::Action {
            tool: tool.to_string(),
            input: input.to_string(),
        }
    }

    #[test]
    fn test_final_answer() {
        assert_eq!(
            parse_output("Final Answer: done"),
            AgentDecision::Finish { answer: "done".to_string() }
        );
        assert_eq!(
            parse_output("Thought: I now know the final answer\nFinal Answer:  a red house \n"),
            AgentDecision::Finish { answer: "a red house".to_string() }
        );
    }

    #[test]
    fn test_final_answer_wins_over_action() {
        let text = "Action: drawCircle\nAction Input: {x:1}\nFinal Answer: finished";
        assert_eq!(
            parse_output(text),
            AgentDecision::Finish { answer: "finished".to_string() }
        );
    }

    #[test]
    fn test_action() {
        assert_eq!(
            parse_output("Action: drawCircle\nAction Input: x:1,y:2,radius:3"),
            action("drawCircle", "x:1,y:2,radius:3")
        );
    }

    #[test]
    fn test_action_with_thought_and_trailing_observation() {
        let text = " I need a sun.\nAction:  drawCircle \nAction Input: {x:10,y:10,radius:5}\nObservation: made up";
        assert_eq!(parse_output(text), action("drawCircle", "{x:10,y:10,radius:5}"));
    }

    #[test]
    fn test_multiline_input_stops_at_next_marker() {
        let text = "Action: drawRect\nAction Input: {x:0,y:0,width:5,height:5},\n{x:9,y:9,width:1,height:1}\nThought: next";
        assert_eq!(
            parse_output(text),
            action("drawRect", "{x:0,y:0,width:5,height:5},\n{x:9,y:9,width:1,height:1}")
        );
    }

    #[test]
    fn test_empty_input_is_still_an_action() {
        assert_eq!(parse_output("Action: Clear\nAction Input:"), action("Clear", ""));
    }

    #[test]
    fn test_malformed() {
        assert_eq!(parse_output("I think I'll draw something."), AgentDecision::Malformed);
        assert_eq!(parse_output("Action: drawCircle"), AgentDecision::Malformed);
        assert_eq!(parse_output("Action:\nAction Input: x:1"), AgentDecision::Malformed);
        assert_eq!(parse_output(""), AgentDecision::Malformed);
    }
}
