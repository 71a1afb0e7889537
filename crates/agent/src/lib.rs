pub mod draw_agent;
pub mod prompts;

pub use draw_agent::{DrawAgent, DrawAgentError};
