pub mod config;
pub mod error;

pub use config::{AgentConfig, Config, LlmConfig};
pub use error::*;
