use clap::Parser;
use doodle_core::Config;

/// Terminal front end for the doodle drawing agent.
///
/// With a prompt, runs one drawing request and exits. Without one, starts a
/// REPL that runs each line as a request.
#[derive(Parser, Debug)]
#[command(name = "doodle", about = "Ask an LLM agent to draw shapes")]
pub struct CliArgs {
    /// Drawing request for one-shot mode, e.g. "draw a house"
    pub prompt: Option<String>,

    /// LLM provider to use: anthropic or openai
    #[arg(long)]
    pub provider: Option<String>,

    /// Model name override (uses provider default if not set)
    #[arg(long)]
    pub model: Option<String>,

    /// API key (overrides env var and config file)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Path to config file (default: ~/.config/doodle/config.toml)
    #[arg(long)]
    pub config: Option<String>,

    /// Config profile; keys are read as {PROFILE}_{KEY} before {KEY}
    #[arg(long, env = "DOODLE_PROFILE")]
    pub profile: Option<String>,

    /// Maximum reasoning iterations per request
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Comma-separated tool names the agent may call
    #[arg(long, value_delimiter = ',')]
    pub allowed_tools: Option<Vec<String>>,

    /// Print generated tokens as they arrive
    #[arg(long)]
    pub stream: bool,

    /// Do not print intermediate steps
    #[arg(long)]
    pub quiet: bool,
}

impl CliArgs {
    /// Apply flags on top of env and file config. Flags always win.
    pub fn apply(&self, config: &mut Config) {
        if let Some(provider) = &self.provider {
            config.llm.provider = provider.trim().to_lowercase();
        }
        if let Some(model) = &self.model {
            match config.llm.provider.as_str() {
                "openai" => config.llm.openai_model = model.clone(),
                _ => config.llm.anthropic_model = model.clone(),
            }
        }
        if let Some(key) = &self.api_key {
            match config.llm.provider.as_str() {
                "openai" => config.llm.openai_api_key = Some(key.clone()),
                _ => config.llm.anthropic_api_key = Some(key.clone()),
            }
        }
        if let Some(max) = self.max_iterations {
            config.agent.max_iterations = max;
        }
        if let Some(tools) = &self.allowed_tools {
            let tools: Vec<String> = tools
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            config.agent.allowed_tools = Some(tools);
        }
        if self.stream {
            config.llm.streaming = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("doodle").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_one_shot_prompt() {
        let args = parse(&["draw a house", "--stream"]);
        assert_eq!(args.prompt.as_deref(), Some("draw a house"));
        assert!(args.stream);
        assert!(args.provider.is_none());
    }

    #[test]
    fn test_allowed_tools_split_on_commas() {
        let args = parse(&["--allowed-tools", "drawCircle,drawLine"]);
        assert_eq!(
            args.allowed_tools,
            Some(vec!["drawCircle".to_string(), "drawLine".to_string()])
        );
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::for_profile("CLI_ARGS_TEST_UNUSED");
        let args = parse(&[
            "--provider",
            "OpenAI",
            "--model",
            "gpt-x",
            "--api-key",
            "sk-flag",
            "--max-iterations",
            "4",
            "--stream",
        ]);
        args.apply(&mut config);
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model(), "gpt-x");
        assert_eq!(config.llm.api_key(), Some("sk-flag"));
        assert_eq!(config.agent.max_iterations, 4);
        assert!(config.llm.streaming);
    }

    #[test]
    fn test_model_flag_targets_anthropic_by_default() {
        let mut config = Config::for_profile("CLI_ARGS_TEST_UNUSED");
        config.llm.provider = "anthropic".into();
        parse(&["--model", "claude-instant-1"]).apply(&mut config);
        assert_eq!(config.llm.anthropic_model, "claude-instant-1");
    }
}
