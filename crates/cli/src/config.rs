use anyhow::{Context, Result};
use doodle_core::Config;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// CLI configuration loaded from TOML file.
///
/// Every field is optional: a value here only fills in what the environment
/// left unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Default LLM provider name (anthropic, openai)
    #[serde(default)]
    pub default_provider: Option<String>,

    /// Default model per provider
    #[serde(default)]
    pub default_models: HashMap<String, String>,

    /// API keys keyed by provider name
    #[serde(default)]
    pub api_keys: HashMap<String, String>,

    /// Reasoning iteration cap per request
    #[serde(default)]
    pub max_iterations: Option<usize>,

    /// Tool names the agent may call
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,
}

impl CliConfig {
    /// Return the default config directory path: ~/.config/doodle/
    pub fn default_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("could not determine user config directory")?
            .join("doodle");
        Ok(config_dir)
    }

    /// Return the default config file path.
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.toml"))
    }

    /// Load config from the given path, or the default path.
    /// Returns default config if the file does not exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if !config_path.exists() {
            debug!(?config_path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        debug!(?config_path, "Loading config");
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read config: {}", config_path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config: {}", config_path.display()))
    }

    /// Fill in values the environment left unset.
    ///
    /// `lookup` reads environment variables; a variable counts as set under
    /// either its plain name or its `{PROFILE}_` prefixed name.
    pub fn apply(&self, config: &mut Config, lookup: &dyn Fn(&str) -> Option<String>) {
        let profile = config.profile.clone();
        let env_set = |key: &str| {
            let read = |k: &str| lookup(k).filter(|v| !v.is_empty()).is_some();
            (!profile.is_empty() && read(&format!("{}_{}", profile, key))) || read(key)
        };

        if let Some(provider) = &self.default_provider {
            if !env_set("LLM_PROVIDER") {
                config.llm.provider = provider.trim().to_lowercase();
            }
        }

        for (provider, model) in &self.default_models {
            match provider.as_str() {
                "anthropic" | "claude" if !env_set("ANTHROPIC_MODEL") => {
                    config.llm.anthropic_model = model.clone()
                }
                "openai" if !env_set("OPENAI_MODEL") => config.llm.openai_model = model.clone(),
                _ => {}
            }
        }

        for (provider, key) in &self.api_keys {
            match provider.as_str() {
                "anthropic" | "claude" if !env_set("ANTHROPIC_API_KEY") => {
                    config.llm.anthropic_api_key = Some(key.clone())
                }
                "openai" if !env_set("OPENAI_API_KEY") => config.llm.openai_api_key = Some(key.clone()),
                _ => {}
            }
        }

        if let Some(max) = self.max_iterations {
            if !env_set("AGENT_MAX_ITERATIONS") {
                config.agent.max_iterations = max;
            }
        }

        if let Some(tools) = &self.allowed_tools {
            if !env_set("AGENT_ALLOWED_TOOLS") {
                config.agent.allowed_tools = Some(tools.clone());
            }
        }
    }
}
