use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Variable lookup used while building config. Production reads the process
/// environment; tests pass a fixed map.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Read a profiled var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
/// Empty values count as unset.
fn profiled_opt(lookup: Lookup<'_>, profile: &str, key: &str) -> Option<String> {
    let read = |k: &str| lookup(k).filter(|s| !s.is_empty());
    if !profile.is_empty() {
        if let Some(v) = read(&format!("{}_{}", profile, key)) {
            return Some(v);
        }
    }
    read(key)
}

fn profiled_or(lookup: Lookup<'_>, profile: &str, key: &str, default: &str) -> String {
    profiled_opt(lookup, profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_parse<T: std::str::FromStr>(lookup: Lookup<'_>, profile: &str, key: &str, default: T) -> T {
    match profiled_opt(lookup, profile, key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparseable config value, using default");
            default
        }),
        None => default,
    }
}

fn profiled_bool(lookup: Lookup<'_>, profile: &str, key: &str, default: bool) -> bool {
    match profiled_opt(lookup, profile, key) {
        Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

/// Comma-separated list. Entries are trimmed; empty entries are dropped.
fn profiled_list(lookup: Lookup<'_>, profile: &str, key: &str) -> Option<Vec<String>> {
    profiled_opt(lookup, profile, key).map(|raw| split_list(&raw))
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Stop sequences keep their whitespace. A JSON array of strings is taken
/// as-is; anything else is split on commas without trimming.
fn profiled_stop_sequences(lookup: Lookup<'_>, profile: &str, key: &str) -> Option<Vec<String>> {
    profiled_opt(lookup, profile, key).map(|raw| split_stop_sequences(key, &raw))
}

fn split_stop_sequences(key: &str, raw: &str) -> Vec<String> {
    if raw.trim_start().starts_with('[') {
        match serde_json::from_str::<Vec<String>>(raw.trim()) {
            Ok(list) => return list.into_iter().filter(|s| !s.is_empty()).collect(),
            Err(e) => tracing::warn!(key, error = %e, "stop sequences are not a JSON string array, splitting on commas"),
        }
    }
    raw.split(',')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `DOODLE_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = process_env("DOODLE_PROFILE").unwrap_or_default();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        Self::from_lookup(profile, &process_env)
    }

    fn from_lookup(profile: &str, lookup: Lookup<'_>) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            llm: LlmConfig::from_lookup(lookup, p),
            agent: AgentConfig::from_lookup(lookup, p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  llm:    provider={}, model={}, configured={}, streaming={}",
            self.llm.provider,
            self.llm.model(),
            self.llm.is_configured(),
            self.llm.streaming
        );
        tracing::info!(
            "  agent:  max_iterations={}, allowed_tools={}",
            self.agent.max_iterations,
            self.agent
                .allowed_tools
                .as_ref()
                .map(|t| t.join(","))
                .unwrap_or_else(|| "(all)".to_string())
        );
    }

    /// Return a redacted view safe for display (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "llm": {
                "provider": self.llm.provider,
                "model": self.llm.model(),
                "configured": self.llm.is_configured(),
                "streaming": self.llm.streaming,
                "max_retries": self.llm.max_retries,
            },
            "agent": {
                "max_iterations": self.agent.max_iterations,
                "allowed_tools": self.agent.allowed_tools,
            },
        })
    }
}

// ── LLM (Anthropic / OpenAI) ─────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "anthropic" or "openai"
    pub provider: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub anthropic_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub temperature: f32,
    /// -1 disables top-k sampling.
    pub top_k: i32,
    /// -1 disables nucleus sampling.
    pub top_p: f32,
    pub max_tokens: u32,
    /// Instance-level stop sequences. When set, callers may not pass their own.
    pub stop_sequences: Option<Vec<String>>,
    pub streaming: bool,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::from_lookup(&|_| None, "")
    }
}

impl LlmConfig {
    fn from_lookup(lookup: Lookup<'_>, p: &str) -> Self {
        Self {
            provider: profiled_or(lookup, p, "LLM_PROVIDER", "anthropic").to_lowercase(),
            anthropic_api_key: profiled_opt(lookup, p, "ANTHROPIC_API_KEY"),
            anthropic_model: profiled_or(lookup, p, "ANTHROPIC_MODEL", "claude-v1.3"),
            anthropic_base_url: profiled_or(lookup, p, "ANTHROPIC_BASE_URL", "https://api.anthropic.com"),
            openai_api_key: profiled_opt(lookup, p, "OPENAI_API_KEY"),
            openai_model: profiled_or(lookup, p, "OPENAI_MODEL", "gpt-3.5-turbo-instruct"),
            openai_base_url: profiled_or(lookup, p, "OPENAI_BASE_URL", "https://api.openai.com"),
            temperature: profiled_parse(lookup, p, "LLM_TEMPERATURE", 0.0),
            top_k: profiled_parse(lookup, p, "LLM_TOP_K", -1),
            top_p: profiled_parse(lookup, p, "LLM_TOP_P", -1.0),
            max_tokens: profiled_parse(lookup, p, "LLM_MAX_TOKENS", 2048),
            stop_sequences: profiled_stop_sequences(lookup, p, "LLM_STOP_SEQUENCES"),
            streaming: profiled_bool(lookup, p, "LLM_STREAMING", false),
            timeout_secs: profiled_parse(lookup, p, "LLM_TIMEOUT_SECS", 60),
            max_retries: profiled_parse(lookup, p, "LLM_MAX_RETRIES", 3),
            retry_base_ms: profiled_parse(lookup, p, "LLM_RETRY_BASE_MS", 500),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    /// API key for the active provider.
    pub fn api_key(&self) -> Option<&str> {
        match self.provider.as_str() {
            "anthropic" | "claude" => self.anthropic_api_key.as_deref(),
            "openai" => self.openai_api_key.as_deref(),
            _ => None,
        }
    }

    /// Model name for the active provider.
    pub fn model(&self) -> &str {
        match self.provider.as_str() {
            "openai" => &self.openai_model,
            _ => &self.anthropic_model,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }
}

// ── Agent ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub max_iterations: usize,
    /// Tool names the agent may dispatch. `None` allows every drawing tool.
    pub allowed_tools: Option<Vec<String>>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_lookup(&|_| None, "")
    }
}

impl AgentConfig {
    fn from_lookup(lookup: Lookup<'_>, p: &str) -> Self {
        Self {
            max_iterations: profiled_parse(lookup, p, "AGENT_MAX_ITERATIONS", 15),
            allowed_tools: profiled_list(lookup, p, "AGENT_ALLOWED_TOOLS"),
        }
    }
}
