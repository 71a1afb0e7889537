use async_trait::async_trait;
use doodle_core::ConfigError;
use doodle_tool_runtime::{CompletionResponse, LlmError, PromptInput};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// A validated, non-empty API key. Never printed.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// `credential` names the setting the key came from, for the error.
    pub fn new(key: Option<&str>, credential: &str) -> Result<Self, ConfigError> {
        match key.map(str::trim) {
            Some(k) if !k.is_empty() => Ok(Self(k.to_string())),
            _ => Err(ConfigError::MissingCredential(credential.to_string())),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// An HTTP client bound to one credential.
#[derive(Debug, Clone)]
pub struct ApiClient {
    pub http: reqwest::Client,
    pub key: ApiKey,
}

impl ApiClient {
    pub fn new(key: ApiKey) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, key })
    }
}

/// Fully resolved parameters for one backend call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionParams {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    /// -1 disables.
    pub top_k: i32,
    /// -1 disables.
    pub top_p: f32,
    pub max_tokens: u32,
    pub stop_sequences: Vec<String>,
    pub stream: bool,
    /// Merged into the wire body last, so these win over named fields.
    pub extra: Map<String, Value>,
}

/// One completion-style HTTP API.
///
/// `complete_stream` reports every update through `on_update` with the text
/// generated so far (cumulative, never a fragment) and returns the final one.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short identifier, e.g. "anthropic".
    fn name(&self) -> &'static str;

    /// Setting that holds this backend's API key.
    fn credential_name(&self) -> &'static str;

    /// Stop sequences used when nothing else is configured, and appended to
    /// call-site stop sequences.
    fn default_stop_sequences(&self) -> Vec<String>;

    /// Render the request input in the backend's prompt convention.
    fn format_prompt(&self, input: &PromptInput) -> String;

    /// Post-process the final completion text.
    fn finish_text(&self, text: String) -> String {
        text
    }

    async fn complete(
        &self,
        client: &ApiClient,
        params: &CompletionParams,
    ) -> Result<CompletionResponse, LlmError>;

    async fn complete_stream(
        &self,
        client: &ApiClient,
        params: &CompletionParams,
        on_update: &mut (dyn for<'r> FnMut(&'r CompletionResponse) + Send),
    ) -> Result<CompletionResponse, LlmError>;
}

pub(crate) fn network_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Network(format!("request timed out: {e}"))
    } else {
        LlmError::Network(e.to_string())
    }
}

/// Map a non-success status to the matching error. `body` is used as the
/// message, preferring an `{"error": {"message": ...}}` payload.
pub(crate) fn status_error(status: u16, retry_after: Option<u64>, body: &str) -> LlmError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string());

    match status {
        401 | 403 => LlmError::Auth(message),
        429 => LlmError::RateLimited {
            retry_after_secs: retry_after,
        },
        _ => LlmError::Api { status, message },
    }
}

/// Pass a successful response through, or read the body and classify it.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), retry_after, &body))
}
