//! Anthropic text completions (`/v1/complete`).
//!
//! Prompts alternate `\n\nHuman:` and `\n\nAssistant:` turns; streaming
//! responses are SSE `completion` frames whose `completion` field holds the
//! whole text generated so far.

mod wire;


use async_trait::async_trait;
use doodle_tool_runtime::{CompletionResponse, LlmError, PromptInput, Role};
use futures::StreamExt;
use tracing::debug;

use crate::backend::{check_status, network_error, ApiClient, Backend, CompletionParams};
use crate::sse::SseDecoder;

pub const HUMAN_PROMPT: &str = "\n\nHuman:";
pub const AI_PROMPT: &str = "\n\nAssistant:";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    base_url: String,
}

impl AnthropicBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, client: &ApiClient, params: &CompletionParams) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/complete", self.base_url);
        debug!(model = %params.model, url = %url, stream = params.stream, "Anthropic request");
        client
            .http
            .post(url)
            .header("x-api-key", client.key.expose())
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&wire::request_body(params))
    }
}

impl Default for AnthropicBackend {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

fn turn_prefix(role: Role) -> &'static str {
    match role {
        Role::User => HUMAN_PROMPT,
        Role::Assistant => AI_PROMPT,
        Role::System => "",
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn credential_name(&self) -> &'static str {
        "ANTHROPIC_API_KEY"
    }

    fn default_stop_sequences(&self) -> Vec<String> {
        vec![HUMAN_PROMPT.to_string()]
    }

    fn format_prompt(&self, input: &PromptInput) -> String {
        match input {
            PromptInput::Text(text) => format!("{} {}{}", HUMAN_PROMPT, text, AI_PROMPT),
            PromptInput::Messages(messages) => {
                let mut prompt: String = messages
                    .iter()
                    .map(|m| format!("{} {}", turn_prefix(m.role), m.content))
                    .collect();
                prompt.push_str(AI_PROMPT);
                prompt
            }
        }
    }

    /// Only the first assistant turn counts when the model runs on into more.
    fn finish_text(&self, text: String) -> String {
        match text.split_once(AI_PROMPT) {
            Some((first, _)) => first.to_string(),
            None => text,
        }
    }

    async fn complete(
        &self,
        client: &ApiClient,
        params: &CompletionParams,
    ) -> Result<CompletionResponse, LlmError> {
        let response = self.request(client, params).send().await.map_err(network_error)?;
        let response = check_status(response).await?;
        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    async fn complete_stream(
        &self,
        client: &ApiClient,
        params: &CompletionParams,
        on_update: &mut (dyn for<'r> FnMut(&'r CompletionResponse) + Send),
    ) -> Result<CompletionResponse, LlmError> {
        let response = self.request(client, params).send().await.map_err(network_error)?;
        let response = check_status(response).await?;

        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut last: Option<CompletionResponse> = None;

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| LlmError::Stream(e.to_string()))?;
            for event in decoder.push(&chunk) {
                if let Some(update) = wire::parse_event(&event)? {
                    on_update(&update);
                    if update.stop_reason.is_some() {
                        return Ok(update);
                    }
                    last = Some(update);
                }
            }
        }
        if let Some(event) = decoder.finish() {
            if let Some(update) = wire::parse_event(&event)? {
                on_update(&update);
                last = Some(update);
            }
        }

        last.ok_or_else(|| LlmError::Stream("stream ended without a completion".to_string()))
    }
}
