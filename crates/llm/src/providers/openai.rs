//! OpenAI text completions (`/v1/completions`).
//!
//! Streaming chunks carry only new text; they are accumulated so updates
//! reach the caller as cumulative text like every other backend.

use async_trait::async_trait;
use doodle_tool_runtime::{CompletionResponse, LlmError, PromptInput, Role};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::{check_status, network_error, ApiClient, Backend, CompletionParams};
use crate::sse::SseDecoder;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiBackend {
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, client: &ApiClient, params: &CompletionParams) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/completions", self.base_url);
        debug!(model = %params.model, url = %url, stream = params.stream, "OpenAI request");
        client
            .http
            .post(url)
            .header("Authorization", format!("Bearer {}", client.key.expose()))
            .header("Content-Type", "application/json")
            .json(&request_body(params))
    }
}

impl Default for OpenAiBackend {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// top_k has no equivalent here; disabled values are left out.
fn request_body(params: &CompletionParams) -> Value {
    let mut body = json!({
        "model": params.model,
        "prompt": params.prompt,
        "temperature": params.temperature,
        "max_tokens": params.max_tokens,
        "stream": params.stream,
    });
    if params.top_p >= 0.0 {
        body["top_p"] = json!(params.top_p);
    }
    if !params.stop_sequences.is_empty() {
        body["stop"] = json!(params.stop_sequences);
    }
    if let Value::Object(map) = &mut body {
        for (key, extra) in &params.extra {
            map.insert(key.clone(), extra.clone());
        }
    }
    body
}

#[derive(Deserialize)]
struct CompletionChunk {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    text: String,
    #[serde(default)]
    finish_reason: Option<String>,
}

fn parse_chunk(data: &str) -> Result<Option<Choice>, LlmError> {
    let chunk: CompletionChunk =
        serde_json::from_str(data).map_err(|e| LlmError::InvalidResponse(format!("bad completion chunk: {e}")))?;
    Ok(chunk.choices.into_iter().next())
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn credential_name(&self) -> &'static str {
        "OPENAI_API_KEY"
    }

    fn default_stop_sequences(&self) -> Vec<String> {
        Vec::new()
    }

    fn format_prompt(&self, input: &PromptInput) -> String {
        match input {
            PromptInput::Text(text) => text.clone(),
            PromptInput::Messages(messages) => {
                let mut prompt = messages
                    .iter()
                    .map(|m| match m.role {
                        Role::System => m.content.clone(),
                        Role::User => format!("User: {}", m.content),
                        Role::Assistant => format!("Assistant: {}", m.content),
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                prompt.push_str("\nAssistant:");
                prompt
            }
        }
    }

    async fn complete(
        &self,
        client: &ApiClient,
        params: &CompletionParams,
    ) -> Result<CompletionResponse, LlmError> {
        let response = self.request(client, params).send().await.map_err(network_error)?;
        let body = check_status(response)
            .await?
            .text()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let choice = parse_chunk(&body)?
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;
        Ok(CompletionResponse {
            text: choice.text,
            stop_reason: choice.finish_reason,
        })
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
        let mut current = CompletionResponse::default();
        let mut received = false;

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| LlmError::Stream(e.to_string()))?;
            for event in decoder.push(&chunk) {
                let data = event.data.trim();
                if data == "[DONE]" {
                    return Ok(current);
                }
                if data.is_empty() {
                    continue;
                }
                let Some(choice) = parse_chunk(data)? else {
                    continue;
                };
                received = true;
                current.text.push_str(&choice.text);
                current.stop_reason = choice.finish_reason;
                on_update(&current);
                if current.stop_reason.is_some() {
                    return Ok(current);
                }
            }
        }

        if received {
            Ok(current)
        } else {
            Err(LlmError::Stream("stream ended without a completion".to_string()))
        }
    }
}
