//! Request and stream-frame formats for the `/v1/complete` API.

use doodle_tool_runtime::{CompletionResponse, LlmError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::backend::CompletionParams;
use crate::sse::SseEvent;

#[derive(Serialize)]
struct CompleteBody<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    top_k: i32,
    top_p: f32,
    max_tokens_to_sample: u32,
    stop_sequences: &'a [String],
    stream: bool,
}

/// JSON body for one request. Extra invocation parameters are merged last.
pub(super) fn request_body(params: &CompletionParams) -> Value {
    let body = CompleteBody {
        model: &params.model,
        prompt: &params.prompt,
        temperature: params.temperature,
        top_k: params.top_k,
        top_p: params.top_p,
        max_tokens_to_sample: params.max_tokens,
        stop_sequences: &params.stop_sequences,
        stream: params.stream,
    };
    let mut value = serde_json::to_value(body).unwrap_or_else(|_| Value::Object(Default::default()));
    if let Value::Object(map) = &mut value {
        for (key, extra) in &params.extra {
            map.insert(key.clone(), extra.clone());
        }
    }
    value
}

#[derive(Deserialize)]
struct ErrorFrame {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type", default)]
    kind: String,
    message: String,
}

/// Interpret one stream frame.
///
/// `completion` frames (and unnamed data frames) carry the cumulative text;
/// `ping` and `[DONE]` carry nothing; `error` frames fail the attempt.
pub(super) fn parse_event(event: &SseEvent) -> Result<Option<CompletionResponse>, LlmError> {
    match event.event.as_deref() {
        Some("completion") | None => {
            let data = event.data.trim();
            if data.is_empty() || data == "[DONE]" {
                return Ok(None);
            }
            serde_json::from_str(data)
                .map(Some)
                .map_err(|e| LlmError::InvalidResponse(format!("bad completion frame: {e}")))
        }
        Some("ping") => Ok(None),
        Some("error") => {
            let message = serde_json::from_str::<ErrorFrame>(&event.data)
                .map(|f| format!("{}: {}", f.error.kind, f.error.message))
                .unwrap_or_else(|_| event.data.clone());
            Err(LlmError::Stream(message))
        }
        Some(other) => {
            trace!(event_type = other, "ignoring unknown SSE event type");
            Ok(None)
        }
    }
}
