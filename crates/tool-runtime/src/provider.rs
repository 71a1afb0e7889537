use async_trait::async_trait;
use doodle_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A chat message for backends that take turn-structured input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// What the model is asked to continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptInput {
    /// A single rendered prompt, sent as one user turn.
    Text(String),
    Messages(Vec<Message>),
}

/// How the adapter talks to its backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Batch,
    Streaming,
}

/// Receives each newly generated fragment while streaming.
pub type TokenCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// One call to a language model.
///
/// Sampling settings live on the model instance; a request carries the input
/// plus per-call options.
#[derive(Clone)]
pub struct CompletionRequest {
    pub input: PromptInput,
    /// Call-site stop sequences. Rejected when the model instance already
    /// has its own configured.
    pub stop_sequences: Option<Vec<String>>,
    /// Overrides the instance's transport mode for this call.
    pub mode: Option<TransportMode>,
    pub on_token: Option<TokenCallback>,
}

impl CompletionRequest {
    pub fn prompt(text: impl Into<String>) -> Self {
        Self::new(PromptInput::Text(text.into()))
    }

    pub fn messages(messages: Vec<Message>) -> Self {
        Self::new(PromptInput::Messages(messages))
    }

    fn new(input: PromptInput) -> Self {
        Self {
            input,
            stop_sequences: None,
            mode: None,
            on_token: None,
        }
    }

    pub fn with_stop_sequences(mut self, stop: Vec<String>) -> Self {
        self.stop_sequences = Some(stop);
        self
    }

    pub fn with_mode(mut self, mode: TransportMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_token_callback(mut self, callback: TokenCallback) -> Self {
        self.on_token = Some(callback);
        self
    }
}

impl fmt::Debug for CompletionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionRequest")
            .field("input", &self.input)
            .field("stop_sequences", &self.stop_sequences)
            .field("mode", &self.mode)
            .field("on_token", &self.on_token.is_some())
            .finish()
    }
}

/// Generated text plus the backend's stop reason, if it gave one.
///
/// While streaming, each update is also delivered in this shape with `text`
/// holding everything generated so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    #[serde(rename = "completion")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl CompletionResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            stop_reason: None,
        }
    }

    pub fn with_stop_reason(mut self, reason: impl Into<String>) -> Self {
        self.stop_reason = Some(reason.into());
        self
    }
}

/// Uniform call interface to a language-model backend.
///
/// This trait lives in tool-runtime because it's defined by the consumer
/// (the orchestrator). Implementations live in crates/llm.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn invoke(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, LlmError>;

    /// Model name for logging/debugging.
    fn model_name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Rate limited by the backend")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Cancelled")]
    Cancelled,
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<LlmError> },
}

impl LlmError {
    /// Whether repeating the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Network(_)
            | LlmError::Stream(_)
            | LlmError::Timeout(_)
            | LlmError::RateLimited { .. } => true,
            LlmError::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            LlmError::Configuration(_)
            | LlmError::InvalidResponse(_)
            | LlmError::Auth(_)
            | LlmError::Cancelled
            | LlmError::RetriesExhausted { .. } => false,
        }
    }

    /// Server-requested wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// Fatal configuration problem, possibly wrapped by the retry layer.
    pub fn is_configuration(&self) -> bool {
        match self {
            LlmError::Configuration(_) => true,
            LlmError::RetriesExhausted { last, .. } => last.is_configuration(),
            _ => false,
        }
    }
}

/// Scripted model for testing the orchestrator without real API calls.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Returns queued outputs in order; once the queue is empty every call
    /// returns the fallback text (if any) or an error.
    pub struct ScriptedModel {
        responses: Mutex<VecDeque<Result<String, LlmError>>>,
        fallback: Option<String>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedModel {
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                fallback: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        /// A model that answers every call with the same text.
        pub fn repeating(text: &str) -> Self {
            Self {
                fallback: Some(text.to_string()),
                ..Self::new()
            }
        }

        /// Queue a text response for the next unanswered call.
        pub fn queue_text(&self, text: &str) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Ok(text.to_string()));
        }

        /// Queue an error for the next unanswered call.
        pub fn queue_error(&self, error: LlmError) {
            self.responses.lock().unwrap().push_back(Err(error));
        }

        /// Every request received so far.
        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }

        /// Rendered prompts received so far.
        pub fn prompts(&self) -> Vec<String> {
            self.requests()
                .into_iter()
                .filter_map(|r| match r.input {
                    PromptInput::Text(text) => Some(text),
                    PromptInput::Messages(_) => None,
                })
                .collect()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Default for ScriptedModel {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn invoke(
            &self,
            request: CompletionRequest,
            cancel: &CancellationToken,
        ) -> Result<CompletionResponse, LlmError> {
            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            self.requests.lock().unwrap().push(request);
            let next = self.responses.lock().unwrap().pop_front();
            match next {
                Some(Ok(text)) => Ok(CompletionResponse::new(text)),
                Some(Err(e)) => Err(e),
                None => match &self.fallback {
                    Some(text) => Ok(CompletionResponse::new(text.clone())),
                    None => Err(LlmError::InvalidResponse("script exhausted".to_string())),
                },
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::Network("reset".into()).is_retryable());
        assert!(LlmError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(LlmError::RateLimited { retry_after_secs: None }.is_retryable());
        assert!(LlmError::Api { status: 503, message: String::new() }.is_retryable());
        assert!(LlmError::Api { status: 408, message: String::new() }.is_retryable());
        assert!(!LlmError::Api { status: 400, message: String::new() }.is_retryable());
        assert!(!LlmError::Auth("bad key".into()).is_retryable());
        assert!(!LlmError::Cancelled.is_retryable());
        assert!(!LlmError::from(ConfigError::AmbiguousStopSequences).is_retryable());
    }

    #[test]
    fn test_retry_after() {
        let err = LlmError::RateLimited { retry_after_secs: Some(7) };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(LlmError::Network("x".into()).retry_after(), None);
    }

    #[test]
    fn test_configuration_seen_through_retry_wrapper() {
        let err = LlmError::RetriesExhausted {
            attempts: 2,
            last: Box::new(LlmError::Configuration(ConfigError::MissingCredential(
                "ANTHROPIC_API_KEY".into(),
            ))),
        };
        assert!(err.is_configuration());
    }

    #[test]
    fn test_completion_response_wire_names() {
        let parsed: CompletionResponse =
            serde_json::from_str(r#"{"completion":" Hello","stop_reason":"stop_sequence"}"#).unwrap();
        assert_eq!(parsed.text, " Hello");
        assert_eq!(parsed.stop_reason.as_deref(), Some("stop_sequence"));

        let partial: CompletionResponse = serde_json::from_str(r#"{"completion":"Hi"}"#).unwrap();
        assert_eq!(partial.stop_reason, None);
    }

    #[test]
    fn test_request_builders() {
        let req = CompletionRequest::prompt("hi")
            .with_stop_sequences(vec!["\nObservation:".into()])
            .with_mode(TransportMode::Streaming);
        assert_eq!(req.input, PromptInput::Text("hi".into()));
        assert_eq!(req.mode, Some(TransportMode::Streaming));
        assert!(format!("{:?}", req).contains("on_token: false"));
    }
}
