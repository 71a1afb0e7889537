use async_trait::async_trait;
use doodle_core::{ConfigError, LlmConfig};
use doodle_tool_runtime::{
    CompletionRequest, CompletionResponse, LanguageModel, LlmError, TransportMode,
};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{ApiClient, ApiKey, Backend, CompletionParams};
use crate::delta::DeltaTracker;
use crate::retry::{CallFuture, CallWrapper, RetryPolicy};

/// Sampling and transport settings of one model instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    /// -1 disables.
    pub top_k: i32,
    /// -1 disables.
    pub top_p: f32,
    pub max_tokens: u32,
    /// Instance-level stop sequences. When set, callers may not pass their own.
    pub stop_sequences: Option<Vec<String>>,
    pub mode: TransportMode,
    /// Extra wire parameters, merged into every request.
    pub extra: Map<String, Value>,
}

impl ModelSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.0,
            top_k: -1,
            top_p: -1.0,
            max_tokens: 2048,
            stop_sequences: None,
            mode: TransportMode::Batch,
            extra: Map::new(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            model: config.model().to_string(),
            temperature: config.temperature,
            top_k: config.top_k,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
            stop_sequences: config.stop_sequences.clone(),
            mode: if config.streaming {
                TransportMode::Streaming
            } else {
                TransportMode::Batch
            },
            extra: Map::new(),
        }
    }
}

/// The uniform model adapter: one [`Backend`], batch or streaming transport,
/// retries through a [`CallWrapper`].
///
/// The API key is checked at construction. The two HTTP clients (batch and
/// streaming) are built on first use and reused for the life of the instance.
pub struct CompletionModel {
    backend: Arc<dyn Backend>,
    key: ApiKey,
    settings: ModelSettings,
    wrapper: Arc<dyn CallWrapper>,
    batch_client: OnceCell<ApiClient>,
    streaming_client: OnceCell<ApiClient>,
}

impl CompletionModel {
    pub fn new(
        backend: Arc<dyn Backend>,
        api_key: Option<&str>,
        settings: ModelSettings,
    ) -> Result<Self, ConfigError> {
        let key = ApiKey::new(api_key, backend.credential_name())?;
        Ok(Self {
            backend,
            key,
            settings,
            wrapper: Arc::new(RetryPolicy::default()),
            batch_client: OnceCell::new(),
            streaming_client: OnceCell::new(),
        })
    }

    pub fn with_call_wrapper(mut self, wrapper: Arc<dyn CallWrapper>) -> Self {
        self.wrapper = wrapper;
        self
    }

    pub fn with_extra_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.extra.insert(key.into(), value);
        self
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Stop sequences for one call.
    ///
    /// Call-site sequences get the backend defaults appended. Passing them
    /// while the instance has its own configured is ambiguous and rejected.
    pub fn resolve_stop_sequences(&self, call_site: Option<&[String]>) -> Result<Vec<String>, ConfigError> {
        match (call_site, &self.settings.stop_sequences) {
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousStopSequences),
            (Some(call), None) => {
                let mut stop = call.to_vec();
                stop.extend(self.backend.default_stop_sequences());
                Ok(stop)
            }
            (None, Some(configured)) => Ok(configured.clone()),
            (None, None) => Ok(self.backend.default_stop_sequences()),
        }
    }

    /// Wire parameters without the prompt, as sent for a call with no
    /// call-site stop sequences.
    pub fn invocation_params(&self) -> Map<String, Value> {
        let stop = self
            .settings
            .stop_sequences
            .clone()
            .unwrap_or_else(|| self.backend.default_stop_sequences());
        let mut params = Map::new();
        params.insert("model".into(), json!(self.settings.model));
        params.insert("temperature".into(), json!(self.settings.temperature));
        params.insert("top_k".into(), json!(self.settings.top_k));
        params.insert("top_p".into(), json!(self.settings.top_p));
        params.insert("stop_sequences".into(), json!(stop));
        params.insert("max_tokens_to_sample".into(), json!(self.settings.max_tokens));
        params.insert(
            "stream".into(),
            json!(self.settings.mode == TransportMode::Streaming),
        );
        for (key, value) in &self.settings.extra {
            params.insert(key.clone(), value.clone());
        }
        params
    }

    /// Parameters that identify this instance, for logs and diagnostics.
    pub fn identifying_params(&self) -> Value {
        let mut params = Map::new();
        params.insert("model_name".into(), json!(self.settings.model));
        params.insert("backend".into(), json!(self.backend.name()));
        params.extend(self.invocation_params());
        Value::Object(params)
    }

    async fn client(&self, mode: TransportMode) -> Result<&ApiClient, LlmError> {
        let cell = match mode {
            TransportMode::Batch => &self.batch_client,
            TransportMode::Streaming => &self.streaming_client,
        };
        cell.get_or_try_init(|| async {
            debug!(backend = self.backend.name(), ?mode, "Building HTTP client");
            ApiClient::new(self.key.clone())
        })
        .await
    }

    fn params_for(&self, request: &CompletionRequest, mode: TransportMode) -> Result<CompletionParams, ConfigError> {
        Ok(CompletionParams {
            model: self.settings.model.clone(),
            prompt: self.backend.format_prompt(&request.input),
            temperature: self.settings.temperature,
            top_k: self.settings.top_k,
            top_p: self.settings.top_p,
            max_tokens: self.settings.max_tokens,
            stop_sequences: self.resolve_stop_sequences(request.stop_sequences.as_deref())?,
            stream: mode == TransportMode::Streaming,
            extra: self.settings.extra.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for CompletionModel {
    async fn invoke(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, LlmError> {
        let mode = request.mode.unwrap_or(self.settings.mode);
        let params = self.params_for(&request, mode)?;
        let client = self.client(mode).await?;
        debug!(
            backend = self.backend.name(),
            model = %params.model,
            ?mode,
            prompt_len = params.prompt.len(),
            "Invoking model"
        );

        let response = match mode {
            TransportMode::Batch => {
                let op = || Box::pin(self.backend.complete(client, &params)) as CallFuture<'_>;
                self.wrapper.call(&op, cancel).await?
            }
            TransportMode::Streaming => {
                // Shared by every attempt so a retry never repeats emitted text.
                let tracker = Mutex::new(DeltaTracker::new());
                let (tracker, on_token, params) = (&tracker, &request.on_token, &params);
                let op = move || {
                    Box::pin(async move {
                        let mut on_update = |update: &CompletionResponse| {
                            let delta = tracker.lock().ok().and_then(|mut t| t.update(update));
                            if let (Some(delta), Some(callback)) = (delta, on_token) {
                                callback(&delta);
                            }
                        };
                        self.backend.complete_stream(client, params, &mut on_update).await
                    }) as CallFuture<'_>
                };
                self.wrapper.call(&op, cancel).await?
            }
        };

        debug!(
            completion_len = response.text.len(),
            stop_reason = ?response.stop_reason,
            "Model responded"
        );
        Ok(CompletionResponse {
            text: self.backend.finish_text(response.text),
            stop_reason: response.stop_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::anthropic::AnthropicBackend;
    use crate::providers::openai::OpenAiBackend;

    fn anthropic(stop: Option<Vec<String>>) -> CompletionModel {
        let settings = ModelSettings {
            stop_sequences: stop,
            ..ModelSettings::new("claude-v1.3")
        };
        CompletionModel::new(Arc::new(AnthropicBackend::default()), Some("sk-test"), settings).unwrap()
    }

    #[test]
    fn test_missing_key_fails_at_construction() {
        let err = CompletionModel::new(
            Arc::new(AnthropicBackend::default()),
            None,
            ModelSettings::new("claude-v1.3"),
        )
        .err()
        .unwrap();
        assert_eq!(err, ConfigError::MissingCredential("ANTHROPIC_API_KEY".into()));
    }

    #[test]
    fn test_call_site_stop_gets_defaults_appended() {
        let model = anthropic(None);
        let stop = model
            .resolve_stop_sequences(Some(&["\nObservation:".to_string()]))
            .unwrap();
        assert_eq!(stop, vec!["\nObservation:", "\n\nHuman:"]);
    }

    #[test]
    fn test_configured_and_call_site_stop_is_ambiguous() {
        let model = anthropic(Some(vec!["END".into()]));
        assert_eq!(
            model.resolve_stop_sequences(Some(&["\nObservation:".to_string()])),
            Err(ConfigError::AmbiguousStopSequences)
        );
    }

    #[test]
    fn test_stop_fallbacks() {
        assert_eq!(
            anthropic(Some(vec!["END".into()])).resolve_stop_sequences(None).unwrap(),
            vec!["END"]
        );
        assert_eq!(anthropic(None).resolve_stop_sequences(None).unwrap(), vec!["\n\nHuman:"]);

        let openai = CompletionModel::new(
            Arc::new(OpenAiBackend::default()),
            Some("sk-test"),
            ModelSettings::new("gpt-3.5-turbo-instruct"),
        )
        .unwrap();
        assert!(openai.resolve_stop_sequences(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_stop_rejected_before_any_request() {
        let model = anthropic(Some(vec!["END".into()]));
        let request = CompletionRequest::prompt("hi").with_stop_sequences(vec!["\nObservation:".into()]);
        let err = model.invoke(request, &CancellationToken::new()).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(model.batch_client.get().is_none());
    }

    #[test]
    fn test_identifying_params() {
        let model = anthropic(None).with_extra_param("metadata", json!({"user_id": "u1"}));
        let params = model.identifying_params();
        assert_eq!(params["model_name"], "claude-v1.3");
        assert_eq!(params["backend"], "anthropic");
        assert_eq!(params["max_tokens_to_sample"], 2048);
        assert_eq!(params["stop_sequences"], json!(["\n\nHuman:"]));
        assert_eq!(params["stream"], false);
        assert_eq!(params["metadata"]["user_id"], "u1");
    }

    #[test]
    fn test_settings_from_config() {
        let config = LlmConfig {
            provider: "openai".into(),
            streaming: true,
            max_tokens: 99,
            ..LlmConfig::default()
        };
        let settings = ModelSettings::from_config(&config);
        assert_eq!(settings.model, "gpt-3.5-turbo-instruct");
        assert_eq!(settings.mode, TransportMode::Streaming);
        assert_eq!(settings.max_tokens, 99);
    }

    #[tokio::test]
    async fn test_clients_built_once_per_mode() {
        let model = anthropic(None);
        let first = model.client(TransportMode::Batch).await.unwrap() as *const ApiClient;
        let second = model.client(TransportMode::Batch).await.unwrap() as *const ApiClient;
        assert_eq!(first, second);
        assert!(model.streaming_client.get().is_none());

        let streaming = model.client(TransportMode::Streaming).await.unwrap() as *const ApiClient;
        assert_ne!(first, streaming);
    }
}
