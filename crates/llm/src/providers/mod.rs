pub mod anthropic;
pub mod openai;

use doodle_core::{ConfigError, LlmConfig};
use std::sync::Arc;
use tracing::info;

use crate::adapter::{CompletionModel, ModelSettings};
use crate::backend::Backend;
use crate::retry::RetryPolicy;

/// Backend for a provider name from config.
pub fn create_backend(config: &LlmConfig) -> Result<Arc<dyn Backend>, ConfigError> {
    match config.provider.as_str() {
        "anthropic" | "claude" => Ok(Arc::new(anthropic::AnthropicBackend::new(
            config.anthropic_base_url.clone(),
        ))),
        "openai" => Ok(Arc::new(openai::OpenAiBackend::new(config.openai_base_url.clone()))),
        other => Err(ConfigError::UnknownProvider(other.to_string())),
    }
}

/// Create the configured model, with retries per config.
pub fn create_model(config: &LlmConfig) -> Result<CompletionModel, ConfigError> {
    let backend = create_backend(config)?;
    let model = CompletionModel::new(backend, config.api_key(), ModelSettings::from_config(config))?
        .with_call_wrapper(Arc::new(RetryPolicy::from_config(config)));
    info!(
        backend = model.backend_name(),
        model = %model.settings().model,
        mode = ?model.settings().mode,
        "Language model ready"
    );
    Ok(model)
}
