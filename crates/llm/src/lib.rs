pub mod adapter;
pub mod backend;
pub mod delta;
pub mod providers;
pub mod retry;
pub mod sse;

pub use adapter::{CompletionModel, ModelSettings};
pub use backend::{ApiClient, ApiKey, Backend, CompletionParams};
pub use delta::DeltaTracker;
pub use providers::anthropic::AnthropicBackend;
pub use providers::openai::OpenAiBackend;
pub use providers::{create_backend, create_model};
pub use retry::{CallFuture, CallWrapper, NoRetry, RetryPolicy};
