use thiserror::Error;

/// Fatal configuration problems. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing credential: {0} is not set")]
    MissingCredential(String),

    #[error("\"stop_sequences\" passed at the call site while the model already has default stop sequences configured")]
    AmbiguousStopSequences,

    #[error("unknown LLM provider: '{0}'")]
    UnknownProvider(String),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}
