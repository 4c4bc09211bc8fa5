//! Error enums shared across the workspace.

use thiserror::Error;

/// Errors from the record store (used by the trait definition in
/// ideaforge-core and its implementations in ideaforge-infra).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store request failed ({status}): {body}")]
    Request { status: u16, body: String },

    #[error("record store transport error: {0}")]
    Transport(String),

    #[error("record store returned no row")]
    EmptyReply,

    #[error("malformed record payload: {0}")]
    Deserialization(String),

    #[error("record store is not configured: {0}")]
    NotConfigured(String),
}

/// Errors from LLM provider operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("malformed provider response: {0}")]
    Deserialization(String),
}

/// Errors from prompt-asset loading.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to read prompt asset '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from field generation.
///
/// `OutputInvalid` carries the diagnostic payload of the failed attempt
/// sequence so callers can surface what was asked and what came back.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("chat model is not available; start the model backend and retry")]
    ProviderUnavailable,

    #[error("model output failed validation for field '{field_key}'")]
    OutputInvalid {
        field_key: String,
        last_prompt: String,
        last_output: Option<String>,
        validation_errors: Vec<String>,
    },

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// Errors from workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("unknown field key: '{0}'")]
    UnknownFieldKey(String),

    #[error("discovery document v{0} was not found")]
    VersionNotFound(u32),

    #[error("value for field '{field_key}' must be a {expected}")]
    InvalidValue {
        field_key: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Generate(#[from] GenerateError),
}
