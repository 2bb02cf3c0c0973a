//! Error types for Email Assist.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Request pipeline errors.
///
/// Every variant maps onto exactly one HTTP status class: decode failures are
/// client errors (400), validation failures are 422, everything that involves
/// the model collaborator is a server error (500).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Request body is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    #[error("Missing required field(s): {}", missing.join(", "))]
    Validation {
        missing: Vec<&'static str>,
        /// Leading slice of the received payload, echoed back for debugging.
        received: String,
    },

    #[error("Model call failed: {0}")]
    Model(#[from] LlmError),

    #[error("Model call timed out after {0:?}")]
    ModelTimeout(Duration),

    #[error("Model returned an empty response")]
    EmptyModelResponse,
}

impl PipelineError {
    /// Short machine-readable label, used in logs and observer events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Validation { .. } => "validation",
            Self::Model(_) | Self::ModelTimeout(_) | Self::EmptyModelResponse => "upstream_model",
        }
    }
}
