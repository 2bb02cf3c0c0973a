//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Default listen port (same as the uvicorn default the upstream automation targets).
const DEFAULT_PORT: u16 = 8000;

/// Default timeout for a single model call.
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 30;

/// Default request body cap: 1 MiB.
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Service configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to bind the HTTP server to.
    pub host: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Model provider settings, including the API key.
    pub llm: LlmConfig,
    /// Upper bound on a single model call.
    pub model_timeout: Duration,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
    /// Directory for rolling log files (stderr only when unset).
    pub log_dir: Option<PathBuf>,
}

impl ServiceConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match get("EMAIL_ASSIST_LLM_BACKEND") {
            Some(raw) => LlmBackend::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "EMAIL_ASSIST_LLM_BACKEND".into(),
                message: format!("unknown backend '{raw}' (expected 'anthropic' or 'openai')"),
            })?,
            None => LlmBackend::Anthropic,
        };

        let key_var = backend.api_key_var();
        let api_key = get(key_var).ok_or_else(|| ConfigError::MissingEnvVar(key_var.into()))?;

        let model = get("EMAIL_ASSIST_MODEL").unwrap_or_else(|| backend.default_model().into());

        let host = get("EMAIL_ASSIST_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or(get("EMAIL_ASSIST_PORT"), "EMAIL_ASSIST_PORT", DEFAULT_PORT)?;
        let timeout_secs = parse_or(
            get("EMAIL_ASSIST_MODEL_TIMEOUT_SECS"),
            "EMAIL_ASSIST_MODEL_TIMEOUT_SECS",
            DEFAULT_MODEL_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "EMAIL_ASSIST_MODEL_TIMEOUT_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }
        let max_body_bytes = parse_or(
            get("EMAIL_ASSIST_MAX_BODY_BYTES"),
            "EMAIL_ASSIST_MAX_BODY_BYTES",
            DEFAULT_MAX_BODY_BYTES,
        )?;

        Ok(Self {
            host,
            port,
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
            },
            model_timeout: Duration::from_secs(timeout_secs),
            max_body_bytes,
            log_dir: get("EMAIL_ASSIST_LOG_DIR").map(PathBuf::from),
        })
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.into(),
                message: format!("'{value}': {e}"),
            }),
        None => Ok(default),
    }
}
