//! Configuration — env-driven, with sensible defaults for local runs.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address, e.g. "0.0.0.0:8080".
    pub bind_addr: String,
    /// SQLite database file path.
    pub db_path: PathBuf,
    /// Idle timeout before the event stream emits a synthetic heartbeat.
    pub heartbeat: Duration,
}

impl ServerConfig {
    /// Read configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let bind_addr =
            std::env::var("MAILROOM_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let db_path = std::env::var("MAILROOM_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/mailroom.db"));
        let heartbeat_secs: u64 = std::env::var("MAILROOM_HEARTBEAT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Self {
            bind_addr,
            db_path,
            heartbeat: Duration::from_secs(heartbeat_secs),
        }
    }
}

/// Parse a backend name ("openai" / "anthropic").
pub fn parse_backend(name: &str) -> Result<LlmBackend, ConfigError> {
    match name.to_lowercase().as_str() {
        "anthropic" => Ok(LlmBackend::Anthropic),
        "openai" => Ok(LlmBackend::OpenAi),
        other => Err(ConfigError::InvalidValue {
            key: "MAILROOM_LLM_BACKEND".to_string(),
            message: format!("unknown backend '{other}' (expected openai or anthropic)"),
        }),
    }
}

/// Build the LLM configuration from the environment.
///
/// `MAILROOM_LLM_BACKEND` selects the provider (default: openai); the
/// matching `*_API_KEY` variable is required. `MAILROOM_MODEL` overrides the
/// per-backend default model.
pub fn llm_config_from_env() -> Result<LlmConfig, ConfigError> {
    let backend_name =
        std::env::var("MAILROOM_LLM_BACKEND").unwrap_or_else(|_| "openai".to_string());
    let backend = parse_backend(&backend_name)?;

    let (key_var, default_model) = match backend {
        LlmBackend::Anthropic => ("ANTHROPIC_API_KEY", "claude-sonnet-4-20250514"),
        LlmBackend::OpenAi => ("OPENAI_API_KEY", "gpt-4o"),
    };

    let api_key = std::env::var(key_var)
        .map_err(|_| ConfigError::MissingEnvVar(key_var.to_string()))?;
    let model =
        std::env::var("MAILROOM_MODEL").unwrap_or_else(|_| default_model.to_string());

    Ok(LlmConfig {
        backend,
        api_key: SecretString::from(api_key),
        model,
    })
}
