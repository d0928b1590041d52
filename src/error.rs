//! Error types for mailroom.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Safety error: {0}")]
    Safety(#[from] SafetyError),

    #[error("Triage error: {0}")]
    Triage(#[from] TriageError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Input validation and guardrail errors.
///
/// `InjectionDetected` carries a user-facing remediation message in its
/// Display output — it is shown verbatim to the submitter.
#[derive(Debug, thiserror::Error)]
pub enum SafetyError {
    #[error("Invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error(
        "Potential prompt-injection detected ({pattern}). \
         Please remove instruction-like text from the email and resend."
    )]
    InjectionDetected { pattern: String },
}

/// Errors raised during a triage run.
///
/// Every variant is caught at the top of the run worker and surfaced as a
/// single terminal `error` event; the worker then exits without retrying.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("{0}")]
    Safety(#[from] SafetyError),

    #[error("Model response error: {0}")]
    ModelResponse(String),

    #[error("Output validation failed: {0}")]
    OutputValidation(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
