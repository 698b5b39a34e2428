//! Error types for the diagnosis bot.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Channel (transport) errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Authentication failed for channel {name}: {reason}")]
    AuthFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Failures of the scoring classifier. The dialogue engine treats every
/// variant the same way: apologise and keep the session untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifierError {
    #[error("Classifier unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Classifier timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Classifier output could not be parsed into a rating")]
    Unparsable,
}

impl From<LlmError> for ClassifierError {
    fn from(e: LlmError) -> Self {
        Self::Unavailable {
            reason: e.to_string(),
        }
    }
}

/// Question catalog validation and loading errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog has no questions")]
    Empty,

    #[error("Choice question {index} has no options")]
    NoOptions { index: usize },

    #[error("Choice question {index} repeats option value {value}")]
    DuplicateValue { index: usize, value: u32 },

    #[error("Catalog max score {total} exceeds the limit of {limit}")]
    ScoreTooLarge { total: u64, limit: u32 },

    #[error("Question {index} in the {list} list has the wrong kind")]
    WrongKind { list: &'static str, index: usize },

    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
