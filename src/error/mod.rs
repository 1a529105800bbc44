//! Error types for parley.

use thiserror::Error;

/// Primary error type for all parley operations.
#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown context handler: {0}")]
    UnknownContextHandler(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{kind} \"{name}\" is already registered")]
    DuplicateRegistration { kind: &'static str, name: String },

    #[error("Invalid parameters for context handler {handler}: {message}")]
    InvalidContextParams { handler: String, message: String },

    #[error("No online client found for model {model} after {attempts} attempts")]
    NoClient { model: String, attempts: u32 },

    #[error("Model unavailable: {0}")]
    Unavailable(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Chat turn failed, prior conversation history was not modified: {0}")]
    TurnFailed(#[source] Box<ParleyError>),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Unknown handler, unresolvable tool, duplicate registration. Never retried.
    Configuration,
    /// No reachable client. Retried with backoff.
    Availability,
    ToolExecution,
    /// The model call itself failed mid-turn.
    Turn,
    Serialization,
    Unknown,
}

impl ParleyError {
    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::DuplicateRegistration {
            kind,
            name: name.into(),
        }
    }

    pub fn tool_execution(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_)
            | Self::UnknownContextHandler(_)
            | Self::UnknownTool(_)
            | Self::DuplicateRegistration { .. }
            | Self::InvalidContextParams { .. }
            | Self::ConfigFile(_) => ErrorCategory::Configuration,
            Self::Unavailable(_) | Self::Timeout(_) => ErrorCategory::Availability,
            Self::NoClient { .. } | Self::Stream(_) | Self::TurnFailed(_) => ErrorCategory::Turn,
            Self::ToolExecution { .. } | Self::InvalidArgument(_) => ErrorCategory::ToolExecution,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Io(_) | Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Availability
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_never_retried() {
        let err = ParleyError::UnknownTool("fs/*".into());
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("fs/*"));
    }

    #[test]
    fn unavailable_is_retryable() {
        assert!(ParleyError::Unavailable("cold start".into()).is_retryable());
        assert!(ParleyError::Timeout(100).is_retryable());
    }

    #[test]
    fn turn_failure_mentions_history_preserved() {
        let err = ParleyError::TurnFailed(Box::new(ParleyError::Stream("reset".into())));
        let text = err.to_string();
        assert!(text.contains("history was not modified"));
        assert!(text.contains("reset"));
    }

    #[test]
    fn duplicate_registration_names_the_key() {
        let err = ParleyError::duplicate("Tool", "fs/read");
        assert_eq!(err.to_string(), "Tool \"fs/read\" is already registered");
    }
}
