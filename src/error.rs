//! Error types for the nutrition agents

use thiserror::Error;

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AgentsError>;

/// Main error type.
///
/// Configuration, transport and application failures are kept apart so that
/// callers (and the model, via failed tool results) can tell an unreachable
/// endpoint from one that answered with an error. A tripped input guardrail is
/// not surfaced through this type by the runner; see [`crate::result::RunOutcome`].
#[derive(Debug, Error)]
pub enum AgentsError {
    /// Missing or invalid configuration, raised before any run starts
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Remote endpoint unreachable, timed out, or returned an undecodable reply
    #[error("Transport error: {message}")]
    TransportError { message: String },

    /// Remote endpoint answered but reported a failure in its payload
    #[error("Application error: {message}")]
    ApplicationError { message: String },

    /// Error from the OpenAI API
    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    /// Maximum turns exceeded
    #[error("Maximum turns exceeded: {max_turns}")]
    MaxTurnsExceeded { max_turns: usize },

    /// Input guardrail triggered
    #[error("Input guardrail '{guardrail}' triggered: {message}")]
    InputGuardrailTriggered { guardrail: String, message: String },

    /// Tool execution error
    #[error("Tool execution error: {message}")]
    ToolExecutionError { message: String },

    /// Model behavior error
    #[error("Model behavior error: {message}")]
    ModelBehaviorError { message: String },

    /// User error
    #[error("User error: {message}")]
    UserError { message: String },

    /// Session error
    #[error("Session error: {0}")]
    SessionError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Prompt asset could not be parsed
    #[error("Prompt asset error: {0}")]
    PromptAssetError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl AgentsError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportError {
            message: message.into(),
        }
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self::ApplicationError {
            message: message.into(),
        }
    }

    /// True for failures worth retrying: the request never got a real answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::TransportError { .. })
    }
}

// The search endpoint carries its credential in the query string, so the URL
// is stripped before the error can reach a log line or the model.
impl From<reqwest::Error> for AgentsError {
    fn from(err: reqwest::Error) -> Self {
        Self::TransportError {
            message: err.without_url().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentsError::MaxTurnsExceeded { max_turns: 10 };
        assert_eq!(err.to_string(), "Maximum turns exceeded: 10");

        let err = AgentsError::InputGuardrailTriggered {
            guardrail: "food_topic_guardrail".to_string(),
            message: "not about food".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Input guardrail 'food_topic_guardrail' triggered: not about food"
        );

        let err = AgentsError::config("OPENAI_API_KEY is not set");
        assert_eq!(
            err.to_string(),
            "Configuration error: OPENAI_API_KEY is not set"
        );
    }

    #[test]
    fn test_transport_and_application_are_distinct() {
        let transport = AgentsError::transport("connection refused");
        let application = AgentsError::application("invalid API key");

        assert!(transport.is_transport());
        assert!(!application.is_transport());
        assert!(matches!(application, AgentsError::ApplicationError { .. }));
    }

    #[test]
    fn test_error_from_openai() {
        let openai_err = async_openai::error::OpenAIError::InvalidArgument("test".to_string());
        let agents_err: AgentsError = openai_err.into();
        assert!(matches!(agents_err, AgentsError::OpenAIError(_)));
    }

    #[test]
    fn test_error_from_toml() {
        let parse_err = toml::from_str::<toml::Value>("name = ").unwrap_err();
        let agents_err: AgentsError = parse_err.into();
        assert!(matches!(agents_err, AgentsError::PromptAssetError(_)));
    }
}
