use crate::transport::TransportError;
use thiserror::Error;

/// Structured error context for configuration failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Configuration key that caused the error (e.g., "session.temperature")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "session_builder", "yaml_config")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for intelisys.
///
/// Variants fall into two groups: transient failures of a single attempt
/// ([`Error::Request`], [`Error::Transport`], [`Error::JsonParse`]) that the
/// response pipeline retries, and everything else, which surfaces immediately.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported provider: '{name}'. {}\nSupported providers are: {}", suggestion_text(.suggestion), crate::provider::Provider::supported_names().join(", "))]
    UnsupportedProvider {
        name: String,
        suggestion: Option<String>,
    },

    #[error("Secret resolution failed for '{field}' in item '{item}' (vault '{vault}'): {message}")]
    SecretResolution {
        item: String,
        field: String,
        vault: String,
        message: String,
    },

    #[error("Request error{}: {message}", format_status(.status))]
    Request {
        message: String,
        status: Option<u16>,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("JSON parsing error: {message}")]
    JsonParse { message: String, raw: String },

    #[error("Max retries reached after {attempts} attempts. Last error: {source}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Session is busy: another request is already in flight")]
    SessionBusy,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn suggestion_text(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!("Did you mean '{}'?", s),
        None => "Please check the spelling and try again.".to_string(),
    }
}

fn format_status(status: &Option<u16>) -> String {
    match status {
        Some(s) => format!(" (HTTP {})", s),
        None => String::new(),
    }
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn request(msg: impl Into<String>) -> Self {
        Error::Request {
            message: msg.into(),
            status: None,
        }
    }

    pub fn request_with_status(msg: impl Into<String>, status: u16) -> Self {
        Error::Request {
            message: msg.into(),
            status: Some(status),
        }
    }

    pub fn json_parse(msg: impl Into<String>, raw: impl Into<String>) -> Self {
        Error::JsonParse {
            message: msg.into(),
            raw: raw.into(),
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::configuration_with_context(msg, ErrorContext::new())
    }

    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// Missing credentials, bad templates and invalid configuration fail the
    /// same way every time, so only request, transport and parse failures
    /// qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Request { .. } | Error::Transport(_) | Error::JsonParse { .. }
        )
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }

    /// The error that ended the final attempt, looking through
    /// [`Error::MaxRetriesExceeded`].
    pub fn last_cause(&self) -> &Error {
        match self {
            Error::MaxRetriesExceeded { source, .. } => source.last_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(Error::request("boom").is_retryable());
        assert!(Error::json_parse("bad", "{").is_retryable());
        assert!(!Error::InvalidTemplate("x".into()).is_retryable());
        assert!(!Error::SessionBusy.is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::SecretResolution {
            item: "OPEN-AI".into(),
            field: "Cursor".into(),
            vault: "API".into(),
            message: "not found".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_unsupported_provider_message() {
        let err = Error::UnsupportedProvider {
            name: "opnai".into(),
            suggestion: Some("openai".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("Unsupported provider: 'opnai'"));
        assert!(msg.contains("Did you mean 'openai'?"));
        assert!(msg.contains("anthropic"));
    }

    #[test]
    fn test_max_retries_keeps_cause() {
        let err = Error::MaxRetriesExceeded {
            attempts: 3,
            source: Box::new(Error::request_with_status("overloaded", 529)),
        };
        assert!(err.to_string().contains("after 3 attempts"));
        assert!(matches!(
            err.last_cause(),
            Error::Request {
                status: Some(529),
                ..
            }
        ));
    }

    #[test]
    fn test_configuration_context_display() {
        let err = Error::configuration_with_context(
            "temperature out of range",
            ErrorContext::new()
                .with_field_path("session.temperature")
                .with_source("session_builder"),
        );
        let msg = err.to_string();
        assert!(msg.contains("field: session.temperature"));
        assert!(msg.contains("source: session_builder"));
        assert!(err.context().is_some());
    }
}
