//! Error handling for the Pagesmith system

use std::time::Duration;
use thiserror::Error;

/// Result type alias for Pagesmith operations
pub type Result<T> = std::result::Result<T, PagesmithError>;

/// Main error type for the Pagesmith system
#[derive(Error, Debug)]
pub enum PagesmithError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failures at the generation boundary
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Document model errors
    #[error("Document error: {0}")]
    Dom(String),

    /// Conversation log errors
    #[error("Conversation error: {0}")]
    Conversation(String),

    /// Version/snapshot state errors
    #[error("State error: {0}")]
    State(String),

    /// Event bus errors
    #[error("Event bus error: {0}")]
    EventBus(String),

    /// Rejected file input
    #[error("Attachment error: {0}")]
    Attachment(String),

    /// Network/server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("Error: {0}")]
    Generic(String),
}

impl PagesmithError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new document error
    pub fn dom<S: Into<String>>(msg: S) -> Self {
        Self::Dom(msg.into())
    }

    /// Create a new conversation error
    pub fn conversation<S: Into<String>>(msg: S) -> Self {
        Self::Conversation(msg.into())
    }

    /// Create a new state error
    pub fn state<S: Into<String>>(msg: S) -> Self {
        Self::State(msg.into())
    }

    /// Create a new event bus error
    pub fn event_bus<S: Into<String>>(msg: S) -> Self {
        Self::EventBus(msg.into())
    }

    /// Create a new attachment error
    pub fn attachment<S: Into<String>>(msg: S) -> Self {
        Self::Attachment(msg.into())
    }

    /// Create a new server error
    pub fn server<S: Into<String>>(msg: S) -> Self {
        Self::Server(msg.into())
    }

    /// Create a generic error
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Self::Generic(msg.into())
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        match self {
            PagesmithError::Config(_) => false,
            PagesmithError::Generation(e) => !matches!(e, GenerationError::NotConfigured),
            PagesmithError::Dom(_) => true,
            PagesmithError::Conversation(_) => true,
            PagesmithError::State(_) => true,
            PagesmithError::EventBus(_) => true,
            PagesmithError::Attachment(_) => true,
            PagesmithError::Server(_) => true,
            PagesmithError::Io(_) => true,
            PagesmithError::Json(_) => false,
            PagesmithError::Generic(_) => true,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PagesmithError::Config(_) => ErrorSeverity::High,
            PagesmithError::Generation(GenerationError::NotConfigured) => ErrorSeverity::High,
            PagesmithError::Generation(_) => ErrorSeverity::Medium,
            PagesmithError::Dom(_) => ErrorSeverity::Medium,
            PagesmithError::Conversation(_) => ErrorSeverity::Low,
            PagesmithError::State(_) => ErrorSeverity::Medium,
            PagesmithError::EventBus(_) => ErrorSeverity::Medium,
            PagesmithError::Attachment(_) => ErrorSeverity::Low,
            PagesmithError::Server(_) => ErrorSeverity::High,
            PagesmithError::Io(_) => ErrorSeverity::Medium,
            PagesmithError::Json(_) => ErrorSeverity::Low,
            PagesmithError::Generic(_) => ErrorSeverity::Low,
        }
    }
}

/// Failure taxonomy of the generation boundary.
///
/// None of these are retried automatically; the user re-submits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// No credential was configured at startup
    #[error("no API credential configured")]
    NotConfigured,

    /// The call exceeded the fixed ceiling
    #[error("generation timed out after {after:?}")]
    Timeout { after: Duration },

    /// The remote service throttled the request
    #[error("rate limited by the generation service")]
    RateLimited,

    /// The request exceeded the remote payload/token limits
    #[error("request too large for the generation service")]
    RequestTooLarge,

    /// The remote service answered with an error status
    #[error("remote error (status {status}): {message}")]
    Remote { status: u16, message: String },

    /// The request never reached the remote service
    #[error("transport failure: {0}")]
    Transport(String),

    /// A generation is already in flight
    #[error("a generation request is already pending")]
    Busy,
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_conversion() {
        let err: PagesmithError = GenerationError::RateLimited.into();
        assert!(matches!(err, PagesmithError::Generation(GenerationError::RateLimited)));
        assert!(err.is_recoverable());
        assert_eq!(err.severity(), ErrorSeverity::Medium);
    }

    #[test]
    fn test_missing_credential_is_not_recoverable() {
        let err: PagesmithError = GenerationError::NotConfigured.into();
        assert!(!err.is_recoverable());
        assert_eq!(err.severity(), ErrorSeverity::High);
    }
}
