//! Error types for dunebugger-core

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid message encoding: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),

    #[error("Malformed subject: {0}")]
    MalformedSubject(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Subscribe error: {0}")]
    Subscribe(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Reply handler error: {0}")]
    Handler(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<figment::Error> for CoreError {
    fn from(err: figment::Error) -> Self {
        CoreError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::NotConnected;
        assert_eq!(err.to_string(), "Not connected");
    }

    #[test]
    fn test_missing_field_error() {
        let err = CoreError::MissingField("body");
        assert_eq!(err.to_string(), "Missing field: body");
    }

    #[test]
    fn test_utf8_error_conversion() {
        let bytes = [0xffu8, 0xfe];
        let err: CoreError = std::str::from_utf8(&bytes).unwrap_err().into();
        assert!(matches!(err, CoreError::InvalidEncoding(_)));
    }
}
