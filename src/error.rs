//! Error Handling Infrastructure
//!
//! This module defines the error taxonomy shared by every administrative operation.
//! All errors are structured and map to stable error codes for JSON output.
//!
//! # Error Categories
//! - `Validation`: A required field is blank, or a rendered value failed to coerce
//! - `Authentication`: The connection could not be established (any cause)
//! - `Transport`: A call failed after the connection was established
//! - `Config`: Connection profile file or environment lookup errors
//!
//! A post-mutation read that does not confirm the intended state is *not* an
//! error. It is reported through the `success` flag of the operation output.

use thiserror::Error;

/// Fixed message reported for every connection-time failure
pub const AUTHENTICATION_MESSAGE: &str = "unable to connect with the provided configuration";

/// Main error type for milvusctl operations
#[derive(Error, Debug)]
pub enum MilvusError {
    /// A parameter was blank, missing, or could not be coerced to its declared type
    #[error("Validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    /// Connection construction failed
    ///
    /// Bad URIs, bad credentials and unreachable hosts all collapse into this
    /// variant. The underlying cause is kept for diagnostics only and never
    /// changes the reported message.
    #[error("Authentication failed: unable to connect with the provided configuration")]
    Authentication {
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A mutate or read call failed after a connection was established
    #[error("Transport error during {operation}: {message}")]
    Transport { operation: String, code: Option<i64>, message: String },

    /// Configuration error (profile file unreadable, missing environment variable, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MilvusError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Authentication { .. } => "AUTHENTICATION_ERROR",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Get human-readable error message (no credentials, no native error types)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a validation error naming the offending field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    /// Create an authentication error without a diagnostic cause
    #[must_use]
    pub const fn authentication() -> Self {
        Self::Authentication { source: None }
    }

    /// Create an authentication error that keeps the underlying cause for diagnostics
    pub fn authentication_caused_by(
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Authentication { source: Some(cause.into()) }
    }

    /// Create a transport error for a failed call
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport { operation: operation.into(), code: None, message: message.into() }
    }

    /// Create a transport error carrying the server's status code
    pub fn rejected(operation: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::Transport { operation: operation.into(), code: Some(code), message: message.into() }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Result type alias for milvusctl operations
pub type Result<T> = std::result::Result<T, MilvusError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_codes() {
        assert_eq!(MilvusError::validation("uri", "blank").error_code(), "VALIDATION_ERROR");
        assert_eq!(MilvusError::authentication().error_code(), "AUTHENTICATION_ERROR");
        assert_eq!(MilvusError::transport("drop_database", "boom").error_code(), "TRANSPORT_ERROR");
        assert_eq!(MilvusError::rejected("drop_database", 800, "x").error_code(), "TRANSPORT_ERROR");
        assert_eq!(MilvusError::config_error("test").error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_validation_message_names_field() {
        let err = MilvusError::validation("dimension", "expected an integer, got 'abc'");
        assert!(err.message().contains("'dimension'"));
        assert!(err.message().contains("expected an integer"));
    }

    #[test]
    fn test_authentication_message_is_fixed() {
        let plain = MilvusError::authentication();
        let caused = MilvusError::authentication_caused_by("connection refused (os error 111)");

        assert_eq!(plain.message(), caused.message());
        assert!(caused.message().contains(AUTHENTICATION_MESSAGE));
        assert!(!caused.message().contains("connection refused"));
    }

    #[test]
    fn test_authentication_keeps_cause_for_diagnostics() {
        let err = MilvusError::authentication_caused_by("dns lookup failed");
        let source = err.source().expect("cause should be kept");
        assert_eq!(source.to_string(), "dns lookup failed");

        assert!(MilvusError::authentication().source().is_none());
    }

    #[test]
    fn test_transport_message_includes_operation() {
        let err = MilvusError::rejected("describe_database", 800, "database not found[database=nope]");
        assert!(err.message().contains("describe_database"));
        assert!(err.message().contains("database not found"));
        assert!(matches!(err, MilvusError::Transport { code: Some(800), .. }));
    }
}
