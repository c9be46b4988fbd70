//! JSON Output Envelope Types
//!
//! This module defines the structured JSON output format for every milvusctl operation.
//! All operations produce either a `SuccessEnvelope` or an `ErrorEnvelope`.
//!
//! # Output Contract
//! - Success: `{"ok": true, "operation": "...", "data": {...}, "meta": {"execution_ms": ...}}`
//! - Error: `{"ok": false, "operation": "...", "error": {"code": "...", "message": "..."}}`
//!
//! A verification mismatch is still a success envelope; its `data.success` is `false`.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info};

use crate::client::Connector;
use crate::error::{MilvusError, Result};
use crate::executor::{execute, Operation};
use crate::render::RenderContext;

/// Success envelope for operation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Operation that was executed (create_database, list_collections, ...)
    pub operation: String,

    /// Operation-specific output
    pub data: T,

    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(operation: impl Into<String>, data: T, meta: Metadata) -> Self {
        Self { ok: true, operation: operation.into(), data, meta }
    }
}

/// Error envelope for operation failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    /// Operation that was attempted
    pub operation: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(operation: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, operation: operation.into(), error }
    }

    /// Create error envelope from `MilvusError`
    pub fn from_error(operation: impl Into<String>, err: &MilvusError) -> Self {
        Self::new(operation, ErrorInfo::new(err.error_code(), err.message()))
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "VALIDATION_ERROR", "AUTHENTICATION_ERROR")
    pub code: String,

    /// Human-readable error message (no credentials)
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Wall time from render to close, in milliseconds
    pub execution_ms: u64,
}

impl Metadata {
    #[must_use]
    pub const fn new(execution_ms: u64) -> Self {
        Self { execution_ms }
    }
}

/// Either envelope, serialized without a tag
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Success(SuccessEnvelope<serde_json::Value>),
    Error(ErrorEnvelope),
}

impl Envelope {
    /// Wrap an operation result, logging the outcome
    pub fn from_result<T: Serialize>(operation: &str, result: Result<T>, execution_ms: u64) -> Self {
        let data = result.and_then(|output| {
            serde_json::to_value(output)
                .map_err(|e| MilvusError::transport(operation, format!("failed to encode output: {e}")))
        });

        match data {
            Ok(data) => {
                info!(operation, execution_ms, "Operation succeeded");
                Self::Success(SuccessEnvelope::new(operation, data, Metadata::new(execution_ms)))
            }
            Err(err) => {
                error!(operation, code = err.error_code(), error = %err, "Operation failed");
                Self::Error(ErrorEnvelope::from_error(operation, &err))
            }
        }
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Execute an operation and wrap its outcome in an envelope
pub async fn execute_reported<O, K>(operation: &O, connector: &K, ctx: &RenderContext) -> Envelope
where
    O: Operation,
    K: Connector,
{
    let start = Instant::now();
    let result = execute(operation, connector, ctx).await;
    let execution_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    Envelope::from_result(O::NAME, result, execution_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_serialization() {
        let envelope = SuccessEnvelope::new("list_databases", json!({"dbNames": ["default"]}), Metadata::new(42));

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""ok":true"#));
        assert!(json.contains(r#""operation":"list_databases""#));
        assert!(json.contains(r#""execution_ms":42"#));
        assert!(json.contains(r#""dbNames":["default"]"#));
    }

    #[test]
    fn test_error_envelope_serialization() {
        let envelope = ErrorEnvelope::new(
            "create_database",
            ErrorInfo::new("AUTHENTICATION_ERROR", "Authentication failed"),
        );

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""ok":false"#));
        assert!(json.contains(r#""operation":"create_database""#));
        assert!(json.contains(r#""code":"AUTHENTICATION_ERROR""#));
        assert!(!json.contains("meta"));
    }

    #[test]
    fn test_error_envelope_from_milvus_error() {
        let err = MilvusError::validation("name", "must not be blank");
        let envelope = ErrorEnvelope::from_error("drop_database", &err);

        assert!(!envelope.ok);
        assert_eq!(envelope.operation, "drop_database");
        assert_eq!(envelope.error.code, "VALIDATION_ERROR");
        assert!(envelope.error.message.contains("must not be blank"));
    }

    #[test]
    fn test_from_result_success() {
        let envelope = Envelope::from_result("drop_database", Ok(json!({"success": false})), 7);
        assert!(envelope.is_ok());

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["data"]["success"], false);
        assert_eq!(value["meta"]["execution_ms"], 7);
    }

    #[test]
    fn test_from_result_error() {
        let result: Result<()> = Err(MilvusError::authentication());
        let envelope = Envelope::from_result("list_databases", result, 3);
        assert!(!envelope.is_ok());

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"]["code"], "AUTHENTICATION_ERROR");
        assert!(value.get("meta").is_none());
    }
}
