//! Error types

use super::codes::ErrorCode;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Application error with structured error code and details
///
/// This is the primary error type shared by the master process crates:
/// - Standardized error codes via [`ErrorCode`]
/// - Human-readable messages
/// - Optional structured details for logging
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    /// The error code identifying the type of error
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (context for logs)
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Create a new error with the default message for the error code
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            details: None,
        }
    }

    /// Create a new error with a custom message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add a detail entry to this error
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Whether the process must terminate on this error
    pub fn is_fatal(&self) -> bool {
        self.code.is_fatal()
    }

    // ==================== Convenience constructors ====================

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationFailed, msg)
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        let r = resource.into();
        Self::with_message(ErrorCode::NotFound, format!("{} not found", r))
            .with_detail("resource", r)
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalError, msg)
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::DatabaseError, msg)
    }

    /// Create an invalid request error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InvalidRequest, msg)
    }

    /// Create an already exists error
    pub fn already_exists(resource: impl Into<String>) -> Self {
        let r = resource.into();
        Self::with_message(ErrorCode::AlreadyExists, format!("{} already exists", r))
            .with_detail("resource", r)
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::NetworkError, msg)
    }

    /// Create a license refusal
    pub fn terminal_limit(host: impl Into<String>) -> Self {
        let h = host.into();
        Self::with_message(
            ErrorCode::TerminalLimitReached,
            format!("terminal '{}' not permitted by license", h),
        )
        .with_detail("host", h)
    }

    /// Create a terminal not found error
    pub fn terminal_not_found(host: impl Into<String>) -> Self {
        let h = host.into();
        Self::with_message(ErrorCode::TerminalNotFound, format!("no terminal on '{}'", h))
            .with_detail("host", h)
    }

    /// Create a printer not found error
    pub fn printer_not_found(name: impl Into<String>) -> Self {
        let n = name.into();
        Self::with_message(ErrorCode::PrinterNotFound, format!("printer '{}' not found", n))
            .with_detail("printer", n)
    }
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        Self::internal(format!("I/O error: {}", e))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        Self::with_message(ErrorCode::InvalidFormat, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = AppError::new(ErrorCode::ConfigMasterless);
        assert_eq!(err.code, ErrorCode::ConfigMasterless);
        assert_eq!(err.message, "No master configuration available");
        assert!(err.details.is_none());
    }

    #[test]
    fn test_error_with_details() {
        let err = AppError::terminal_limit("10.0.0.7:0");
        assert_eq!(err.code, ErrorCode::TerminalLimitReached);
        let details = err.details.unwrap();
        assert_eq!(details.get("host").unwrap(), "10.0.0.7:0");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AppError = io.into();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.message.contains("gone"));
    }
}
