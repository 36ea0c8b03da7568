//! Unified error codes for the Crab master process
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 3xxx: License errors
//! - 4xxx: Order / remote protocol errors
//! - 7xxx: Terminal & printer registry errors
//! - 8xxx: Configuration database errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values so they can be written
/// into protocol status lines and log fields without a lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,

    // ==================== 3xxx: License ====================
    /// Terminal slot quota exhausted
    TerminalLimitReached = 3001,
    /// Clock is earlier than the release date
    ClockBeforeRelease = 3002,

    // ==================== 4xxx: Order / Protocol ====================
    /// Unknown remote command
    UnknownCommand = 4001,
    /// Item code not found in the catalog
    BadItem = 4002,
    /// Detail (addon) code not found in the catalog
    BadDetail = 4003,
    /// Key/value stream violated the order state machine
    ProtocolViolation = 4004,
    /// Order stream carried no committed items
    OrderIncomplete = 4005,
    /// Check not found
    CheckNotFound = 4006,

    // ==================== 7xxx: Terminal & Printer ====================
    /// Terminal not found
    TerminalNotFound = 7001,
    /// Terminal already open on that host
    TerminalAlreadyOpen = 7002,
    /// New sessions are refused
    LoginsDisabled = 7003,
    /// Printer not found
    PrinterNotFound = 7101,
    /// Printer not available
    PrinterNotAvailable = 7102,
    /// Print failed
    PrintFailed = 7103,

    // ==================== 8xxx: Configuration ====================
    /// No master configuration copy is available
    ConfigMasterless = 8001,
    /// Configuration could not be loaded
    ConfigLoadFailed = 8002,
    /// Working copy is stale (reload pending)
    ConfigStale = 8003,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Network error
    NetworkError = 9003,
    /// Timeout error
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
    /// Data path missing or not writable
    DataPathUnavailable = 9006,
    /// Persisted file written by an unsupported format version
    UnsupportedVersion = 9007,
    /// Storage corrupted
    StorageCorrupted = 9403,
    /// Shutdown already in progress
    ShutdownInProgress = 9501,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Get the default message for this error code
    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "Operation completed successfully",
            Self::Unknown => "Unknown error",
            Self::ValidationFailed => "Validation failed",
            Self::NotFound => "Resource not found",
            Self::AlreadyExists => "Resource already exists",
            Self::InvalidRequest => "Invalid request",
            Self::InvalidFormat => "Invalid format",

            Self::TerminalLimitReached => "Terminal not permitted by license",
            Self::ClockBeforeRelease => "System clock is set earlier than the release date",

            Self::UnknownCommand => "Unknown command",
            Self::BadItem => "Item code not found",
            Self::BadDetail => "Detail code not found",
            Self::ProtocolViolation => "Order stream protocol violation",
            Self::OrderIncomplete => "Order has no items",
            Self::CheckNotFound => "Check not found",

            Self::TerminalNotFound => "Terminal not found",
            Self::TerminalAlreadyOpen => "Terminal already open",
            Self::LoginsDisabled => "Logins are disabled",
            Self::PrinterNotFound => "Printer not found",
            Self::PrinterNotAvailable => "Printer not available",
            Self::PrintFailed => "Print failed",

            Self::ConfigMasterless => "No master configuration available",
            Self::ConfigLoadFailed => "Cannot load configuration",
            Self::ConfigStale => "Configuration copy is stale",

            Self::InternalError => "Internal error",
            Self::DatabaseError => "Database error",
            Self::NetworkError => "Network error",
            Self::TimeoutError => "Operation timed out",
            Self::ConfigError => "Configuration error",
            Self::DataPathUnavailable => "Data path is not available",
            Self::UnsupportedVersion => "Unsupported file version",
            Self::StorageCorrupted => "Storage corrupted",
            Self::ShutdownInProgress => "Shutdown already in progress",
        }
    }

    /// 是否为致命错误 (进程必须退出)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ClockBeforeRelease
                | Self::ConfigLoadFailed
                | Self::DataPathUnavailable
                | Self::ShutdownInProgress
        )
    }
}

/// Error returned when converting an unknown u16 into [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),

            // License
            3001 => Ok(ErrorCode::TerminalLimitReached),
            3002 => Ok(ErrorCode::ClockBeforeRelease),

            // Order / Protocol
            4001 => Ok(ErrorCode::UnknownCommand),
            4002 => Ok(ErrorCode::BadItem),
            4003 => Ok(ErrorCode::BadDetail),
            4004 => Ok(ErrorCode::ProtocolViolation),
            4005 => Ok(ErrorCode::OrderIncomplete),
            4006 => Ok(ErrorCode::CheckNotFound),

            // Terminal & Printer
            7001 => Ok(ErrorCode::TerminalNotFound),
            7002 => Ok(ErrorCode::TerminalAlreadyOpen),
            7003 => Ok(ErrorCode::LoginsDisabled),
            7101 => Ok(ErrorCode::PrinterNotFound),
            7102 => Ok(ErrorCode::PrinterNotAvailable),
            7103 => Ok(ErrorCode::PrintFailed),

            // Configuration
            8001 => Ok(ErrorCode::ConfigMasterless),
            8002 => Ok(ErrorCode::ConfigLoadFailed),
            8003 => Ok(ErrorCode::ConfigStale),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::NetworkError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),
            9006 => Ok(ErrorCode::DataPathUnavailable),
            9007 => Ok(ErrorCode::UnsupportedVersion),
            9403 => Ok(ErrorCode::StorageCorrupted),
            9501 => Ok(ErrorCode::ShutdownInProgress),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::TerminalLimitReached.code(), 3001);
        assert_eq!(ErrorCode::BadItem.code(), 4002);
        assert_eq!(ErrorCode::ConfigMasterless.code(), 8001);
        assert_eq!(ErrorCode::StorageCorrupted.code(), 9403);
    }

    #[test]
    fn test_try_from_roundtrip() {
        for code in [
            ErrorCode::Unknown,
            ErrorCode::BadDetail,
            ErrorCode::PrinterNotFound,
            ErrorCode::LoginsDisabled,
            ErrorCode::ConfigStale,
            ErrorCode::ShutdownInProgress,
        ] {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
        assert_eq!(ErrorCode::try_from(4242), Err(InvalidErrorCode(4242)));
    }

    #[test]
    fn test_fatal_codes() {
        assert!(ErrorCode::ConfigLoadFailed.is_fatal());
        assert!(ErrorCode::ClockBeforeRelease.is_fatal());
        assert!(!ErrorCode::BadItem.is_fatal());
        assert!(!ErrorCode::TerminalLimitReached.is_fatal());
    }
}
