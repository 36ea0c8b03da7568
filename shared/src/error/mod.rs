//! Unified error system for the Crab master process
//!
//! This module provides:
//! - [`ErrorCode`]: Standardized error codes for all error types
//! - [`ErrorCategory`]: Classification of errors by domain
//! - [`AppError`]: Rich error type with codes, messages, and details
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 3xxx: License errors
//! - 4xxx: Order / remote protocol errors
//! - 7xxx: Terminal & printer errors
//! - 8xxx: Configuration database errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode};
//!
//! let err = AppError::new(ErrorCode::ConfigMasterless);
//! assert_eq!(err.code.code(), 8001);
//!
//! let err = AppError::terminal_limit("192.168.1.20:0");
//! assert!(err.message.contains("not permitted"));
//! ```

mod category;
mod codes;
mod types;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{AppError, AppResult};
