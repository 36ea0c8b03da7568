//! Shared types for the Crab master process
//!
//! Common types used across the workspace crates: error codes and
//! error type, terminal update events, and the check aggregate.

pub mod error;
pub mod message;
pub mod order;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{AppError, AppResult, ErrorCode};
pub use message::{TerminalUpdate, UpdateEvent};
