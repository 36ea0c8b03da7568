//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
///
/// Categories are determined by the leading digit of the error code:
/// - 0xxx: General errors
/// - 3xxx: License errors
/// - 4xxx: Order / protocol errors
/// - 7xxx: Terminal & printer errors
/// - 8xxx: Configuration errors
/// - 9xxx: System errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// General errors (0xxx)
    General,
    /// License errors (3xxx)
    License,
    /// Order / protocol errors (4xxx)
    Order,
    /// Terminal & printer errors (7xxx)
    Device,
    /// Configuration errors (8xxx)
    Config,
    /// System errors (9xxx)
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            3000..4000 => Self::License,
            4000..5000 => Self::Order,
            7000..8000 => Self::Device,
            8000..9000 => Self::Config,
            _ => Self::System,
        }
    }

    /// Get the string name for this category
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::License => "license",
            Self::Order => "order",
            Self::Device => "device",
            Self::Config => "config",
            Self::System => "system",
        }
    }
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_code() {
        assert_eq!(ErrorCode::Unknown.category(), ErrorCategory::General);
        assert_eq!(ErrorCode::TerminalLimitReached.category(), ErrorCategory::License);
        assert_eq!(ErrorCode::BadItem.category(), ErrorCategory::Order);
        assert_eq!(ErrorCode::PrinterNotFound.category(), ErrorCategory::Device);
        assert_eq!(ErrorCode::ConfigMasterless.category(), ErrorCategory::Config);
        assert_eq!(ErrorCode::DatabaseError.category(), ErrorCategory::System);
    }
}
