//! Shared enums for the check aggregate

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Order Type
// ============================================================================

/// 账单类型 (呼叫中心订单使用)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// 堂食
    #[default]
    DineIn,
    /// 外带
    Takeout,
    /// 外送
    Delivery,
    /// 自取
    Pickup,
}

impl FromStr for OrderType {
    type Err = ();

    /// Call-center systems send free-form type names; only the leading
    /// letter is significant.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('D') if s.trim().eq_ignore_ascii_case("dinein") => Ok(Self::DineIn),
            Some('D') => Ok(Self::Delivery),
            Some('T') => Ok(Self::Takeout),
            Some('P') => Ok(Self::Pickup),
            Some('H') => Ok(Self::DineIn),
            _ => Err(()),
        }
    }
}

// ============================================================================
// Check Status
// ============================================================================

/// 账单状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    #[default]
    Open,
    Closed,
    Voided,
}

// ============================================================================
// Qualifier
// ============================================================================

/// 附加项修饰词 (AddonQualifier)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Qualifier {
    No,
    Lite,
    Extra,
    Double,
    Side,
    LeftHalf,
    RightHalf,
    /// Unrecognised qualifier text is kept verbatim
    Other(String),
}

impl FromStr for Qualifier {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let q = match s.trim().to_ascii_lowercase().as_str() {
            "no" | "none" | "without" => Self::No,
            "lite" | "light" => Self::Lite,
            "extra" | "xtra" => Self::Extra,
            "double" | "dbl" => Self::Double,
            "side" | "on side" | "onside" => Self::Side,
            "left" | "lefthalf" | "left half" => Self::LeftHalf,
            "right" | "righthalf" | "right half" => Self::RightHalf,
            _ => Self::Other(s.trim().to_string()),
        };
        Ok(q)
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::No => write!(f, "NO"),
            Self::Lite => write!(f, "LITE"),
            Self::Extra => write!(f, "EXTRA"),
            Self::Double => write!(f, "DOUBLE"),
            Self::Side => write!(f, "SIDE"),
            Self::LeftHalf => write!(f, "LEFT"),
            Self::RightHalf => write!(f, "RIGHT"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

// ============================================================================
// Tender
// ============================================================================

/// 支付方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tender {
    Cash,
    CreditCard,
    DebitCard,
    GiftCertificate,
    Account,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_type_parse() {
        assert_eq!("Delivery".parse::<OrderType>(), Ok(OrderType::Delivery));
        assert_eq!("takeout".parse::<OrderType>(), Ok(OrderType::Takeout));
        assert_eq!("PICKUP".parse::<OrderType>(), Ok(OrderType::Pickup));
        assert_eq!("DineIn".parse::<OrderType>(), Ok(OrderType::DineIn));
        assert!("".parse::<OrderType>().is_err());
    }

    #[test]
    fn test_qualifier_parse() {
        assert_eq!("Extra".parse::<Qualifier>().unwrap(), Qualifier::Extra);
        assert_eq!("light".parse::<Qualifier>().unwrap(), Qualifier::Lite);
        assert_eq!(
            "well done".parse::<Qualifier>().unwrap(),
            Qualifier::Other("well done".to_string())
        );
    }
}
