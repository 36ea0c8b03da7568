//! Check / SubCheck / Order aggregate
//!
//! ```text
//! Check ─┬─ SubCheck ─┬─ Order ── Detail (qualifiers)
//!        │            ├─ Order
//!        │            └─ Payment (card)
//!        └─ SubCheck
//! ```

use super::types::{CheckStatus, OrderType, Qualifier, Tender};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 顾客与配送信息
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub phone: String,
    /// 配送备注
    pub instructions: String,
}

impl Customer {
    pub fn full_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (false, true) => self.first_name.clone(),
            (true, false) => self.last_name.clone(),
            (true, true) => String::new(),
        }
    }
}

/// 附加项 (修饰子订单)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detail {
    pub item_code: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub qualifiers: Vec<Qualifier>,
}

/// 单个点单行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub item_code: String,
    pub name: String,
    pub family: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub details: Vec<Detail>,
}

impl Order {
    /// Line total including details, quantity applied to both
    pub fn total(&self) -> Decimal {
        let detail_sum: Decimal = self.details.iter().map(|d| d.price).sum();
        (self.unit_price + detail_sum) * Decimal::from(self.quantity)
    }
}

/// 卡信息 (卡号可能为掩码形式)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardInfo {
    pub number: String,
    pub holder: String,
}

impl CardInfo {
    /// Card fingerprint match
    ///
    /// When either the query or the stored number carries mask characters
    /// (`x`, `X`, `*`) only the last four digits are compared; otherwise
    /// the two must agree digit for digit.
    pub fn matches(&self, query: &str) -> bool {
        if is_masked(query) || is_masked(&self.number) {
            match (last_four(query), last_four(&self.number)) {
                (Some(q), Some(s)) => q == s,
                _ => false,
            }
        } else {
            let q = digits(query);
            !q.is_empty() && q == digits(&self.number)
        }
    }
}

fn is_masked(s: &str) -> bool {
    s.chars().any(|c| matches!(c, 'x' | 'X' | '*'))
}

fn digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn last_four(s: &str) -> Option<String> {
    let d = digits(s);
    if d.len() < 4 {
        return None;
    }
    Some(d[d.len() - 4..].to_string())
}

/// 支付记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub tender: Tender,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<CardInfo>,
}

/// 分单
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubCheck {
    pub number: u32,
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub payments: Vec<Payment>,
}

impl SubCheck {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            ..Default::default()
        }
    }

    pub fn total(&self) -> Decimal {
        self.orders.iter().map(Order::total).sum()
    }
}

/// 账单
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Check {
    /// 流水号 (持久化时分配，0 = 未分配)
    pub serial: u64,
    /// 呼叫中心订单号
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_center_id: Option<String>,
    pub order_type: OrderType,
    #[serde(default)]
    pub customer: Customer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
    pub delivery_charge: Decimal,
    pub status: CheckStatus,
    /// 创建时间 (Unix millis)
    pub created_at: i64,
    #[serde(default)]
    pub sub_checks: Vec<SubCheck>,
}

impl Check {
    /// New open check with a single empty subcheck
    pub fn new(created_at: i64) -> Self {
        Self {
            created_at,
            sub_checks: vec![SubCheck::new(1)],
            ..Default::default()
        }
    }

    pub fn order_count(&self) -> usize {
        self.sub_checks.iter().map(|s| s.orders.len()).sum()
    }

    pub fn total(&self) -> Decimal {
        self.sub_checks.iter().map(SubCheck::total).sum::<Decimal>() + self.delivery_charge
    }

    pub fn is_closed(&self) -> bool {
        self.status != CheckStatus::Open
    }

    /// First payment matching card fingerprint and exact amount
    pub fn find_card_payment(&self, card_query: &str, amount: Decimal) -> Option<&Payment> {
        self.sub_checks
            .iter()
            .flat_map(|s| s.payments.iter())
            .find(|p| {
                p.amount == amount && p.card.as_ref().is_some_and(|c| c.matches(card_query))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(number: &str) -> CardInfo {
        CardInfo {
            number: number.to_string(),
            holder: "J SMITH".to_string(),
        }
    }

    #[test]
    fn test_card_match_masked_query() {
        let c = card("4111111111111234");
        assert!(c.matches("xxxxxxxxxxxx1234"));
        assert!(c.matches("****1234"));
        assert!(!c.matches("xxxxxxxxxxxx9999"));
    }

    #[test]
    fn test_card_match_masked_stored_number() {
        let c = card("xxxxxxxxxxxx1234");
        assert!(c.matches("4111111111111234"));
        assert!(c.matches("****1234"));
        assert!(!c.matches("4111111111119999"));
    }

    #[test]
    fn test_card_match_exact_query() {
        let c = card("4111 1111 1111 1234");
        assert!(c.matches("4111111111111234"));
        assert!(!c.matches("4111111111119234"));
        assert!(!c.matches("1234"));
    }

    #[test]
    fn test_check_total_includes_details_and_delivery() {
        let mut check = Check::new(0);
        check.delivery_charge = Decimal::new(250, 2);
        check.sub_checks[0].orders.push(Order {
            item_code: "PZ1".to_string(),
            name: "Pizza".to_string(),
            family: "Pizza".to_string(),
            quantity: 2,
            unit_price: Decimal::new(1000, 2),
            details: vec![Detail {
                item_code: "TOP1".to_string(),
                name: "Olives".to_string(),
                price: Decimal::new(150, 2),
                qualifiers: vec![Qualifier::Extra],
            }],
        });
        // (10.00 + 1.50) * 2 + 2.50
        assert_eq!(check.total(), Decimal::new(2550, 2));
        assert_eq!(check.order_count(), 1);
    }

    #[test]
    fn test_find_card_payment_requires_exact_amount() {
        let mut check = Check::new(0);
        check.sub_checks[0].payments.push(Payment {
            tender: Tender::CreditCard,
            amount: Decimal::new(4200, 2),
            card: Some(card("5500000000000004")),
        });
        assert!(check.find_card_payment("xxxx0004", Decimal::new(4200, 2)).is_some());
        assert!(check.find_card_payment("xxxx0004", Decimal::new(4201, 2)).is_none());
    }
}
