//! 呼叫中心订单键值流
//!
//! ```text
//! OrderID=42
//! OrderType=Delivery
//! FirstName=Ann
//! ItemCode=PZ1
//! ItemQTY=2
//! DetailCode=OL
//! AddonQualifier=Extra
//! EndDetail
//! EndItem
//! EndOrder            ──▶ 42:17:COMPLETE:PRINTED
//! ```
//!
//! 出错后继续读取并丢弃，直到 `EndOrder`，保持长连接同步。

use crate::core::Control;
use crate::persist::Catalog;
use rust_decimal::Decimal;
use shared::order::{Check, Detail, Order, OrderType, Qualifier};
use std::fmt;
use std::str::FromStr;

/// 键类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    OrderId,
    OrderType,
    FirstName,
    LastName,
    Address,
    City,
    State,
    PostalCode,
    Phone,
    Instructions,
    DeliveryCharge,
    StoreId,
    ItemCode,
    ItemQty,
    DetailCode,
    AddonQualifier,
    EndItem,
    EndDetail,
    EndOrder,
}

/// Key prefixes; matching picks the longest prefix
const KEYS: &[(&str, Key)] = &[
    ("OrderID", Key::OrderId),
    ("OrderType", Key::OrderType),
    ("FirstName", Key::FirstName),
    ("LastName", Key::LastName),
    ("Address", Key::Address),
    ("City", Key::City),
    ("State", Key::State),
    ("PostalCode", Key::PostalCode),
    ("Phone", Key::Phone),
    ("Instructions", Key::Instructions),
    ("DeliveryCharge", Key::DeliveryCharge),
    ("StoreID", Key::StoreId),
    ("ItemCode", Key::ItemCode),
    ("ProductCode", Key::ItemCode),
    ("ItemQTY", Key::ItemQty),
    ("ProductQTY", Key::ItemQty),
    ("DetailCode", Key::DetailCode),
    ("AddonCode", Key::DetailCode),
    ("AddonQualifier", Key::AddonQualifier),
    ("EndItem", Key::EndItem),
    ("EndProduct", Key::EndItem),
    ("EndDetail", Key::EndDetail),
    ("EndAddon", Key::EndDetail),
    ("EndOrder", Key::EndOrder),
];

fn lookup_key(key: &str) -> Option<Key> {
    KEYS.iter()
        .filter(|(prefix, _)| key.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, k)| *k)
}

/// 状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Complete,
    Incomplete,
    Failed,
    BadItem,
    BadDetail,
    UnknownErr,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            OrderStatus::Complete => "COMPLETE",
            OrderStatus::Incomplete => "INCOMPLETE",
            OrderStatus::Failed => "FAILED",
            OrderStatus::BadItem => "BADITEM",
            OrderStatus::BadDetail => "BADDETAIL",
            OrderStatus::UnknownErr => "UNKNOWNERR",
        };
        write!(f, "{}", token)
    }
}

/// Status line `<callCenterId>:<serial>:<STATUS>:<PRINTED|NOTPRINTED>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderResponse {
    pub call_center_id: String,
    pub serial: u64,
    pub status: OrderStatus,
    pub printed: bool,
}

impl fmt::Display for OrderResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.call_center_id,
            self.serial,
            self.status,
            if self.printed { "PRINTED" } else { "NOTPRINTED" }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DecodeError {
    BadItem(String),
    BadDetail(String),
    Protocol(&'static str),
}

/// Result of feeding one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Continue,
    End,
}

/// One order exchange in progress
#[derive(Debug)]
pub struct RemoteOrderSession {
    check: Check,
    pending_order: Option<Order>,
    pending_detail: Option<Detail>,
    error: Option<DecodeError>,
}

impl RemoteOrderSession {
    pub fn new(now: i64) -> Self {
        Self {
            check: Check::new(now),
            pending_order: None,
            pending_detail: None,
            error: None,
        }
    }

    pub fn call_center_id(&self) -> &str {
        self.check.call_center_id.as_deref().unwrap_or("")
    }

    pub fn is_draining(&self) -> bool {
        self.error.is_some()
    }

    pub fn committed_orders(&self) -> usize {
        self.check.order_count()
    }

    /// Decode one `Key=Value` line
    pub fn feed(&mut self, line: &str, catalog: &Catalog) -> Feed {
        let line = line.trim();
        if line.is_empty() {
            return Feed::Continue;
        }
        let (raw_key, value) = match line.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (line, ""),
        };
        let Some(key) = lookup_key(raw_key) else {
            tracing::warn!(key = %raw_key, "Unknown remote order key ignored");
            return Feed::Continue;
        };
        if key == Key::EndOrder {
            return Feed::End;
        }
        if self.error.is_some() {
            tracing::trace!(key = %raw_key, "Draining after error");
            return Feed::Continue;
        }
        if let Err(e) = self.apply(key, value, catalog) {
            tracing::warn!(key = %raw_key, value = %value, error = ?e, "Remote order rejected");
            self.error = Some(e);
        }
        Feed::Continue
    }

    fn apply(&mut self, key: Key, value: &str, catalog: &Catalog) -> Result<(), DecodeError> {
        match key {
            Key::OrderId => self.check.call_center_id = Some(value.to_string()),
            Key::OrderType => match OrderType::from_str(value) {
                Ok(t) => self.check.order_type = t,
                Err(()) => tracing::warn!(value = %value, "Unknown order type, keeping default"),
            },
            Key::FirstName => self.check.customer.first_name = value.to_string(),
            Key::LastName => self.check.customer.last_name = value.to_string(),
            Key::Address => self.check.customer.address = value.to_string(),
            Key::City => self.check.customer.city = value.to_string(),
            Key::State => self.check.customer.state = value.to_string(),
            Key::PostalCode => self.check.customer.postal_code = value.to_string(),
            Key::Phone => self.check.customer.phone = value.to_string(),
            Key::Instructions => self.check.customer.instructions = value.to_string(),
            Key::DeliveryCharge => match Decimal::from_str(value) {
                Ok(charge) => self.check.delivery_charge = charge,
                Err(_) => tracing::warn!(value = %value, "Bad delivery charge ignored"),
            },
            Key::StoreId => self.check.store_id = Some(value.to_string()),
            Key::ItemCode => {
                if self.pending_order.is_some() {
                    return Err(DecodeError::Protocol("item started while another is open"));
                }
                let item = catalog
                    .lookup_item(value)
                    .ok_or_else(|| DecodeError::BadItem(value.to_string()))?;
                self.pending_order = Some(Order {
                    item_code: item.code.clone(),
                    name: item.name.clone(),
                    family: item.family.clone(),
                    quantity: 1,
                    unit_price: item.price,
                    details: Vec::new(),
                });
            }
            Key::ItemQty => {
                let order = self
                    .pending_order
                    .as_mut()
                    .ok_or(DecodeError::Protocol("quantity with no open item"))?;
                match value.parse::<u32>() {
                    Ok(q) if q > 0 => order.quantity = q,
                    _ => tracing::warn!(value = %value, "Bad item quantity ignored"),
                }
            }
            Key::DetailCode => {
                if self.pending_order.is_none() && self.last_committed().is_none() {
                    return Err(DecodeError::Protocol("detail with no order"));
                }
                if self.pending_detail.is_some() {
                    return Err(DecodeError::Protocol("detail started while another is open"));
                }
                let detail = catalog
                    .lookup_detail(value)
                    .ok_or_else(|| DecodeError::BadDetail(value.to_string()))?;
                self.pending_detail = Some(Detail {
                    item_code: detail.code.clone(),
                    name: detail.name.clone(),
                    price: detail.price,
                    qualifiers: Vec::new(),
                });
            }
            Key::AddonQualifier => match self.pending_detail.as_mut() {
                Some(detail) => {
                    let Ok(q) = Qualifier::from_str(value);
                    detail.qualifiers.push(q);
                }
                None => tracing::warn!(value = %value, "Qualifier with no open detail ignored"),
            },
            Key::EndDetail => self.attach_detail(),
            Key::EndItem => {
                self.attach_detail();
                match self.pending_order.take() {
                    Some(order) => self.commit(order),
                    None => tracing::warn!("EndItem with no open item ignored"),
                }
            }
            Key::EndOrder => {}
        }
        Ok(())
    }

    fn last_committed(&mut self) -> Option<&mut Order> {
        self.check
            .sub_checks
            .last_mut()
            .and_then(|s| s.orders.last_mut())
    }

    fn commit(&mut self, order: Order) {
        if let Some(sub) = self.check.sub_checks.first_mut() {
            sub.orders.push(order);
        }
    }

    /// Pending detail goes to the open item, else to the last committed one
    fn attach_detail(&mut self) {
        let Some(detail) = self.pending_detail.take() else {
            return;
        };
        if let Some(order) = self.pending_order.as_mut() {
            order.details.push(detail);
        } else if let Some(order) = self.last_committed() {
            order.details.push(detail);
        }
    }

    /// Classify the finished exchange
    ///
    /// An exchange that committed nothing is `INCOMPLETE` whatever else
    /// went wrong.
    pub fn finish(mut self) -> Result<Check, (String, OrderStatus)> {
        let id = self.call_center_id().to_string();
        if self.pending_order.take().is_some() {
            tracing::warn!(order = %id, "Open item discarded at EndOrder");
        }
        if self.check.order_count() == 0 {
            return Err((id, OrderStatus::Incomplete));
        }
        match self.error {
            Some(DecodeError::BadItem(_)) => Err((id, OrderStatus::BadItem)),
            Some(DecodeError::BadDetail(_)) => Err((id, OrderStatus::BadDetail)),
            Some(DecodeError::Protocol(_)) => Err((id, OrderStatus::UnknownErr)),
            None => Ok(self.check),
        }
    }
}

/// Finish an exchange against the live system
///
/// A valid check is persisted (assigning its serial), stock is consumed,
/// and a delivery slip is queued for the remote-order printer.
pub fn complete(session: RemoteOrderSession, ctl: &mut Control) -> OrderResponse {
    let mut check = match session.finish() {
        Ok(check) => check,
        Err((call_center_id, status)) => {
            tracing::info!(order = %call_center_id, status = %status, "Remote order not accepted");
            return OrderResponse {
                call_center_id,
                serial: 0,
                status,
                printed: false,
            };
        }
    };
    let call_center_id = check.call_center_id.clone().unwrap_or_default();

    let serial = match ctl.record_check(&mut check) {
        Ok(serial) => serial,
        Err(e) => {
            tracing::error!(order = %call_center_id, error = %e, "Failed to persist remote order");
            return OrderResponse {
                call_center_id,
                serial: 0,
                status: OrderStatus::Failed,
                printed: false,
            };
        }
    };
    let printed = ctl.print_remote_order(&check);
    tracing::info!(
        order = %call_center_id,
        serial = serial,
        orders = check.order_count(),
        printed = printed,
        "Remote order accepted"
    );
    OrderResponse {
        call_center_id,
        serial,
        status: OrderStatus::Complete,
        printed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{CatalogItem, ItemKind};

    fn catalog() -> Catalog {
        Catalog {
            items: vec![
                CatalogItem {
                    code: "PZ1".into(),
                    call_center_code: Some("100".into()),
                    name: "Pizza".into(),
                    family: "Pizza".into(),
                    price: Decimal::new(1000, 2),
                    kind: ItemKind::Item,
                },
                CatalogItem {
                    code: "OL".into(),
                    call_center_code: None,
                    name: "Olives".into(),
                    family: "Toppings".into(),
                    price: Decimal::new(100, 2),
                    kind: ItemKind::Modifier,
                },
            ],
        }
    }

    fn run(lines: &[&str]) -> (RemoteOrderSession, Feed) {
        let catalog = catalog();
        let mut session = RemoteOrderSession::new(0);
        let mut last = Feed::Continue;
        for line in lines {
            last = session.feed(line, &catalog);
            if last == Feed::End {
                break;
            }
        }
        (session, last)
    }

    #[test]
    fn test_longest_prefix_wins() {
        assert_eq!(lookup_key("AddonQualifier"), Some(Key::AddonQualifier));
        assert_eq!(lookup_key("AddonCode"), Some(Key::DetailCode));
        assert_eq!(lookup_key("ItemQTY"), Some(Key::ItemQty));
        assert_eq!(lookup_key("ItemCode2"), Some(Key::ItemCode));
        assert_eq!(lookup_key("itemcode"), None);
        assert_eq!(lookup_key("Color"), None);
    }

    #[test]
    fn test_full_order_decodes() {
        let (session, end) = run(&[
            "OrderID=42",
            "OrderType=Delivery",
            "FirstName=Ann",
            "DeliveryCharge=2.50",
            "Favorite=blue",
            "ProductCode=100",
            "ProductQTY=2",
            "AddonCode=OL",
            "AddonQualifier=Extra",
            "EndAddon",
            "EndProduct",
            "EndOrder",
        ]);
        assert_eq!(end, Feed::End);
        let check = session.finish().unwrap();
        assert_eq!(check.call_center_id.as_deref(), Some("42"));
        assert_eq!(check.order_type, OrderType::Delivery);
        let order = &check.sub_checks[0].orders[0];
        assert_eq!(order.item_code, "PZ1");
        assert_eq!(order.quantity, 2);
        assert_eq!(order.details[0].qualifiers, vec![Qualifier::Extra]);
        // (10.00 + 1.00) * 2 + 2.50
        assert_eq!(check.total(), Decimal::new(2450, 2));
    }

    #[test]
    fn test_detail_after_end_item_attaches_to_last_order() {
        let (session, _) = run(&["ItemCode=PZ1", "EndItem", "DetailCode=OL", "EndDetail", "EndOrder"]);
        let check = session.finish().unwrap();
        assert_eq!(check.sub_checks[0].orders[0].details.len(), 1);
    }

    #[test]
    fn test_bad_item_with_nothing_committed_is_incomplete() {
        let (session, end) = run(&["OrderID=7", "ItemCode=BAD", "ItemQTY=3", "EndItem", "EndOrder"]);
        assert_eq!(end, Feed::End);
        assert!(session.is_draining());
        assert_eq!(session.finish().unwrap_err(), ("7".to_string(), OrderStatus::Incomplete));
    }

    #[test]
    fn test_error_after_commit_reports_kind() {
        let (session, _) = run(&["ItemCode=PZ1", "EndItem", "ItemCode=NOPE", "EndItem", "EndOrder"]);
        assert_eq!(session.finish().unwrap_err().1, OrderStatus::BadItem);

        let (session, _) = run(&["ItemCode=PZ1", "DetailCode=NOPE", "EndItem", "EndOrder"]);
        // Item never committed: draining skipped the EndItem
        assert_eq!(session.finish().unwrap_err().1, OrderStatus::Incomplete);

        let (session, _) = run(&["ItemCode=PZ1", "EndItem", "ItemCode=PZ1", "ItemCode=PZ1", "EndOrder"]);
        assert_eq!(session.finish().unwrap_err().1, OrderStatus::UnknownErr);

        let (session, _) = run(&["ItemCode=PZ1", "EndItem", "AddonCode=NOPE", "EndOrder"]);
        assert_eq!(session.finish().unwrap_err().1, OrderStatus::BadDetail);
    }

    #[test]
    fn test_detail_with_no_order_is_protocol_error() {
        let (session, _) = run(&["DetailCode=OL"]);
        assert!(session.is_draining());
    }

    #[test]
    fn test_response_line() {
        let r = OrderResponse {
            call_center_id: "42".into(),
            serial: 17,
            status: OrderStatus::Complete,
            printed: false,
        };
        assert_eq!(r.to_string(), "42:17:COMPLETE:NOTPRINTED");
    }
}
