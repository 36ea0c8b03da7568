//! Slip renderers
//!
//! | 型号 | 行宽 | 控制码 |
//! |------|------|--------|
//! | epson | 48 | ESC/POS |
//! | star | 42 | Star line mode |
//! | text | 40 | 无 (纯文本 + 换页) |

use chrono::{Local, TimeZone};
use crab_printer::{PrinterModel, SlipBuilder};
use rust_decimal::Decimal;
use shared::order::{Check, OrderType};

/// Characters per line for 80mm paper
pub fn slip_width(model: PrinterModel) -> usize {
    match model {
        PrinterModel::Epson => 48,
        PrinterModel::Star => 42,
        PrinterModel::Text => 40,
    }
}

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

fn format_time(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn order_type_label(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::DineIn => "DINE IN",
        OrderType::Takeout => "TAKE OUT",
        OrderType::Delivery => "DELIVERY",
        OrderType::Pickup => "PICK UP",
    }
}

/// Render a remote order slip
pub fn render_delivery_slip(check: &Check, model: PrinterModel, store_name: &str) -> Vec<u8> {
    let mut b = SlipBuilder::new(model, slip_width(model));

    b.center().bold();
    if !store_name.is_empty() {
        b.line(store_name);
    }
    b.double_size().line(order_type_label(check.order_type)).reset_size();
    b.bold_off();
    b.line(&format!("Check #{}", check.serial));
    if let Some(id) = &check.call_center_id {
        b.line(&format!("Order {}", id));
    }
    b.line(&format_time(check.created_at));
    b.left().sep_double();

    let c = &check.customer;
    let name = c.full_name();
    if !name.is_empty() {
        b.bold().line(&name).bold_off();
    }
    for field in [&c.address, &c.phone] {
        if !field.is_empty() {
            b.line(field);
        }
    }
    let place = [c.city.as_str(), c.state.as_str(), c.postal_code.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    if !place.is_empty() {
        b.line(&place);
    }
    if !c.instructions.is_empty() {
        b.wrapped(&format!("Note: {}", c.instructions));
    }
    b.sep_single();

    for sub in &check.sub_checks {
        for order in &sub.orders {
            b.line_lr(
                &format!("{} x {}", order.quantity, order.name),
                &money(order.unit_price * Decimal::from(order.quantity)),
            );
            for detail in &order.details {
                let mut label = String::from("   ");
                for q in &detail.qualifiers {
                    label.push_str(&q.to_string());
                    label.push(' ');
                }
                label.push_str(&detail.name);
                if detail.price.is_zero() {
                    b.line(&label);
                } else {
                    b.line_lr(&label, &money(detail.price * Decimal::from(order.quantity)));
                }
            }
        }
    }

    b.sep_single();
    if !check.delivery_charge.is_zero() {
        b.line_lr("Delivery", &money(check.delivery_charge));
    }
    b.bold().line_lr("TOTAL", &money(check.total())).bold_off();
    if let Some(store) = &check.store_id {
        b.line(&format!("Store {}", store));
    }
    b.newline().cut();
    b.build()
}

/// Render a two-column report
pub fn render_report(
    model: PrinterModel,
    title: &str,
    subtitle: &str,
    rows: &[(String, String)],
) -> Vec<u8> {
    let mut b = SlipBuilder::new(model, slip_width(model));
    b.center().bold().line(title).bold_off();
    if !subtitle.is_empty() {
        b.line(subtitle);
    }
    b.left().sep_double();
    for (left, right) in rows {
        b.line_lr(left, right);
    }
    b.sep_double().newline().cut();
    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::order::{Detail, Order, Qualifier};

    fn check() -> Check {
        let mut check = Check::new(0);
        check.serial = 17;
        check.call_center_id = Some("42".into());
        check.order_type = OrderType::Delivery;
        check.customer.first_name = "Ann".into();
        check.customer.last_name = "Lee".into();
        check.customer.address = "1 Main St".into();
        check.delivery_charge = Decimal::new(300, 2);
        check.sub_checks[0].orders.push(Order {
            item_code: "PZ1".into(),
            name: "Pizza".into(),
            family: "Pizza".into(),
            quantity: 2,
            unit_price: Decimal::new(1000, 2),
            details: vec![Detail {
                item_code: "OL".into(),
                name: "Olives".into(),
                price: Decimal::ZERO,
                qualifiers: vec![Qualifier::Extra],
            }],
        });
        check
    }

    #[test]
    fn test_text_slip_contents() {
        let bytes = render_delivery_slip(&check(), PrinterModel::Text, "Crab Pizza");
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Crab Pizza"));
        assert!(text.contains("DELIVERY"));
        assert!(text.contains("Check #17"));
        assert!(text.contains("Order 42"));
        assert!(text.contains("Ann Lee"));
        assert!(text.contains("EXTRA Olives"));
        assert!(text.contains("23.00"));
        assert!(!text.contains('\x1b'));
        assert!(text.ends_with('\x0c'));
    }

    #[test]
    fn test_model_specific_cut() {
        let epson = render_delivery_slip(&check(), PrinterModel::Epson, "");
        assert!(epson.ends_with(&[0x1D, 0x56, 0x42, 0x03]));
        let star = render_delivery_slip(&check(), PrinterModel::Star, "");
        assert!(star.ends_with(&[0x1B, 0x64, 0x03]));
    }

    #[test]
    fn test_report_rows() {
        let rows = vec![("Checks".to_string(), "3".to_string())];
        let text = String::from_utf8(render_report(PrinterModel::Text, "SALES", "", &rows)).unwrap();
        assert!(text.contains("SALES"));
        assert!(text.lines().any(|l| l.starts_with("Checks") && l.ends_with('3')));
    }
}
