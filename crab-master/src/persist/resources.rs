//! 持久化资源
//!
//! | 资源 | 文件 | 说明 |
//! |------|------|------|
//! | [`Settings`] | settings.dat | 终端/打印机定义、餐段、超时 |
//! | [`Catalog`] | catalog.dat | 菜品目录 (呼叫中心编码 → 菜品) |
//! | [`AccountBook`] | accounts.dat | 默认科目表 |
//! | [`ExceptionLog`] | exceptions.dat | 作废/赠送记录 |
//! | [`Inventory`] | inventory.dat | 库存 |
//!
//! 配置页 (menu.pages / table.pages) 见 `registry::zone`，账单见 `orders`。

use super::versioned::Versioned;
use crate::registry::{PrinterKind, TerminalType};
use chrono::{NaiveTime, Timelike};
use crab_printer::PrinterModel;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::error::{AppError, AppResult};
use std::collections::BTreeMap;

// ============================================================================
// Settings
// ============================================================================

fn default_printer_port() -> u16 {
    9100
}

/// 终端定义 (settings 中持久化的形态)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminalDef {
    pub name: String,
    /// 显示主机 (如 `pos2:0`)
    pub host: String,
    #[serde(default)]
    pub kind: TerminalType,
    /// 自称 server
    #[serde(default)]
    pub server: bool,
    #[serde(default)]
    pub printer_host: Option<String>,
    #[serde(default = "default_printer_port")]
    pub printer_port: u16,
    #[serde(default)]
    pub printer_model: PrinterModel,
    #[serde(default)]
    pub drawers: u8,
}

impl TerminalDef {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            kind: TerminalType::default(),
            server: false,
            printer_host: None,
            printer_port: default_printer_port(),
            printer_model: PrinterModel::default(),
            drawers: 0,
        }
    }

    /// Default terminal opened on the active display when none is configured
    pub fn local(display: &str) -> Self {
        Self {
            server: true,
            ..Self::new("Server", display)
        }
    }
}

/// 打印机定义 (不会被隐式移除)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrinterDef {
    pub name: String,
    pub host: String,
    #[serde(default = "default_printer_port")]
    pub port: u16,
    #[serde(default)]
    pub model: PrinterModel,
    pub kind: PrinterKind,
}

/// 餐段
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MealPeriod {
    pub name: String,
    pub start: NaiveTime,
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

/// 系统设置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub store_name: String,
    pub terminals: Vec<TerminalDef>,
    pub printers: Vec<PrinterDef>,
    pub meal_periods: Vec<MealPeriod>,
    /// 终端空闲超时 (秒，0 = 关闭)
    pub idle_timeout_secs: u64,
    /// 闪烁通知间隔 (秒，0 = 关闭)
    pub blink_secs: u64,
    /// 呼叫中心订单打印机名称
    pub remote_order_printer: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_name: "Crab".into(),
            terminals: Vec::new(),
            printers: Vec::new(),
            meal_periods: vec![
                MealPeriod { name: "Breakfast".into(), start: hm(6, 0) },
                MealPeriod { name: "Lunch".into(), start: hm(11, 0) },
                MealPeriod { name: "Dinner".into(), start: hm(17, 0) },
                MealPeriod { name: "Late".into(), start: hm(22, 0) },
            ],
            idle_timeout_secs: 300,
            blink_secs: 2,
            remote_order_printer: None,
        }
    }
}

impl Versioned for Settings {
    const KIND: &'static str = "settings";
    const VERSION: u32 = 1;
}

impl Settings {
    pub fn terminal_def(&self, host: &str) -> Option<&TerminalDef> {
        self.terminals.iter().find(|t| t.host == host)
    }

    pub fn terminal_def_mut(&mut self, host: &str) -> Option<&mut TerminalDef> {
        self.terminals.iter_mut().find(|t| t.host == host)
    }

    /// Meal period in effect at `time`; before the first start the last
    /// period of the previous day still applies
    pub fn meal_period_at(&self, time: NaiveTime) -> Option<&MealPeriod> {
        let minute = time.hour() * 60 + time.minute();
        let mut periods: Vec<&MealPeriod> = self.meal_periods.iter().collect();
        periods.sort_by_key(|p| p.start);
        periods
            .iter()
            .rev()
            .find(|p| p.start.hour() * 60 + p.start.minute() <= minute)
            .or_else(|| periods.last())
            .copied()
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Item,
    /// 附加项 (只能作为 Detail)
    Modifier,
}

/// 菜品目录项
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogItem {
    pub code: String,
    /// 呼叫中心使用的编码 (为空时使用 code)
    #[serde(default)]
    pub call_center_code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub family: String,
    pub price: Decimal,
    #[serde(default)]
    pub kind: ItemKind,
}

impl CatalogItem {
    fn answers_to(&self, code: &str) -> bool {
        self.call_center_code.as_deref() == Some(code) || self.code == code
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    pub items: Vec<CatalogItem>,
}

impl Versioned for Catalog {
    const KIND: &'static str = "catalog";
    const VERSION: u32 = 1;
}

impl Catalog {
    pub fn lookup_item(&self, code: &str) -> Option<&CatalogItem> {
        self.items
            .iter()
            .find(|i| i.kind == ItemKind::Item && i.answers_to(code))
    }

    pub fn lookup_detail(&self, code: &str) -> Option<&CatalogItem> {
        self.items
            .iter()
            .find(|i| i.kind == ItemKind::Modifier && i.answers_to(code))
    }
}

// ============================================================================
// Accounts
// ============================================================================

pub const ACCOUNT_CASH: u32 = 1000;
pub const ACCOUNT_CARDS: u32 = 1010;
pub const ACCOUNT_FOOD_SALES: u32 = 4000;
pub const ACCOUNT_DELIVERY: u32 = 4010;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub number: u32,
    pub name: String,
    pub balance: Decimal,
}

/// 科目表
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccountBook {
    pub accounts: Vec<Account>,
}

impl Versioned for AccountBook {
    const KIND: &'static str = "accounts";
    const VERSION: u32 = 1;
}

impl AccountBook {
    /// Install the default chart when the book is empty; returns whether it did
    pub fn ensure_defaults(&mut self) -> bool {
        if !self.accounts.is_empty() {
            return false;
        }
        let chart = [
            (ACCOUNT_CASH, "Cash"),
            (ACCOUNT_CARDS, "Credit Cards"),
            (1200, "House Accounts"),
            (2100, "Sales Tax Payable"),
            (ACCOUNT_FOOD_SALES, "Food Sales"),
            (ACCOUNT_DELIVERY, "Delivery Charges"),
            (5000, "Comps"),
        ];
        self.accounts = chart
            .iter()
            .map(|(number, name)| Account {
                number: *number,
                name: (*name).to_string(),
                balance: Decimal::ZERO,
            })
            .collect();
        true
    }

    pub fn post(&mut self, number: u32, amount: Decimal) -> AppResult<()> {
        let account = self
            .accounts
            .iter_mut()
            .find(|a| a.number == number)
            .ok_or_else(|| AppError::not_found(format!("Account {}", number)))?;
        account.balance += amount;
        Ok(())
    }

    pub fn balance(&self, number: u32) -> Option<Decimal> {
        self.accounts
            .iter()
            .find(|a| a.number == number)
            .map(|a| a.balance)
    }
}

// ============================================================================
// Exceptions
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionKind {
    Void,
    Comp,
    Rebuild,
}

/// 异常记录 (作废/赠送/重建)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExceptionRecord {
    pub at: i64,
    pub terminal: String,
    pub kind: ExceptionKind,
    pub check_serial: u64,
    #[serde(default)]
    pub item: Option<String>,
    pub amount: Decimal,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExceptionLog {
    pub records: Vec<ExceptionRecord>,
}

impl Versioned for ExceptionLog {
    const KIND: &'static str = "exceptions";
    const VERSION: u32 = 1;
}

impl ExceptionLog {
    pub fn record(&mut self, record: ExceptionRecord) {
        tracing::info!(
            kind = ?record.kind,
            check = record.check_serial,
            terminal = %record.terminal,
            "Exception recorded"
        );
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn take_all(&mut self) -> Vec<ExceptionRecord> {
        std::mem::take(&mut self.records)
    }
}

// ============================================================================
// Inventory
// ============================================================================

/// 库存 (按菜品编码)，未登记的菜品不跟踪
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Inventory {
    pub stock: BTreeMap<String, Decimal>,
}

impl Versioned for Inventory {
    const KIND: &'static str = "inventory";
    const VERSION: u32 = 1;
}

impl Inventory {
    pub fn set_stock(&mut self, code: impl Into<String>, count: Decimal) {
        self.stock.insert(code.into(), count);
    }

    /// Deduct `quantity`; returns the remaining count for tracked items
    pub fn consume(&mut self, code: &str, quantity: u32) -> Option<Decimal> {
        let count = self.stock.get_mut(code)?;
        *count -= Decimal::from(quantity);
        if count.is_sign_negative() {
            tracing::warn!(item = %code, remaining = %count, "Inventory below zero");
        }
        Some(*count)
    }
}
