//! 版本化持久化
//!
//! - [`versioned`] - 版本头 + JSON 文件格式，损坏时备份并重试
//! - [`resources`] - 各类持久化资源

pub mod resources;
pub mod versioned;

pub use resources::{
    ACCOUNT_CARDS, ACCOUNT_CASH, ACCOUNT_DELIVERY, ACCOUNT_FOOD_SALES, AccountBook, Catalog,
    CatalogItem, ExceptionKind, ExceptionLog, ExceptionRecord, Inventory, ItemKind, MealPeriod,
    PrinterDef, Settings, TerminalDef,
};
pub use versioned::{Loaded, PersistError, PersistResult, Versioned, load, load_or_recover, save};

/// 数据目录下的文件名
pub mod files {
    pub const SETTINGS: &str = "settings.dat";
    pub const CATALOG: &str = "catalog.dat";
    pub const ACCOUNTS: &str = "accounts.dat";
    pub const EXCEPTIONS: &str = "exceptions.dat";
    pub const INVENTORY: &str = "inventory.dat";
    pub const MENU_PAGES: &str = "menu.pages";
    pub const TABLE_PAGES: &str = "table.pages";
    pub const MACROS: &str = "macros";
}
