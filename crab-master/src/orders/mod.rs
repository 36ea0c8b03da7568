//! 账单存储与归档
//!
//! - [`storage`] - redb 中的当日账单
//! - [`archive`] - 日结归档，按需加载
//! - [`search`] - 卡支付查找 (先当日，后归档)

pub mod archive;
pub mod search;
pub mod storage;

pub use archive::{ArchiveData, ArchiveList};
pub use search::{CardMatch, find_card_payment};
pub use storage::{CheckStorage, StorageError, StorageResult};
