//! Check aggregate module
//!
//! Types shared between the master process and anything that reads
//! persisted checks:
//! - [`Check`] / [`SubCheck`] / [`Order`] / [`Detail`]: the transactional aggregate
//! - [`Payment`] / [`CardInfo`]: tenders recorded against a subcheck
//! - Enums: [`OrderType`], [`CheckStatus`], [`Qualifier`], [`Tender`]

pub mod check;
pub mod types;

// Re-exports
pub use check::{CardInfo, Check, Customer, Detail, Order, Payment, SubCheck};
pub use types::*;
