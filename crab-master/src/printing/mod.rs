//! 打印
//!
//! - [`slips`] - 外送单与报表渲染 (按打印机型号)
//! - [`worker`] - 独立任务中的打印执行

pub mod slips;
pub mod worker;

pub use slips::{render_delivery_slip, render_report, slip_width};
pub use worker::{PrintDispatcher, PrintJob};
