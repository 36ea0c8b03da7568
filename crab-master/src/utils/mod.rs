//! 工具模块

pub mod logger;
pub mod time;

pub use logger::{init_logger, install_panic_hook};
