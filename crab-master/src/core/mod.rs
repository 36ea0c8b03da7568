//! 核心模块 - 配置、启动握手和系统上下文
//!
//! # 模块结构
//!
//! - [`Config`] - 环境变量配置
//! - [`Bootstrap`] - 启动器握手
//! - [`Control`] - 系统上下文 (启动与关闭)

pub mod bootstrap;
pub mod config;
pub mod control;

pub use bootstrap::{Bootstrap, BootstrapCommand, BootstrapOptions};
pub use config::Config;
pub use control::{Control, RELEASE_DATE, ShutdownOutcome, check_clock};
