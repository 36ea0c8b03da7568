//! Crab Master - 餐厅 POS 主进程
//!
//! # 架构概述
//!
//! 单进程、单线程的协作式调度核心：
//!
//! - **配置注册表** (`registry`): 终端、打印机、master 配置副本、许可证额度
//! - **远程协议** (`protocol`): 远程终端命令与呼叫中心订单
//! - **调度器** (`scheduler`): tick 循环、日结、后台任务
//! - **持久化** (`persist`, `orders`): 版本化文件、redb 账单库、归档
//! - **打印** (`printing`): 独立任务中的打印执行
//!
//! # 模块结构
//!
//! ```text
//! crab-master/src/
//! ├── core/          # 配置、启动握手、Control 上下文
//! ├── registry/      # 终端/打印机/配置数据库
//! ├── protocol/      # 远程命令与订单
//! ├── scheduler/     # 调度循环、日结、批处理
//! ├── persist/       # 版本化资源文件
//! ├── orders/        # 账单存储、归档、查找
//! ├── printing/      # 单据渲染与打印任务
//! ├── message/       # 终端更新通知
//! └── utils/         # 日志、时间
//! ```

pub mod core;
pub mod message;
pub mod orders;
pub mod persist;
pub mod printing;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod utils;

// Re-export 公共类型
pub use core::{Bootstrap, BootstrapOptions, Config, Control, ShutdownOutcome};
pub use message::UpdateBus;
pub use protocol::RemoteListener;
pub use registry::Registry;
pub use scheduler::{RunOutcome, Scheduler, TickOutcome};
pub use shared::error::{AppError, AppResult, ErrorCode};

// Re-export logger functions
pub use utils::logger::{init_logger, install_panic_hook};
