//! 终端更新通知
//!
//! 事件类型定义在 `shared::message`，这里只负责分发。

pub mod bus;

pub use bus::UpdateBus;
pub use shared::message::{TerminalUpdate, UpdateEvent};
