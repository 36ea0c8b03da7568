//! 终端更新通知类型定义
//!
//! master 进程向各终端节点推送的更新事件。展示层 (不在本仓库内)
//! 只消费这些事件：事件码 + 可选字符串，没有其它载荷。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 终端更新事件码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateEvent {
    /// 终端名单变更 (新增/移除终端)
    RosterChanged = 0,
    /// 配置副本已重新加载
    ConfigReloaded = 1,
    /// 终端空闲超时
    Timeout = 2,
    /// 分钟翻转
    Minute = 3,
    /// 小时翻转
    Hour = 4,
    /// 日期翻转
    Day = 5,
    /// 餐段切换 (早餐/午餐/晚餐...)
    MealPeriod = 6,
    /// 桌台/厨房闪烁刷新
    Blink = 7,
    /// 日结完成
    EndOfDay = 8,
    /// 禁止登录
    LoginsDisabled = 9,
    /// 宏回放输入
    MacroInput = 10,
    /// 系统关闭中
    ShuttingDown = 11,
}

impl TryFrom<u8> for UpdateEvent {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(UpdateEvent::RosterChanged),
            1 => Ok(UpdateEvent::ConfigReloaded),
            2 => Ok(UpdateEvent::Timeout),
            3 => Ok(UpdateEvent::Minute),
            4 => Ok(UpdateEvent::Hour),
            5 => Ok(UpdateEvent::Day),
            6 => Ok(UpdateEvent::MealPeriod),
            7 => Ok(UpdateEvent::Blink),
            8 => Ok(UpdateEvent::EndOfDay),
            9 => Ok(UpdateEvent::LoginsDisabled),
            10 => Ok(UpdateEvent::MacroInput),
            11 => Ok(UpdateEvent::ShuttingDown),
            _ => Err(()),
        }
    }
}

impl fmt::Display for UpdateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateEvent::RosterChanged => write!(f, "roster_changed"),
            UpdateEvent::ConfigReloaded => write!(f, "config_reloaded"),
            UpdateEvent::Timeout => write!(f, "timeout"),
            UpdateEvent::Minute => write!(f, "minute"),
            UpdateEvent::Hour => write!(f, "hour"),
            UpdateEvent::Day => write!(f, "day"),
            UpdateEvent::MealPeriod => write!(f, "meal_period"),
            UpdateEvent::Blink => write!(f, "blink"),
            UpdateEvent::EndOfDay => write!(f, "end_of_day"),
            UpdateEvent::LoginsDisabled => write!(f, "logins_disabled"),
            UpdateEvent::MacroInput => write!(f, "macro_input"),
            UpdateEvent::ShuttingDown => write!(f, "shutting_down"),
        }
    }
}

/// 推送给单个终端的更新消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalUpdate {
    /// 目标终端 ID
    pub terminal: u32,
    /// 事件码
    pub event: UpdateEvent,
    /// 可选字符串 (如餐段名称、宏按键序列)
    pub value: Option<String>,
}

impl TerminalUpdate {
    pub fn new(terminal: u32, event: UpdateEvent) -> Self {
        Self {
            terminal,
            event,
            value: None,
        }
    }

    /// 附带字符串值
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_code_roundtrip() {
        for code in 0u8..=11 {
            let event = UpdateEvent::try_from(code).unwrap();
            assert_eq!(event as u8, code);
        }
        assert!(UpdateEvent::try_from(12).is_err());
    }

    #[test]
    fn test_update_with_value() {
        let update = TerminalUpdate::new(3, UpdateEvent::MealPeriod).with_value("Dinner");
        assert_eq!(update.terminal, 3);
        assert_eq!(update.value.as_deref(), Some("Dinner"));
        assert_eq!(update.event.to_string(), "meal_period");
    }
}
