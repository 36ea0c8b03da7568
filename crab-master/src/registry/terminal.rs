//! 终端节点

use super::printer::PrinterId;
use super::zone::{ConfigDatabase, TerminalId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 终端类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TerminalType {
    #[default]
    Normal,
    Kitchen,
    Bar,
    Expediter,
    Hostess,
    FastFood,
}

impl FromStr for TerminalType {
    type Err = String;

    /// Accepts names or the numeric codes loaders send in `openterm`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "normal" => Ok(Self::Normal),
            "1" | "kitchen" => Ok(Self::Kitchen),
            "2" | "bar" => Ok(Self::Bar),
            "3" | "expediter" => Ok(Self::Expediter),
            "4" | "hostess" => Ok(Self::Hostess),
            "5" | "fastfood" => Ok(Self::FastFood),
            other => Err(format!("unknown terminal type '{}'", other)),
        }
    }
}

impl fmt::Display for TerminalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::Kitchen => "kitchen",
            Self::Bar => "bar",
            Self::Expediter => "expediter",
            Self::Hostess => "hostess",
            Self::FastFood => "fastfood",
        };
        write!(f, "{}", name)
    }
}

/// 许可槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseSlot {
    /// 本地终端 (保留槽位)
    Local,
    Remote,
}

/// 登录会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: uuid::Uuid,
    pub user: String,
    pub started_at: i64,
}

/// 终端节点
#[derive(Debug, Clone)]
pub struct TerminalNode {
    pub id: TerminalId,
    pub name: String,
    pub host: String,
    pub kind: TerminalType,
    pub slot: LicenseSlot,
    /// 工作副本 (master holder 持有的就是 master 本身)
    pub config: ConfigDatabase,
    pub master_holder: bool,
    pub printer: Option<PrinterId>,
    pub drawers: u8,
    pub server: bool,
    /// 最后活动时间 (millis)
    pub last_activity: i64,
    pub kill_pending: bool,
    pub reload_pending: bool,
    pub session: Option<Session>,
    /// 已发出超时通知，活动后复位
    pub timed_out: bool,
}

impl TerminalNode {
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Idle long enough to raise a timeout (once per idle period)
    pub fn timeout_due(&self, now: i64, idle_timeout_ms: i64) -> bool {
        idle_timeout_ms > 0 && !self.timed_out && now - self.last_activity >= idle_timeout_ms
    }
}
