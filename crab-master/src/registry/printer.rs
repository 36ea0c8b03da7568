//! 打印机节点

use crab_printer::{FilePrinter, NetworkPrinter, PrintResult, PrinterModel, PrinterTarget};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type PrinterId = u32;

/// 打印机功能类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PrinterKind {
    Kitchen,
    Bar,
    Expediter,
    Report,
    Receipt,
    /// 呼叫中心订单 (外送单)
    RemoteOrder,
}

impl FromStr for PrinterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kitchen" => Ok(Self::Kitchen),
            "bar" => Ok(Self::Bar),
            "expediter" => Ok(Self::Expediter),
            "report" => Ok(Self::Report),
            "receipt" => Ok(Self::Receipt),
            "remote_order" | "remoteorder" | "delivery" => Ok(Self::RemoteOrder),
            other => Err(format!("unknown printer kind '{}'", other)),
        }
    }
}

impl fmt::Display for PrinterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Kitchen => "kitchen",
            Self::Bar => "bar",
            Self::Expediter => "expediter",
            Self::Report => "report",
            Self::Receipt => "receipt",
            Self::RemoteOrder => "remote_order",
        };
        write!(f, "{}", name)
    }
}

/// 打印机节点
#[derive(Debug, Clone, PartialEq)]
pub struct PrinterNode {
    pub id: PrinterId,
    pub name: String,
    /// 主机名/IP，或以 `/` 开头的设备/文件路径
    pub host: String,
    pub port: u16,
    pub model: PrinterModel,
    pub kind: PrinterKind,
    /// settings 中声明的打印机不会被隐式移除
    pub persistent: bool,
}

impl PrinterNode {
    pub fn matches_addr(&self, host: &str, port: u16) -> bool {
        self.host == host && (self.is_device() || self.port == port)
    }

    pub fn is_device(&self) -> bool {
        self.host.starts_with('/')
    }

    /// Transport for the print worker
    pub fn target(&self) -> PrintResult<PrinterTarget> {
        if self.is_device() {
            Ok(PrinterTarget::File(FilePrinter::new(&self.host)))
        } else {
            Ok(PrinterTarget::Network(NetworkPrinter::new(&self.host, self.port)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(host: &str, port: u16) -> PrinterNode {
        PrinterNode {
            id: 1,
            name: "p".into(),
            host: host.into(),
            port,
            model: PrinterModel::Epson,
            kind: PrinterKind::Kitchen,
            persistent: false,
        }
    }

    #[test]
    fn test_target_selection() {
        assert!(matches!(node("/dev/usb/lp0", 0).target().unwrap(), PrinterTarget::File(_)));
        assert!(matches!(node("10.0.0.9", 9100).target().unwrap(), PrinterTarget::Network(_)));
        assert!(node("10.0.0.9", 0).target().is_err());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("delivery".parse::<PrinterKind>().unwrap(), PrinterKind::RemoteOrder);
        assert_eq!(PrinterKind::RemoteOrder.to_string(), "remote_order");
    }
}
