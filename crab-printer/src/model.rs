//! Printer models
//!
//! | 型号   | 指令集                | 切纸        |
//! |--------|-----------------------|-------------|
//! | Epson  | ESC/POS               | GS V        |
//! | Star   | Star Line Mode        | ESC d       |
//! | Text   | 纯文本 (无控制码)      | 换页 (FF)   |

use crate::error::PrintError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 打印机型号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterModel {
    /// ESC/POS compatible (Epson TM series and clones)
    #[default]
    Epson,
    /// Star Micronics line mode
    Star,
    /// Plain text, no control codes (spool files, line printers)
    Text,
}

impl PrinterModel {
    /// Whether the model understands a paper cut command
    pub fn can_cut(self) -> bool {
        !matches!(self, PrinterModel::Text)
    }
}

impl FromStr for PrinterModel {
    type Err = PrintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "epson" | "escpos" | "tm" => Ok(PrinterModel::Epson),
            "star" => Ok(PrinterModel::Star),
            "text" | "ascii" | "file" => Ok(PrinterModel::Text),
            other => Err(PrintError::UnknownModel(other.to_string())),
        }
    }
}

impl fmt::Display for PrinterModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrinterModel::Epson => write!(f, "epson"),
            PrinterModel::Star => write!(f, "star"),
            PrinterModel::Text => write!(f, "text"),
        }
    }
}
