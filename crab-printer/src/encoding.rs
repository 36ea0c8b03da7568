//! Codepage encoding for receipt printers
//!
//! Slips are composed as UTF-8 and encoded right before they leave the
//! builder. Western printers run Windows-1252; Chinese firmware runs GBK,
//! where CJK characters take two columns.

use serde::{Deserialize, Serialize};

/// 打印机字符集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codepage {
    /// Windows-1252 (Latin-1 superset)
    #[default]
    Latin1,
    /// GBK (Chinese)
    Gbk,
}

impl Codepage {
    fn encoding(self) -> &'static encoding_rs::Encoding {
        match self {
            Codepage::Latin1 => encoding_rs::WINDOWS_1252,
            Codepage::Gbk => encoding_rs::GBK,
        }
    }

    /// Encode text; unmappable characters become `?`
    pub fn encode(self, s: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(s.len());
        for c in s.chars() {
            if c.is_ascii() {
                out.push(c as u8);
                continue;
            }
            let mut tmp = [0u8; 4];
            let (bytes, _, had_errors) = self.encoding().encode(c.encode_utf8(&mut tmp));
            if had_errors {
                out.push(b'?');
            } else {
                out.extend_from_slice(&bytes);
            }
        }
        out
    }

    /// Printed column width of a string
    pub fn width(self, s: &str) -> usize {
        s.chars().map(|c| self.char_width(c)).sum()
    }

    fn char_width(self, c: char) -> usize {
        match self {
            Codepage::Latin1 => 1,
            Codepage::Gbk if c.is_ascii() => 1,
            Codepage::Gbk => 2,
        }
    }

    /// Truncate a string to fit within `max_width` columns
    pub fn truncate(self, s: &str, max_width: usize) -> String {
        let mut width = 0;
        let mut result = String::new();
        for c in s.chars() {
            let w = self.char_width(c);
            if width + w > max_width {
                break;
            }
            result.push(c);
            width += w;
        }
        result
    }

    /// Pad (or truncate) a string to exactly `width` columns
    pub fn pad(self, s: &str, width: usize, align_right: bool) -> String {
        let current = self.width(s);
        if current >= width {
            return self.truncate(s, width);
        }
        let spaces = " ".repeat(width - current);
        if align_right {
            format!("{}{}", spaces, s)
        } else {
            format!("{}{}", s, spaces)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_encode() {
        assert_eq!(Codepage::Latin1.encode("café"), vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(Codepage::Latin1.encode("€5"), vec![0x80, b'5']);
        assert_eq!(Codepage::Latin1.encode("你"), vec![b'?']);
    }

    #[test]
    fn test_gbk_width() {
        assert_eq!(Codepage::Gbk.width("hello"), 5);
        assert_eq!(Codepage::Gbk.width("AB中文CD"), 8);
        assert_eq!(Codepage::Latin1.width("crème"), 5);
    }

    #[test]
    fn test_truncate_and_pad() {
        assert_eq!(Codepage::Gbk.truncate("AB中文", 4), "AB中");
        assert_eq!(Codepage::Latin1.pad("hi", 5, false), "hi   ");
        assert_eq!(Codepage::Latin1.pad("hi", 5, true), "   hi");
        assert_eq!(Codepage::Latin1.pad("hello world", 5, false), "hello");
    }
}
