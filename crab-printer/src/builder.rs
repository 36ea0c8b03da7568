//! Model-aware slip builder
//!
//! Provides a fluent API for building print data. Control sequences are
//! chosen by [`PrinterModel`]; text is encoded with the configured
//! [`Codepage`] as it is written.

use crate::encoding::Codepage;
use crate::model::PrinterModel;

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;

/// Slip builder
pub struct SlipBuilder {
    buf: Vec<u8>,
    width: usize,
    model: PrinterModel,
    codepage: Codepage,
}

impl SlipBuilder {
    /// Create a new builder with the paper width in characters
    ///
    /// Common widths:
    /// - 58mm paper: 32 characters
    /// - 80mm paper: 42 (Star) / 48 (Epson) characters
    pub fn new(model: PrinterModel, width: usize) -> Self {
        let mut b = Self {
            buf: Vec::with_capacity(2048),
            width,
            model,
            codepage: Codepage::default(),
        };
        b.reset();
        b
    }

    pub fn with_codepage(mut self, codepage: Codepage) -> Self {
        self.codepage = codepage;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn model(&self) -> PrinterModel {
        self.model
    }

    fn cmd(&mut self, epson: &[u8], star: &[u8]) -> &mut Self {
        match self.model {
            PrinterModel::Epson => self.buf.extend_from_slice(epson),
            PrinterModel::Star => self.buf.extend_from_slice(star),
            PrinterModel::Text => {}
        }
        self
    }

    // === Text Output ===

    pub fn text(&mut self, s: &str) -> &mut Self {
        let encoded = self.codepage.encode(s);
        self.buf.extend_from_slice(&encoded);
        self
    }

    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(b'\n');
        self
    }

    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    /// Word-wrapped text; long words are hard-split
    pub fn wrapped(&mut self, s: &str) -> &mut Self {
        let mut current = String::new();
        for word in s.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };
            if self.codepage.width(&candidate) <= self.width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                let done = std::mem::take(&mut current);
                self.line(&done);
            }
            let mut rest = word.to_string();
            while self.codepage.width(&rest) > self.width {
                let head = self.codepage.truncate(&rest, self.width);
                if head.is_empty() {
                    break;
                }
                rest = rest[head.len()..].to_string();
                self.line(&head);
            }
            current = rest;
        }
        if !current.is_empty() {
            self.line(&current);
        }
        self
    }

    // === Alignment ===

    pub fn center(&mut self) -> &mut Self {
        self.cmd(&[ESC, 0x61, 0x01], &[ESC, GS, 0x61, 0x01])
    }

    pub fn left(&mut self) -> &mut Self {
        self.cmd(&[ESC, 0x61, 0x00], &[ESC, GS, 0x61, 0x00])
    }

    // === Text Style ===

    pub fn bold(&mut self) -> &mut Self {
        self.cmd(&[ESC, 0x45, 0x01], &[ESC, 0x45])
    }

    pub fn bold_off(&mut self) -> &mut Self {
        self.cmd(&[ESC, 0x45, 0x00], &[ESC, 0x46])
    }

    /// Double width and height
    pub fn double_size(&mut self) -> &mut Self {
        self.cmd(&[GS, 0x21, 0x11], &[ESC, 0x57, 0x01, ESC, 0x68, 0x01])
    }

    pub fn reset_size(&mut self) -> &mut Self {
        self.cmd(&[GS, 0x21, 0x00], &[ESC, 0x57, 0x00, ESC, 0x68, 0x00])
    }

    // === Separators ===

    pub fn sep_double(&mut self) -> &mut Self {
        self.line(&"=".repeat(self.width))
    }

    pub fn sep_single(&mut self) -> &mut Self {
        self.line(&"-".repeat(self.width))
    }

    // === Layout Helpers ===

    /// Left and right text on the same line
    pub fn line_lr(&mut self, left: &str, right: &str) -> &mut Self {
        let lw = self.codepage.width(left);
        let rw = self.codepage.width(right);

        if lw + rw >= self.width {
            self.text(left);
            self.text(" ");
            self.line(right)
        } else {
            let spaces = " ".repeat(self.width - lw - rw);
            self.text(left);
            self.text(&spaces);
            self.line(right)
        }
    }

    // === Paper Control ===

    /// Feed then cut; text printers get a form feed
    pub fn cut(&mut self) -> &mut Self {
        match self.model {
            PrinterModel::Epson => self.buf.extend_from_slice(&[GS, 0x56, 0x42, 0x03]),
            PrinterModel::Star => self.buf.extend_from_slice(&[ESC, 0x64, 0x03]),
            PrinterModel::Text => self.buf.push(0x0C),
        }
        self
    }

    /// Open cash drawer (pin 2)
    pub fn open_drawer(&mut self) -> &mut Self {
        self.cmd(&[ESC, 0x70, 0x00, 25, 250], &[0x07])
    }

    /// Reset printer to default state
    pub fn reset(&mut self) -> &mut Self {
        self.cmd(&[ESC, 0x40], &[ESC, 0x40])
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epson_sequences() {
        let mut b = SlipBuilder::new(PrinterModel::Epson, 32);
        b.center().bold().line("HELLO").bold_off().cut();
        let data = b.build();
        assert_eq!(&data[..2], &[ESC, 0x40]);
        assert!(data.windows(3).any(|w| w == [ESC, 0x61, 0x01]));
        assert!(data.ends_with(&[GS, 0x56, 0x42, 0x03]));
    }

    #[test]
    fn test_star_sequences() {
        let mut b = SlipBuilder::new(PrinterModel::Star, 42);
        b.center().bold().line("HELLO").cut();
        let data = b.build();
        assert!(data.windows(4).any(|w| w == [ESC, GS, 0x61, 0x01]));
        assert!(data.windows(2).any(|w| w == [ESC, 0x45]));
        assert!(data.ends_with(&[ESC, 0x64, 0x03]));
    }

    #[test]
    fn test_text_has_no_control_codes() {
        let mut b = SlipBuilder::new(PrinterModel::Text, 20);
        b.center().bold().double_size().line("Order 42").cut();
        let data = b.build();
        assert_eq!(data, b"Order 42\n\x0c".to_vec());
    }

    #[test]
    fn test_line_lr_and_wrap() {
        let mut b = SlipBuilder::new(PrinterModel::Text, 10);
        b.line_lr("Pizza", "9.50");
        b.wrapped("one two three four");
        let s = String::from_utf8(b.build()).unwrap();
        assert_eq!(s, "Pizza 9.50\none two\nthree four\n");
    }
}
