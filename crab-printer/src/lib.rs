//! # crab-printer
//!
//! Receipt printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - Command building per printer model (ESC/POS, Star line mode, plain text)
//! - Codepage encoding (Windows-1252, GBK)
//! - Network printing (raw TCP) and spool-file printing
//!
//! WHAT to print (delivery slips, reports) stays in `crab-master`.
//!
//! ## Example
//!
//! ```ignore
//! use crab_printer::{NetworkPrinter, Printer, PrinterModel, SlipBuilder};
//!
//! let mut builder = SlipBuilder::new(PrinterModel::Epson, 48);
//! builder.center().double_size().line("DELIVERY").reset_size();
//! builder.sep_double().left().line_lr("Pizza", "12.50").cut();
//!
//! let printer = NetworkPrinter::new("192.168.1.100", 9100)?;
//! printer.print(&builder.build()).await?;
//! ```

mod builder;
mod encoding;
mod error;
mod model;
mod printer;

// Re-exports
pub use builder::SlipBuilder;
pub use encoding::Codepage;
pub use error::{PrintError, PrintResult};
pub use model::PrinterModel;
pub use printer::{FilePrinter, NetworkPrinter, Printer, PrinterTarget};
