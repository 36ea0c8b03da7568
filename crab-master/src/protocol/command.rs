//! 远程命令解析
//!
//! | 命令 | 参数 | 结果 |
//! |------|------|------|
//! | `openterm` | `<name> <host> [update] [type printhost printmodel drawers]` | `OK` / `FAIL <reason>` |
//! | `closeterm` | `<host>` | `OK` / `FAIL <reason>` |
//! | `cloneterm` | `<host> <destination>` | `OK` / `FAIL <reason>` |
//! | `finddata` | `<cardnumber> <amount>` | `FOUND <serial> <holder>` / `NOTFOUND` |
//! | `remoteorder` | - | `SENDORDER`，随后进入键值流 |

use crab_printer::PrinterModel;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use crate::registry::TerminalType;

/// Cut a record at the first line terminator
pub fn truncate_line(record: &str) -> &str {
    match record.find(['\r', '\n', '\0']) {
        Some(pos) => &record[..pos],
        None => record,
    }
}

/// Optional device block of `openterm`
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSpec {
    pub kind: TerminalType,
    pub printer_host: String,
    pub printer_model: PrinterModel,
    pub drawers: u8,
}

/// Parsed remote command
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCommand {
    OpenTerm {
        name: String,
        host: String,
        update: bool,
        device: Option<DeviceSpec>,
    },
    CloseTerm {
        host: String,
    },
    CloneTerm {
        host: String,
        destination: String,
    },
    FindData {
        card: String,
        amount: Decimal,
    },
    RemoteOrder,
}

/// Parse failure, reported to the peer as a `FAIL` reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Unknown,
    Usage(&'static str),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Unknown => write!(f, "unknown command"),
            ParseError::Usage(usage) => write!(f, "usage: {}", usage),
        }
    }
}

const OPENTERM_USAGE: &str = "openterm <name> <host> [update] [type printhost printmodel drawers]";

impl RemoteCommand {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = truncate_line(line);
        let mut words = line.split_whitespace();
        let Some(keyword) = words.next() else {
            return Err(ParseError::Unknown);
        };
        let args: Vec<&str> = words.collect();

        match keyword.to_ascii_lowercase().as_str() {
            "openterm" => parse_openterm(&args),
            "closeterm" => match args.as_slice() {
                [host] => Ok(Self::CloseTerm {
                    host: (*host).to_string(),
                }),
                _ => Err(ParseError::Usage("closeterm <host>")),
            },
            "cloneterm" => match args.as_slice() {
                [host, destination] => Ok(Self::CloneTerm {
                    host: (*host).to_string(),
                    destination: (*destination).to_string(),
                }),
                _ => Err(ParseError::Usage("cloneterm <host> <destination>")),
            },
            "finddata" => match args.as_slice() {
                [card, amount] => {
                    let amount = Decimal::from_str(amount)
                        .map_err(|_| ParseError::Usage("finddata <cardnumber> <amount>"))?;
                    Ok(Self::FindData {
                        card: (*card).to_string(),
                        amount,
                    })
                }
                _ => Err(ParseError::Usage("finddata <cardnumber> <amount>")),
            },
            "remoteorder" => Ok(Self::RemoteOrder),
            _ => Err(ParseError::Unknown),
        }
    }
}

fn parse_openterm(args: &[&str]) -> Result<RemoteCommand, ParseError> {
    let usage = ParseError::Usage(OPENTERM_USAGE);
    let (name, host, rest) = match args {
        [name, host, rest @ ..] => (*name, *host, rest),
        _ => return Err(usage),
    };
    let (update, rest) = match rest {
        [first, rest @ ..] if first.eq_ignore_ascii_case("update") => (true, rest),
        _ => (false, rest),
    };
    let device = match rest {
        [] => None,
        [kind, printer_host, model, drawers] => Some(DeviceSpec {
            kind: kind.parse().map_err(|_| usage.clone())?,
            printer_host: (*printer_host).to_string(),
            printer_model: model.parse().map_err(|_| usage.clone())?,
            drawers: drawers.parse().map_err(|_| usage.clone())?,
        }),
        _ => return Err(usage),
    };
    Ok(RemoteCommand::OpenTerm {
        name: name.to_string(),
        host: host.to_string(),
        update,
        device,
    })
}

/// Result line written back to the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Fail(String),
    Found { serial: u64, holder: String },
    NotFound,
}

impl Reply {
    pub fn fail(reason: impl fmt::Display) -> Self {
        Reply::Fail(reason.to_string())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Fail(reason) => write!(f, "FAIL {}", reason),
            Reply::Found { serial, holder } => write!(f, "FOUND {} {}", serial, holder),
            Reply::NotFound => write!(f, "NOTFOUND"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("closeterm pos2:0\r\ngarbage"), "closeterm pos2:0");
        assert_eq!(truncate_line("ping\0more"), "ping");
        assert_eq!(truncate_line("plain"), "plain");
    }

    #[test]
    fn test_parse_openterm_variants() {
        assert_eq!(
            RemoteCommand::parse("openterm Bar pos3:0").unwrap(),
            RemoteCommand::OpenTerm {
                name: "Bar".into(),
                host: "pos3:0".into(),
                update: false,
                device: None,
            }
        );
        let cmd = RemoteCommand::parse("openterm Bar pos3:0 update kitchen 10.0.0.7 star 1\n").unwrap();
        let RemoteCommand::OpenTerm { update, device, .. } = cmd else {
            panic!("expected openterm");
        };
        assert!(update);
        let device = device.unwrap();
        assert_eq!(device.kind, TerminalType::Kitchen);
        assert_eq!(device.printer_host, "10.0.0.7");
        assert_eq!(device.printer_model, PrinterModel::Star);
        assert_eq!(device.drawers, 1);

        assert!(RemoteCommand::parse("openterm Bar").is_err());
        assert!(RemoteCommand::parse("openterm Bar pos3:0 kitchen 10.0.0.7").is_err());
    }

    #[test]
    fn test_parse_other_commands() {
        assert_eq!(
            RemoteCommand::parse("finddata xxxx1234 12.50").unwrap(),
            RemoteCommand::FindData {
                card: "xxxx1234".into(),
                amount: Decimal::new(1250, 2),
            }
        );
        assert_eq!(
            RemoteCommand::parse("cloneterm pos2:0 pos5:0").unwrap(),
            RemoteCommand::CloneTerm {
                host: "pos2:0".into(),
                destination: "pos5:0".into(),
            }
        );
        assert_eq!(RemoteCommand::parse("REMOTEORDER").unwrap(), RemoteCommand::RemoteOrder);
        assert_eq!(RemoteCommand::parse("reboot now"), Err(ParseError::Unknown));
        assert_eq!(RemoteCommand::parse(""), Err(ParseError::Unknown));
    }

    #[test]
    fn test_reply_lines() {
        assert_eq!(Reply::Ok.to_string(), "OK");
        assert_eq!(Reply::fail(ParseError::Unknown).to_string(), "FAIL unknown command");
        assert_eq!(
            Reply::Found {
                serial: 9,
                holder: "J SMITH".into()
            }
            .to_string(),
            "FOUND 9 J SMITH"
        );
        assert_eq!(Reply::NotFound.to_string(), "NOTFOUND");
    }
}
