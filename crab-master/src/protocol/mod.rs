//! 远程协议
//!
//! - [`command`] - 单行命令解析与结果行
//! - [`remote_order`] - 呼叫中心订单键值流
//! - [`listener`] - socket 轮询

pub mod command;
pub mod listener;
pub mod remote_order;

pub use command::{DeviceSpec, RemoteCommand, Reply, truncate_line};
pub use listener::RemoteListener;
pub use remote_order::{Feed, OrderResponse, OrderStatus, RemoteOrderSession};

use crate::core::Control;

/// Run a single-line command against the live system
pub fn dispatch(ctl: &mut Control, cmd: RemoteCommand) -> Reply {
    let result = match cmd {
        RemoteCommand::OpenTerm {
            name,
            host,
            update,
            device,
        } => ctl
            .open_remote_terminal(&name, &host, update, device.as_ref())
            .map(|_| Reply::Ok),
        RemoteCommand::CloseTerm { host } => ctl.close_remote_terminal(&host).map(|_| Reply::Ok),
        RemoteCommand::CloneTerm { host, destination } => {
            ctl.clone_terminal(&host, &destination).map(|_| Reply::Ok)
        }
        RemoteCommand::FindData { card, amount } => {
            ctl.find_card_payment(&card, amount).map(|found| match found {
                Some(m) => Reply::Found {
                    serial: m.serial,
                    holder: m.holder,
                },
                None => Reply::NotFound,
            })
        }
        RemoteCommand::RemoteOrder => return Reply::fail("remoteorder is a stream command"),
    };
    result.unwrap_or_else(|e| {
        tracing::warn!(code = ?e.code, error = %e.message, "Remote command failed");
        Reply::fail(e.message)
    })
}
