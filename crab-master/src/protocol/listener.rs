//! 远程命令 socket
//!
//! 每个 tick 调用一次 [`RemoteListener::poll`]，所有等待都有上限
//! (`poll_wait`)。同一时间只服务一个连接：
//!
//! ```text
//! accept ──▶ Command ──(普通命令)──▶ ACK + 结果行 ──▶ close
//!              │
//!              └─(remoteorder)──▶ SENDORDER ──▶ Order ──EndOrder──▶ 状态行 ──▶ Command
//! ```
//!
//! 连续 `retry_limit` 个 tick 没有数据的连接被放弃。缓冲区中还有完整记录时
//! 不再读取，对端半关闭后也要先处理完这些记录。

use super::command::{RemoteCommand, Reply};
use super::remote_order::{Feed, RemoteOrderSession, complete};
use crate::core::{Config, Control};
use crate::utils::time::now_millis;
use shared::error::AppResult;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// Records handled per tick on one connection
const MAX_RECORDS_PER_TICK: usize = 64;

/// Largest record accepted without a delimiter
const MAX_BUFFER: usize = 64 * 1024;

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

enum Mode {
    Command,
    Order(RemoteOrderSession),
}

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    buf: Vec<u8>,
    idle_ticks: u32,
    mode: Mode,
    eof: bool,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            buf: Vec::with_capacity(512),
            idle_ticks: 0,
            mode: Mode::Command,
            eof: false,
        }
    }

    /// A delimited record is waiting in the buffer
    fn has_record(&self) -> bool {
        self.buf.iter().any(|b| *b == b'\n' || *b == 0)
    }

    fn take_record(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|b| *b == b'\n' || *b == 0)?;
        let record: Vec<u8> = self.buf.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&record[..record.len() - 1]);
        Some(text.trim_end_matches('\r').to_string())
    }

    async fn send(&mut self, data: &[u8]) -> std::io::Result<()> {
        match timeout(WRITE_TIMEOUT, self.stream.write_all(data)).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "write timed out",
            )),
        }
    }
}

/// What to do with the connection after handling its input
enum After {
    Keep,
    Close,
}

/// Remote command listener
pub struct RemoteListener {
    listener: Option<TcpListener>,
    conn: Option<Connection>,
    poll_wait: Duration,
    retry_limit: u32,
}

impl RemoteListener {
    /// Bind the command socket; with networking off nothing is bound
    pub async fn bind(config: &Config) -> AppResult<Self> {
        let listener = if config.network_enabled {
            let listener = TcpListener::bind(("0.0.0.0", config.remote_port)).await?;
            tracing::info!(addr = %listener.local_addr()?, "Remote command socket listening");
            Some(listener)
        } else {
            tracing::info!("Network disabled, remote command socket not bound");
            None
        };
        Ok(Self {
            listener,
            conn: None,
            poll_wait: Duration::from_millis(config.poll_wait_ms),
            retry_limit: config.connection_retry_limit.max(1),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// One bounded poll: accept, read, handle complete records
    pub async fn poll(&mut self, ctl: &mut Control) {
        let Some(listener) = &self.listener else {
            return;
        };

        if self.conn.is_none() {
            match timeout(self.poll_wait, listener.accept()).await {
                Ok(Ok((stream, peer))) => {
                    tracing::debug!(peer = %peer, "Remote connection accepted");
                    self.conn = Some(Connection::new(stream, peer));
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Accept failed");
                    return;
                }
                Err(_) => return,
            }
        }

        let Some(conn) = self.conn.as_mut() else {
            return;
        };

        // Drain buffered records before reading more
        if !conn.eof && !conn.has_record() {
            let mut chunk = [0u8; 4096];
            match timeout(self.poll_wait, conn.stream.read(&mut chunk)).await {
                Ok(Ok(0)) => conn.eof = true,
                Ok(Ok(n)) => {
                    conn.buf.extend_from_slice(&chunk[..n]);
                    conn.idle_ticks = 0;
                }
                Ok(Err(e)) => {
                    tracing::warn!(peer = %conn.peer, error = %e, "Remote read failed");
                    self.conn = None;
                    return;
                }
                Err(_) => {
                    conn.idle_ticks += 1;
                    if conn.idle_ticks >= self.retry_limit {
                        tracing::warn!(
                            peer = %conn.peer,
                            idle_ticks = conn.idle_ticks,
                            "Abandoning idle remote connection"
                        );
                        self.conn = None;
                        return;
                    }
                }
            }
        }

        let after = match handle_records(conn, ctl).await {
            Ok(after) => after,
            Err(e) => {
                tracing::warn!(peer = %conn.peer, error = %e, "Remote write failed");
                After::Close
            }
        };

        let close = match after {
            After::Close => true,
            After::Keep if conn.buf.len() > MAX_BUFFER => {
                tracing::warn!(peer = %conn.peer, "Remote record too long, closing");
                true
            }
            After::Keep if conn.eof && conn.has_record() => false,
            After::Keep if conn.eof => {
                if let Mode::Order(session) = &conn.mode {
                    tracing::warn!(
                        peer = %conn.peer,
                        order = %session.call_center_id(),
                        "Remote order stream ended before EndOrder"
                    );
                }
                true
            }
            After::Keep => false,
        };
        if close {
            if let Some(mut conn) = self.conn.take() {
                let _ = conn.stream.shutdown().await;
                tracing::debug!(peer = %conn.peer, "Remote connection closed");
            }
        }
    }
}

async fn handle_records(conn: &mut Connection, ctl: &mut Control) -> std::io::Result<After> {
    for _ in 0..MAX_RECORDS_PER_TICK {
        let record = match conn.take_record() {
            Some(r) => r,
            // A peer may half-close right after an undelimited command
            None if conn.eof && matches!(conn.mode, Mode::Command) && !conn.buf.is_empty() => {
                let rest = std::mem::take(&mut conn.buf);
                String::from_utf8_lossy(&rest).trim_end().to_string()
            }
            None => return Ok(After::Keep),
        };

        match &mut conn.mode {
            Mode::Command => {
                if record.trim().is_empty() {
                    continue;
                }
                match RemoteCommand::parse(&record) {
                    Ok(RemoteCommand::RemoteOrder) => {
                        tracing::debug!(peer = %conn.peer, "Remote order exchange started");
                        conn.send(b"SENDORDER\n").await?;
                        conn.mode = Mode::Order(RemoteOrderSession::new(now_millis()));
                    }
                    Ok(cmd) => {
                        conn.send(b"ACK").await?;
                        tracing::info!(peer = %conn.peer, command = ?cmd, "Remote command");
                        let reply = super::dispatch(ctl, cmd);
                        conn.send(format!("{}\n", reply).as_bytes()).await?;
                        return Ok(After::Close);
                    }
                    Err(e) => {
                        tracing::warn!(peer = %conn.peer, record = %record, error = %e, "Bad remote command");
                        conn.send(b"ACK").await?;
                        conn.send(format!("{}\n", Reply::fail(e)).as_bytes()).await?;
                        return Ok(After::Close);
                    }
                }
            }
            Mode::Order(session) => {
                if session.feed(&record, &ctl.catalog) == Feed::End {
                    let Mode::Order(session) = std::mem::replace(&mut conn.mode, Mode::Command)
                    else {
                        continue;
                    };
                    let response = complete(session, ctl);
                    conn.send(format!("{}\n", response).as_bytes()).await?;
                }
            }
        }
    }
    Ok(After::Keep)
}
