//! 启动握手
//!
//! 启动器通过本地 Unix socket 传入启动选项，每条记录以换行或 NUL 结尾：
//!
//! | 记录 | 作用 |
//! |------|------|
//! | `datapath <path>` | 数据目录 |
//! | `netoff` | 不监听远程端口 |
//! | `display <spec>` | 当前显示 |
//! | `purge` | 清除账单/归档/异常记录 |
//! | `notrace` | 降低日志级别 |
//! | `done` | 握手结束 |
//!
//! `done` 之后 socket 只用于回报 `done` (就绪) 或 `abort <reason>`，随后关闭。

use shared::error::{AppError, AppResult, ErrorCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// 握手得到的启动选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOptions {
    pub data_path: Option<PathBuf>,
    pub network_enabled: bool,
    pub display: Option<String>,
    pub purge: bool,
    pub notrace: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            data_path: None,
            network_enabled: true,
            display: None,
            purge: false,
            notrace: false,
        }
    }
}

/// 单条握手记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapCommand {
    DataPath(PathBuf),
    NetOff,
    Display(String),
    Purge,
    NoTrace,
    Done,
}

impl BootstrapCommand {
    /// Parse one record; blank and unknown records yield `None`
    pub fn parse(record: &str) -> Option<Self> {
        let record = record.trim();
        let (key, value) = match record.split_once(char::is_whitespace) {
            Some((k, v)) => (k, v.trim()),
            None => (record, ""),
        };
        match key {
            "" => None,
            "datapath" if !value.is_empty() => Some(Self::DataPath(PathBuf::from(value))),
            "netoff" => Some(Self::NetOff),
            "display" if !value.is_empty() => Some(Self::Display(value.to_string())),
            "purge" => Some(Self::Purge),
            "notrace" => Some(Self::NoTrace),
            "done" => Some(Self::Done),
            _ => {
                tracing::warn!(record = %record, "Ignoring unknown bootstrap record");
                None
            }
        }
    }
}

/// 启动器连接
pub struct Bootstrap<S> {
    stream: S,
    buf: Vec<u8>,
}

impl Bootstrap<UnixStream> {
    pub async fn connect(path: &Path) -> AppResult<Self> {
        let stream = UnixStream::connect(path).await.map_err(|e| {
            AppError::with_message(
                ErrorCode::NetworkError,
                format!("bootstrap socket {}: {}", path.display(), e),
            )
        })?;
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Bootstrap<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    /// Read records until `done` (or the loader hangs up)
    pub async fn read_options(&mut self) -> AppResult<BootstrapOptions> {
        tokio::time::timeout(HANDSHAKE_TIMEOUT, self.read_until_done())
            .await
            .map_err(|_| AppError::new(ErrorCode::TimeoutError).with_detail("phase", "bootstrap"))?
    }

    async fn read_until_done(&mut self) -> AppResult<BootstrapOptions> {
        let mut opts = BootstrapOptions::default();
        let mut chunk = [0u8; 512];
        loop {
            while let Some(pos) = self.buf.iter().position(|b| *b == b'\n' || *b == 0) {
                let record: Vec<u8> = self.buf.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&record[..record.len() - 1]).into_owned();
                match BootstrapCommand::parse(&text) {
                    Some(BootstrapCommand::Done) => return Ok(opts),
                    Some(cmd) => apply(&mut opts, cmd),
                    None => {}
                }
            }

            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                // Loader closed without `done`; treat the trailing record as final
                let rest = std::mem::take(&mut self.buf);
                if let Some(cmd) = BootstrapCommand::parse(&String::from_utf8_lossy(&rest)) {
                    apply(&mut opts, cmd);
                }
                tracing::warn!("Bootstrap socket closed before 'done'");
                return Ok(opts);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Report readiness and close
    pub async fn signal_ready(mut self) -> AppResult<()> {
        self.stream.write_all(b"done\0").await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Report a fatal startup error and close
    pub async fn abort(mut self, reason: &str) -> AppResult<()> {
        let line = format!("abort {}\0", reason.replace(['\n', '\0'], " "));
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}

fn apply(opts: &mut BootstrapOptions, cmd: BootstrapCommand) {
    tracing::debug!(command = ?cmd, "Bootstrap option");
    match cmd {
        BootstrapCommand::DataPath(p) => opts.data_path = Some(p),
        BootstrapCommand::NetOff => opts.network_enabled = false,
        BootstrapCommand::Display(d) => opts.display = Some(d),
        BootstrapCommand::Purge => opts.purge = true,
        BootstrapCommand::NoTrace => opts.notrace = true,
        BootstrapCommand::Done => {}
    }
}
