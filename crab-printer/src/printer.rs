//! Printer transports
//!
//! Supports:
//! - Network printers (raw TCP, usually port 9100)
//! - Spool files / character devices (appended to)

use crate::error::{PrintError, PrintResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

/// Trait for printer transports
#[allow(async_fn_in_trait)]
pub trait Printer {
    /// Send raw print data
    async fn print(&self, data: &[u8]) -> PrintResult<()>;

    /// Check if the printer is online/reachable
    async fn is_online(&self) -> bool;
}

/// Network printer (raw TCP)
///
/// The host may be a name; it is resolved on every connect so that DHCP
/// re-addressing does not require a restart.
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    host: String,
    port: u16,
    timeout: Duration,
}

impl NetworkPrinter {
    pub fn new(host: &str, port: u16) -> PrintResult<Self> {
        if host.trim().is_empty() {
            return Err(PrintError::InvalidConfig("empty printer host".into()));
        }
        if port == 0 {
            return Err(PrintError::InvalidConfig(format!("invalid port for {}", host)));
        }
        Ok(Self {
            host: host.trim().to_string(),
            port,
            timeout: Duration::from_secs(5),
        })
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&self, timeout: Duration) -> PrintResult<TcpStream> {
        let addr = self.addr();
        tokio::time::timeout(timeout, TcpStream::connect(addr.as_str()))
            .await
            .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", addr)))?
            .map_err(|e| PrintError::Connection(format!("{}: {}", addr, e)))
    }
}

impl Printer for NetworkPrinter {
    #[instrument(skip(self, data), fields(addr = %self.addr(), data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        debug!("Connecting to printer");
        let mut stream = self.connect(self.timeout).await?;

        tokio::time::timeout(self.timeout, stream.write_all(data))
            .await
            .map_err(|_| PrintError::Timeout(format!("Write timeout: {}", self.addr())))??;
        stream.flush().await?;

        info!("Print job sent");
        Ok(())
    }

    #[instrument(skip(self), fields(addr = %self.addr()))]
    async fn is_online(&self) -> bool {
        match self.connect(Duration::from_millis(500)).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Printer offline");
                false
            }
        }
    }
}

/// Spool file or device printer
///
/// Each job is appended; the file is created when missing.
#[derive(Debug, Clone)]
pub struct FilePrinter {
    path: PathBuf,
}

impl FilePrinter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Printer for FilePrinter {
    #[instrument(skip(self, data), fields(path = %self.path.display(), data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(data).await?;
        file.flush().await?;
        debug!("Print job spooled");
        Ok(())
    }

    async fn is_online(&self) -> bool {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.exists(),
            _ => true,
        }
    }
}

/// Any supported transport
#[derive(Debug, Clone)]
pub enum PrinterTarget {
    Network(NetworkPrinter),
    File(FilePrinter),
}

impl Printer for PrinterTarget {
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        match self {
            PrinterTarget::Network(p) => p.print(data).await,
            PrinterTarget::File(p) => p.print(data).await,
        }
    }

    async fn is_online(&self) -> bool {
        match self {
            PrinterTarget::Network(p) => p.is_online().await,
            PrinterTarget::File(p) => p.is_online().await,
        }
    }
}
